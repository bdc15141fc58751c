//! Content-Security-Policy model and the suggestion algorithm
//!
//! A suggestion starts from the policy the browser reported against and is
//! widened, one violation at a time, until every collected violation would
//! have been allowed.

use csp_common::{to_origin, ViolationReport};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Serialization order for well-known directives. Anything else follows,
/// sorted by name.
pub const DIRECTIVE_ORDER: [&str; 20] = [
    "default-src",
    "script-src",
    "style-src",
    "img-src",
    "connect-src",
    "font-src",
    "object-src",
    "media-src",
    "frame-src",
    "sandbox",
    "base-uri",
    "child-src",
    "form-action",
    "frame-ancestors",
    "plugin-types",
    "report-to",
    "worker-src",
    "manifest-src",
    "prefetch-src",
    "report-uri",
];

/// How a single source expression treats a resource URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMatch {
    Allow,
    Deny,
    NoMatch,
}

impl SourceMatch {
    fn from_condition(condition: bool) -> Self {
        if condition {
            SourceMatch::Allow
        } else {
            SourceMatch::NoMatch
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSecurityPolicy {
    /// `host:port` of the document the policy protects
    origin: Option<String>,
    directives: BTreeMap<String, Vec<String>>,
}

impl ContentSecurityPolicy {
    /// Parse `name value value; name value; ...`.
    ///
    /// Directive names are case-insensitive; a repeated directive keeps its
    /// first occurrence, as browsers do.
    pub fn parse(origin: Option<String>, text: &str) -> Self {
        let mut directives = BTreeMap::new();

        for token in text.split(';') {
            let mut parts = token.split_whitespace();
            let Some(name) = parts.next() else {
                continue;
            };
            let name = name.to_ascii_lowercase();
            if directives.contains_key(&name) {
                debug!("Ignoring repeated directive {}", name);
                continue;
            }
            directives.insert(name, parts.map(str::to_string).collect());
        }

        Self { origin, directives }
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn sources(&self, directive: &str) -> Option<&[String]> {
        self.directives.get(directive).map(Vec::as_slice)
    }

    pub fn remove_directive(&mut self, directive: &str) -> Option<Vec<String>> {
        self.directives.remove(directive)
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Evaluate one source expression against a resource URL (or the
    /// `inline` / `eval` keywords browsers report)
    pub fn eval_source(&self, source: &str, target: &str) -> SourceMatch {
        let pattern = source.trim_matches('\'');

        match pattern {
            "none" => SourceMatch::Deny,
            "*" => SourceMatch::from_condition(
                !target.starts_with("blob") && !target.starts_with("filesystem:"),
            ),
            "blob:" => SourceMatch::from_condition(target.starts_with("blob")),
            "filesystem:" => SourceMatch::from_condition(target.starts_with("filesystem:")),
            "self" => SourceMatch::from_condition(
                self.origin.is_some() && self.origin == to_origin(target),
            ),
            "unsafe-inline" => SourceMatch::from_condition(target == "inline"),
            "unsafe-eval" => SourceMatch::from_condition(target == "eval"),
            scheme if scheme.ends_with(':') => {
                SourceMatch::from_condition(target.starts_with(scheme.trim_end_matches(':')))
            }
            host if host.contains("//") => {
                if scheme_of(host) != scheme_of(target) {
                    return SourceMatch::NoMatch;
                }
                host_source_matches(to_origin(host), to_origin(target))
            }
            host if host.contains('.') => {
                host_source_matches(to_origin(&format!("https://{}", host)), to_origin(target))
            }
            _ => SourceMatch::NoMatch,
        }
    }

    /// Widen the policy so the reported violation would have been allowed
    pub fn allow(&mut self, report: &ViolationReport) {
        let directive = match report.violated_directive.as_str() {
            "script-src-elem" | "script-src-attr" => "script-src",
            "style-src-elem" | "style-src-attr" => "style-src",
            other => other,
        }
        .to_ascii_lowercase();

        let blocked = report.blocked_uri.as_str();
        let current = self.directives.get(&directive).cloned().unwrap_or_default();

        let mut sources = Vec::with_capacity(current.len() + 1);
        for source in current {
            match self.eval_source(&source, blocked) {
                SourceMatch::Allow => return,
                SourceMatch::Deny => continue,
                SourceMatch::NoMatch => sources.push(source),
            }
        }

        match new_source_for(blocked, report.document_origin().as_deref()) {
            Some(source) => {
                debug!("Allowing {} via {} {}", blocked, directive, source);
                sources.push(source);
            }
            None => warn!("Unhandled violation {} {}", report.violated_directive, blocked),
        }

        self.directives.insert(directive, sources);
    }
}

impl fmt::Display for ContentSecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known = DIRECTIVE_ORDER
            .iter()
            .filter_map(|name| self.directives.get_key_value(*name));
        let others = self
            .directives
            .iter()
            .filter(|(name, _)| !DIRECTIVE_ORDER.contains(&name.as_str()));

        let serialized: Vec<String> = known
            .chain(others)
            .map(|(name, values)| {
                if values.is_empty() {
                    format!("{};", name)
                } else {
                    format!("{} {};", name, values.join(" "))
                }
            })
            .collect();

        write!(f, "{}", serialized.join(" "))
    }
}

/// Suggested policy accommodating every report, or `None` without reports.
///
/// Starts from the first report's policy; `report-uri` is dropped since the
/// suggestion is meant to be enforced.
pub fn suggest_policy(reports: &[ViolationReport]) -> Option<String> {
    let first = reports.first()?;
    let mut policy = ContentSecurityPolicy::parse(first.document_origin(), &first.original_policy);

    for report in reports {
        policy.allow(report);
    }
    policy.remove_directive("report-uri");

    Some(policy.to_string())
}

fn scheme_of(uri: &str) -> Option<String> {
    uri.split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
}

fn host_source_matches(pattern_origin: Option<String>, target_origin: Option<String>) -> SourceMatch {
    let (Some(pattern), Some(target)) = (pattern_origin, target_origin) else {
        return SourceMatch::NoMatch;
    };

    match pattern.strip_prefix('*') {
        Some(suffix) => SourceMatch::from_condition(target.ends_with(suffix)),
        None => SourceMatch::from_condition(pattern == target),
    }
}

/// Source expression that admits `blocked`
fn new_source_for(blocked: &str, document_origin: Option<&str>) -> Option<String> {
    if let Ok(url) = url::Url::parse(blocked) {
        if let Some(host) = url.host_str().filter(|host| !host.is_empty()) {
            if document_origin.is_some() && to_origin(blocked).as_deref() == document_origin {
                return Some("'self'".to_string());
            }
            return Some(match url.port() {
                Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                None => format!("{}://{}", url.scheme(), host),
            });
        }
    }

    match blocked {
        "inline" => Some("'unsafe-inline'".to_string()),
        "eval" => Some("'unsafe-eval'".to_string()),
        "data" => Some("data:".to_string()),
        "blob" => Some("blob:".to_string()),
        other if other.starts_with("data:") => Some("data:".to_string()),
        other if other.starts_with("blob:") => Some("blob:".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(document: &str, directive: &str, blocked: &str, policy: &str) -> ViolationReport {
        serde_json::from_value(serde_json::json!({
            "blocked-uri": blocked,
            "document-uri": document,
            "effective-directive": directive,
            "original-policy": policy,
            "violated-directive": directive,
        }))
        .unwrap()
    }

    fn policy(text: &str) -> ContentSecurityPolicy {
        ContentSecurityPolicy::parse(Some("a.test:443".into()), text)
    }

    #[test]
    fn test_parse_and_serialize_in_canonical_order() {
        let csp = policy("img-src 'self' data:; upgrade-insecure-requests; default-src 'none';;  block-all-mixed-content ; script-src 'self'");
        assert_eq!(
            csp.to_string(),
            "default-src 'none'; script-src 'self'; img-src 'self' data:; block-all-mixed-content; upgrade-insecure-requests;"
        );
    }

    #[test]
    fn test_repeated_directive_keeps_first() {
        let csp = policy("script-src 'self'; SCRIPT-SRC *");
        assert_eq!(csp.sources("script-src"), Some(&["'self'".to_string()][..]));
    }

    #[test]
    fn test_eval_keywords() {
        let csp = policy("");
        assert_eq!(csp.eval_source("'none'", "https://a.test/"), SourceMatch::Deny);
        assert_eq!(csp.eval_source("*", "https://b.test/x.js"), SourceMatch::Allow);
        assert_eq!(csp.eval_source("*", "blob:https://a.test/1"), SourceMatch::NoMatch);
        assert_eq!(csp.eval_source("blob:", "blob:https://a.test/1"), SourceMatch::Allow);
        assert_eq!(csp.eval_source("'self'", "https://a.test/app.js"), SourceMatch::Allow);
        assert_eq!(csp.eval_source("'self'", "http://a.test/app.js"), SourceMatch::NoMatch);
        assert_eq!(csp.eval_source("'unsafe-inline'", "inline"), SourceMatch::Allow);
        assert_eq!(csp.eval_source("'unsafe-eval'", "inline"), SourceMatch::NoMatch);
        assert_eq!(csp.eval_source("data:", "data:image/png;base64,AA"), SourceMatch::Allow);
    }

    #[test]
    fn test_eval_host_sources() {
        let csp = policy("");
        assert_eq!(csp.eval_source("https://cdn.test", "https://cdn.test/lib.js"), SourceMatch::Allow);
        assert_eq!(csp.eval_source("https://cdn.test", "http://cdn.test/lib.js"), SourceMatch::NoMatch);
        assert_eq!(csp.eval_source("https://*.cdn.test", "https://eu.cdn.test/lib.js"), SourceMatch::Allow);
        assert_eq!(csp.eval_source("cdn.test", "https://cdn.test/lib.js"), SourceMatch::Allow);
        assert_eq!(csp.eval_source("cdn.test:8443", "https://cdn.test/lib.js"), SourceMatch::NoMatch);
        assert_eq!(csp.eval_source("*.cdn.test", "https://x.cdn.test/a"), SourceMatch::Allow);
        assert_eq!(csp.eval_source("'strict-dynamic'", "https://x.cdn.test/a"), SourceMatch::NoMatch);
    }

    #[test]
    fn test_allow_replaces_none_with_cross_origin_source() {
        let mut csp = policy("default-src 'none'; img-src 'none'");
        csp.allow(&report(
            "https://a.test/",
            "img-src",
            "https://images.test:8443/logo.png",
            "",
        ));
        assert_eq!(
            csp.sources("img-src"),
            Some(&["https://images.test:8443".to_string()][..])
        );
    }

    #[test]
    fn test_allow_same_origin_as_self() {
        let mut csp = policy("script-src 'none'");
        csp.allow(&report("https://a.test/page", "script-src-elem", "https://a.test/app.js", ""));
        assert_eq!(csp.sources("script-src"), Some(&["'self'".to_string()][..]));
    }

    #[test]
    fn test_allow_keywords_and_schemes() {
        let mut csp = policy("script-src 'self'; style-src 'self'; img-src 'self'");
        csp.allow(&report("https://a.test/", "script-src", "eval", ""));
        csp.allow(&report("https://a.test/", "style-src-attr", "inline", ""));
        csp.allow(&report("https://a.test/", "img-src", "data", ""));
        assert_eq!(
            csp.to_string(),
            "script-src 'self' 'unsafe-eval'; style-src 'self' 'unsafe-inline'; img-src 'self' data:;"
        );
    }

    #[test]
    fn test_allow_is_a_no_op_when_already_allowed() {
        let mut csp = policy("img-src https://*.img.test");
        let before = csp.clone();
        csp.allow(&report("https://a.test/", "img-src", "https://eu.img.test/a.png", ""));
        assert_eq!(csp, before);
    }

    #[test]
    fn test_allow_creates_missing_directive() {
        let mut csp = policy("default-src 'none'");
        csp.allow(&report("https://a.test/", "font-src", "https://fonts.test/a.woff2", ""));
        assert_eq!(csp.to_string(), "default-src 'none'; font-src https://fonts.test;");
    }

    #[test]
    fn test_suggest_policy_from_reports() {
        let original = "default-src 'none'; script-src 'self'; connect-src 'self'; img-src 'self'; style-src 'self'; base-uri 'self'; form-action 'self'; report-uri http://localhost:18282/csp-report";
        let reports = vec![
            report("https://a.test/", "script-src-elem", "https://cdn.test/lib.js", original),
            report("https://a.test/", "img-src", "data", original),
            report("https://a.test/", "script-src-elem", "https://cdn.test/other.js", original),
        ];

        assert_eq!(
            suggest_policy(&reports).unwrap(),
            "default-src 'none'; script-src 'self' https://cdn.test; style-src 'self'; img-src 'self' data:; connect-src 'self'; base-uri 'self'; form-action 'self';"
        );
    }

    #[test]
    fn test_suggest_policy_without_reports() {
        assert_eq!(suggest_policy(&[]), None);
    }
}
