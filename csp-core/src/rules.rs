//! Dynamic header rules: the rule model, the active-rule locator and the
//! rule installer.
//!
//! Rules are stored in the browser's declarative format. [`HeaderAction`]
//! is the typed view the rest of the engine works with, so nothing outside
//! this module branches on header-name strings.

use crate::config::ConfigStore;
use crate::mode::OverrideMode;
use crate::navigation::InspectedPage;
use crate::snapshot::{PolicySnapshotStore, CSP_HEADER};
use crate::store::{RuleStore, RuleUpdate};
use crate::{OverrideError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Native rule identifier, always positive
pub type RuleId = u32;

pub const CSP_REPORT_ONLY_HEADER: &str = "Content-Security-Policy-Report-Only";

/// Locked-down policy used in suggest mode; `report-uri` is appended
pub const REPORTING_BASELINE_CSP: &str = "default-src 'none'; script-src 'self'; connect-src 'self'; img-src 'self'; style-src 'self'; base-uri 'self'; form-action 'self'";

/// Closes an origin pattern so `https://a.test` does not match `https://a.test.evil`
const ORIGIN_TERMINATOR: &str = "(?:[/?#]|$)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleActionType {
    ModifyHeaders,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderOperation {
    Set,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Top-level documents only
    MainFrame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyHeaderInfo {
    pub header: String,
    pub operation: HeaderOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub action_type: RuleActionType,
    pub response_headers: Vec<ModifyHeaderInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub regex_filter: String,
    pub resource_types: Vec<ResourceType>,
}

/// One declarative header-rewrite rule as held by the rule store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRule {
    pub id: RuleId,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

/// What a rule does to the response headers of the origin it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderAction {
    /// Set `Content-Security-Policy` to `policy`
    Override { policy: String },
    /// Set `Content-Security-Policy-Report-Only` to `policy` and drop
    /// `Content-Security-Policy`; violations go to `collector_url`
    ReportOnly { policy: String, collector_url: String },
}

impl HeaderAction {
    pub fn policy(&self) -> &str {
        match self {
            HeaderAction::Override { policy } | HeaderAction::ReportOnly { policy, .. } => policy.as_str(),
        }
    }

    pub fn mode(&self) -> OverrideMode {
        match self {
            HeaderAction::Override { .. } => OverrideMode::Override,
            HeaderAction::ReportOnly { .. } => OverrideMode::Suggest,
        }
    }

    fn response_headers(&self) -> Vec<ModifyHeaderInfo> {
        match self {
            HeaderAction::Override { policy } => vec![ModifyHeaderInfo {
                header: CSP_HEADER.to_string(),
                operation: HeaderOperation::Set,
                value: Some(policy.clone()),
            }],
            HeaderAction::ReportOnly { policy, .. } => vec![
                ModifyHeaderInfo {
                    header: CSP_REPORT_ONLY_HEADER.to_string(),
                    operation: HeaderOperation::Set,
                    value: Some(policy.clone()),
                },
                // Never enforce two conflicting policies at once
                ModifyHeaderInfo {
                    header: CSP_HEADER.to_string(),
                    operation: HeaderOperation::Remove,
                    value: None,
                },
            ],
        }
    }
}

impl HeaderRule {
    pub fn new(id: RuleId, pattern: &OriginPattern, action: HeaderAction) -> Self {
        Self {
            id,
            action: RuleAction {
                action_type: RuleActionType::ModifyHeaders,
                response_headers: action.response_headers(),
            },
            condition: RuleCondition {
                regex_filter: pattern.regex_filter().to_string(),
                resource_types: vec![ResourceType::MainFrame],
            },
        }
    }

    /// Typed view of the rule, judged by its first response header.
    ///
    /// `None` for rules that do not set one of the two CSP headers.
    pub fn header_action(&self) -> Option<HeaderAction> {
        let first = self.action.response_headers.first()?;
        if first.operation != HeaderOperation::Set {
            return None;
        }
        let policy = first.value.clone()?;

        if first.header.eq_ignore_ascii_case(CSP_REPORT_ONLY_HEADER) {
            let collector_url = report_uri_of(&policy).unwrap_or_default();
            Some(HeaderAction::ReportOnly {
                policy,
                collector_url,
            })
        } else if first.header.eq_ignore_ascii_case(CSP_HEADER) {
            Some(HeaderAction::Override { policy })
        } else {
            None
        }
    }

    /// Test the rule's pattern against a URL. Unparseable patterns never match.
    pub fn matches(&self, url: &str) -> bool {
        match regex::Regex::new(&self.condition.regex_filter) {
            Ok(re) => re.is_match(url),
            Err(e) => {
                warn!(
                    "Skipping rule {} with invalid pattern '{}': {}",
                    self.id, self.condition.regex_filter, e
                );
                false
            }
        }
    }

    /// Website the rule applies to, as shown in rule listings
    pub fn origin(&self) -> String {
        display_origin(&self.condition.regex_filter)
    }
}

/// `report-uri` value of a policy, if it declares one
fn report_uri_of(policy: &str) -> Option<String> {
    policy.split(';').find_map(|directive| {
        let mut tokens = directive.split_whitespace();
        match tokens.next() {
            Some(name) if name.eq_ignore_ascii_case("report-uri") => tokens.next().map(str::to_string),
            _ => None,
        }
    })
}

/// Anchored `scheme://host[:port]` pattern scoping a rule to one origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPattern {
    origin: String,
    regex_filter: String,
}

impl OriginPattern {
    /// Derive the pattern from the scheme and host of a page URL
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| OverrideError::configuration(format!("invalid page URL '{}': {}", url, e)))?;

        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(OverrideError::configuration(format!(
                "cannot scope a header rule to a {} URL: {}",
                scheme, url
            )));
        }

        let host = parsed
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| OverrideError::configuration(format!("page URL has no host: {}", url)))?;

        let origin = match parsed.port() {
            Some(port) => format!("{}://{}:{}", scheme, host, port),
            None => format!("{}://{}", scheme, host),
        };
        let regex_filter = format!("^{}{}", regex::escape(&origin), ORIGIN_TERMINATOR);

        Ok(Self {
            origin,
            regex_filter,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn regex_filter(&self) -> &str {
        &self.regex_filter
    }

    pub fn matches(&self, url: &str) -> bool {
        regex::Regex::new(&self.regex_filter)
            .map(|re| re.is_match(&normalize_url(url)))
            .unwrap_or(false)
    }
}

/// Reverse an origin pattern back into the website it covers.
///
/// Also accepts plain `^https://host` filters.
pub fn display_origin(regex_filter: &str) -> String {
    let body = regex_filter.strip_prefix('^').unwrap_or(regex_filter);
    let body = body.strip_suffix(ORIGIN_TERMINATOR).unwrap_or(body);

    let mut origin = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                origin.push(escaped);
            }
        } else {
            origin.push(c);
        }
    }
    origin
}

/// Serialize a URL the way the browser reports it, so `HTTPS://A.test`
/// and `https://a.test/` match the same rules
fn normalize_url(url: &str) -> String {
    url::Url::parse(url)
        .map(|parsed| parsed.to_string())
        .unwrap_or_else(|_| url.to_string())
}

/// Collapse line breaks: policies are edited line-wrapped but sent as one header value
fn single_line(policy: &str) -> String {
    policy.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Highest installed id plus one
fn next_id_from(rules: &[HeaderRule]) -> Result<RuleId> {
    let max = rules.iter().map(|rule| rule.id).max().unwrap_or(0);
    max.checked_add(1)
        .ok_or_else(|| OverrideError::RuleStore("rule id space exhausted".to_string()))
}

/// Entry in the list of installed overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideSummary {
    pub id: RuleId,
    pub origin: String,
    pub mode: OverrideMode,
}

/// Finds and replaces the header rule belonging to an origin
#[derive(Clone)]
pub struct RuleManager {
    store: Arc<dyn RuleStore>,
    snapshots: PolicySnapshotStore,
    config: ConfigStore,
    /// Guards read-compute-submit so two installs never pick the same id
    update_lock: Arc<Mutex<()>>,
}

impl RuleManager {
    pub fn new(store: Arc<dyn RuleStore>, snapshots: PolicySnapshotStore, config: ConfigStore) -> Self {
        Self {
            store,
            snapshots,
            config,
            update_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    pub async fn next_rule_id(&self) -> Result<RuleId> {
        let rules = self.store.dynamic_rules().await?;
        next_id_from(&rules)
    }

    /// The rule covering `url`, if any.
    ///
    /// Only a missing rule store reads as "no override installed"; a store
    /// that fails to enumerate its rules is an error.
    pub async fn try_find_rule_for_origin(&self, url: &str) -> Result<Option<HeaderRule>> {
        if !self.store.is_available() {
            debug!("Rule store unavailable, treating {} as not overridden", url);
            return Ok(None);
        }

        Ok(self.rules_for_url(url).await?.into_iter().next())
    }

    /// Best-effort [`try_find_rule_for_origin`](Self::try_find_rule_for_origin)
    /// for display. Never use the result to decide what to remove or add.
    pub async fn find_rule_for_origin(&self, url: &str) -> Option<HeaderRule> {
        match self.try_find_rule_for_origin(url).await {
            Ok(rule) => rule,
            Err(e) => {
                warn!("Failed to enumerate rules for {}: {}", url, e);
                None
            }
        }
    }

    /// Every installed rule whose pattern matches `url`
    pub async fn rules_for_url(&self, url: &str) -> Result<Vec<HeaderRule>> {
        let url = normalize_url(url);
        let rules = self.store.dynamic_rules().await?;
        Ok(rules.into_iter().filter(|rule| rule.matches(&url)).collect())
    }

    /// Replace whatever rule covers the page's origin with a CSP override.
    ///
    /// The policy is `policy_text` when given, else the tab's observed
    /// policy, else the configured starter policy.
    pub async fn install_override(&self, page: &InspectedPage, policy_text: Option<&str>) -> Result<HeaderRule> {
        let pattern = OriginPattern::from_url(&page.url)?;
        let policy = self.resolve_override_text(page, policy_text).await?;
        self.install(page, &pattern, HeaderAction::Override { policy }).await
    }

    /// Replace whatever rule covers the page's origin with the report-only
    /// suggest policy pointed at the configured collector
    pub async fn install_reporting(&self, page: &InspectedPage) -> Result<HeaderRule> {
        let pattern = OriginPattern::from_url(&page.url)?;
        let collector_url = self.config.suggest_service().await?;
        let policy = format!("{}; report-uri {}", REPORTING_BASELINE_CSP, collector_url);
        self.install(
            page,
            &pattern,
            HeaderAction::ReportOnly {
                policy,
                collector_url,
            },
        )
        .await
    }

    /// Remove the rule covering the page's origin.
    ///
    /// Returns whether anything was removed; clearing an origin with no
    /// rule is a no-op.
    pub async fn clear_override(&self, page: &InspectedPage) -> Result<bool> {
        let _guard = self.update_lock.lock().await;

        let remove_rule_ids: Vec<RuleId> = self.rules_for_url(&page.url).await?.iter().map(|r| r.id).collect();
        if remove_rule_ids.is_empty() {
            debug!("No override rule to clear for {}", page.url);
            return Ok(false);
        }

        info!("Clearing override rule(s) {:?} for {}", remove_rule_ids, page.url);
        self.store
            .update_dynamic_rules(RuleUpdate {
                add_rules: Vec::new(),
                remove_rule_ids,
            })
            .await?;
        Ok(true)
    }

    /// All installed rules, for the rule management page
    pub async fn list_overrides(&self) -> Result<Vec<OverrideSummary>> {
        let rules = self.store.dynamic_rules().await?;
        Ok(rules
            .iter()
            .map(|rule| OverrideSummary {
                id: rule.id,
                origin: rule.origin(),
                mode: OverrideMode::detect(Some(rule)),
            })
            .collect())
    }

    pub async fn remove_rule(&self, id: RuleId) -> Result<()> {
        let _guard = self.update_lock.lock().await;
        info!("Removing rule {}", id);
        self.store
            .update_dynamic_rules(RuleUpdate {
                add_rules: Vec::new(),
                remove_rule_ids: vec![id],
            })
            .await
    }

    /// Remove every dynamic rule. Run on install or update.
    pub async fn clear_all(&self) -> Result<usize> {
        let _guard = self.update_lock.lock().await;
        let remove_rule_ids: Vec<RuleId> = self.store.dynamic_rules().await?.iter().map(|r| r.id).collect();
        let count = remove_rule_ids.len();
        if count > 0 {
            info!("Removing {} dynamic rule(s)", count);
            self.store
                .update_dynamic_rules(RuleUpdate {
                    add_rules: Vec::new(),
                    remove_rule_ids,
                })
                .await?;
        }
        Ok(count)
    }

    async fn resolve_override_text(&self, page: &InspectedPage, policy_text: Option<&str>) -> Result<String> {
        let policy = match policy_text {
            Some(text) => text.to_string(),
            None => match self.snapshots.load(page.tab_id).await? {
                Some(existing) if !existing.trim().is_empty() => existing,
                _ => self.config.starter_csp().await?,
            },
        };

        let policy = single_line(&policy);
        if policy.trim().is_empty() {
            return Err(OverrideError::configuration("override policy must not be empty"));
        }
        Ok(policy)
    }

    /// Remove every rule covering the page and add the new one in one batch
    async fn install(&self, page: &InspectedPage, pattern: &OriginPattern, action: HeaderAction) -> Result<HeaderRule> {
        let _guard = self.update_lock.lock().await;

        let rules = self.store.dynamic_rules().await?;
        let url = normalize_url(&page.url);
        let remove_rule_ids: Vec<RuleId> = rules.iter().filter(|r| r.matches(&url)).map(|r| r.id).collect();

        let mode = action.mode();
        let rule = HeaderRule::new(next_id_from(&rules)?, pattern, action);

        self.store
            .update_dynamic_rules(RuleUpdate {
                add_rules: vec![rule.clone()],
                remove_rule_ids: remove_rule_ids.clone(),
            })
            .await?;

        info!(
            "Installed {} rule {} for {} (replaced {:?})",
            mode,
            rule.id,
            pattern.origin(),
            remove_rule_ids
        );
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryKeyValueStore, MemoryRuleStore};

    struct Fixture {
        store: Arc<MemoryRuleStore>,
        storage: Arc<MemoryKeyValueStore>,
        manager: RuleManager,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryRuleStore::new());
        let storage = Arc::new(MemoryKeyValueStore::new());
        let config = ConfigStore::new(storage.clone());
        config.init_defaults().await.unwrap();
        let manager = RuleManager::new(store.clone(), PolicySnapshotStore::new(storage.clone()), config);
        Fixture {
            store,
            storage,
            manager,
        }
    }

    #[test]
    fn test_origin_pattern_is_anchored() {
        let pattern = OriginPattern::from_url("https://example.com/some/page?q=1").unwrap();
        assert_eq!(pattern.origin(), "https://example.com");

        assert!(pattern.matches("https://example.com"));
        assert!(pattern.matches("https://example.com/"));
        assert!(pattern.matches("https://example.com/login#top"));
        assert!(!pattern.matches("https://evil.example.com.attacker.tld/"));
        assert!(!pattern.matches("https://example.com.attacker.tld/"));
        assert!(!pattern.matches("https://exampleXcom/"));
        assert!(!pattern.matches("http://example.com/"));
        assert!(!pattern.matches("https://example.com:8443/"));
    }

    #[test]
    fn test_origin_pattern_keeps_explicit_port() {
        let pattern = OriginPattern::from_url("http://localhost:3000/app").unwrap();
        assert_eq!(pattern.origin(), "http://localhost:3000");
        assert!(pattern.matches("http://localhost:3000/other"));
        assert!(!pattern.matches("http://localhost:30001/"));
        assert_eq!(display_origin(pattern.regex_filter()), "http://localhost:3000");
    }

    #[test]
    fn test_origin_pattern_rejects_unscoped_urls() {
        for url in ["about:blank", "chrome://extensions", "file:///tmp/x.html", "not a url", ""] {
            assert!(
                matches!(OriginPattern::from_url(url), Err(OverrideError::Configuration(_))),
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn test_display_origin_accepts_plain_filters() {
        assert_eq!(display_origin("^https://www.w8wjb.com"), "https://www.w8wjb.com");
    }

    #[test]
    fn test_report_only_rule_shape() {
        let pattern = OriginPattern::from_url("https://a.test").unwrap();
        let rule = HeaderRule::new(
            9,
            &pattern,
            HeaderAction::ReportOnly {
                policy: "default-src 'none'; report-uri http://c.test/csp-report".into(),
                collector_url: "http://c.test/csp-report".into(),
            },
        );

        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["action"]["type"], "modifyHeaders");
        assert_eq!(json["action"]["responseHeaders"][0]["header"], CSP_REPORT_ONLY_HEADER);
        assert_eq!(json["action"]["responseHeaders"][1]["header"], CSP_HEADER);
        assert_eq!(json["action"]["responseHeaders"][1]["operation"], "remove");
        assert!(json["action"]["responseHeaders"][1].get("value").is_none());
        assert_eq!(json["condition"]["resourceTypes"][0], "main_frame");

        assert_eq!(
            rule.header_action(),
            Some(HeaderAction::ReportOnly {
                policy: "default-src 'none'; report-uri http://c.test/csp-report".into(),
                collector_url: "http://c.test/csp-report".into(),
            })
        );
    }

    #[test]
    fn test_next_id_from() {
        assert_eq!(next_id_from(&[]).unwrap(), 1);
        let pattern = OriginPattern::from_url("https://a.test").unwrap();
        let rules: Vec<_> = [3, 11, 7]
            .iter()
            .map(|id| HeaderRule::new(*id, &pattern, HeaderAction::Override { policy: "x".into() }))
            .collect();
        assert_eq!(next_id_from(&rules).unwrap(), 12);
    }

    #[tokio::test]
    async fn test_install_override_collapses_newlines() {
        let f = fixture().await;
        let page = InspectedPage::new(1, "https://a.test/index.html");

        let rule = f
            .manager
            .install_override(&page, Some("default-src 'self';\nscript-src 'self'\r\nimg-src *"))
            .await
            .unwrap();

        assert_eq!(rule.id, 1);
        assert_eq!(
            rule.header_action(),
            Some(HeaderAction::Override {
                policy: "default-src 'self'; script-src 'self' img-src *".into()
            })
        );
        let found = f.manager.find_rule_for_origin("https://a.test/other").await;
        assert_eq!(found, Some(rule));
    }

    #[tokio::test]
    async fn test_install_override_falls_back_to_snapshot_then_starter() {
        let f = fixture().await;
        let page = InspectedPage::new(4, "https://a.test/");

        let rule = f.manager.install_override(&page, None).await.unwrap();
        assert_eq!(rule.header_action().unwrap().policy(), crate::config::DEFAULT_STARTER_CSP);

        f.storage
            .set("4-existing", "default-src https:;\nobject-src 'none'".to_string())
            .await
            .unwrap();
        let rule = f.manager.install_override(&page, None).await.unwrap();
        assert_eq!(
            rule.header_action().unwrap().policy(),
            "default-src https:; object-src 'none'"
        );
    }

    #[tokio::test]
    async fn test_install_replaces_rule_for_same_origin_only() {
        let f = fixture().await;
        let a = InspectedPage::new(1, "https://a.test/");
        let b = InspectedPage::new(2, "https://b.test/");

        f.manager.install_override(&b, Some("default-src 'self'")).await.unwrap();
        f.manager.install_override(&a, Some("default-src 'self'")).await.unwrap();
        let replaced = f.manager.install_reporting(&a).await.unwrap();

        let rules = f.store.dynamic_rules().await.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(replaced.id, 3);
        assert_eq!(
            OverrideMode::detect(f.manager.find_rule_for_origin(&a.url).await.as_ref()),
            OverrideMode::Suggest
        );
        assert_eq!(
            OverrideMode::detect(f.manager.find_rule_for_origin(&b.url).await.as_ref()),
            OverrideMode::Override
        );
    }

    #[tokio::test]
    async fn test_install_reporting_points_at_collector() {
        let f = fixture().await;
        let page = InspectedPage::new(1, "https://a.test/");

        let rule = f.manager.install_reporting(&page).await.unwrap();
        match rule.header_action() {
            Some(HeaderAction::ReportOnly { policy, collector_url }) => {
                assert_eq!(collector_url, crate::config::DEFAULT_CSP_REPORT_SERVICE);
                assert!(policy.starts_with(REPORTING_BASELINE_CSP));
                assert!(policy.ends_with("report-uri http://localhost:18282/csp-report"));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clear_override_is_idempotent() {
        let f = fixture().await;
        let page = InspectedPage::new(1, "https://a.test/");

        f.manager.install_override(&page, Some("default-src 'self'")).await.unwrap();
        assert!(f.manager.clear_override(&page).await.unwrap());
        assert!(!f.manager.clear_override(&page).await.unwrap());
        assert!(f.store.dynamic_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_origin_installs_nothing() {
        let f = fixture().await;
        let page = InspectedPage::new(1, "about:blank");

        let err = f.manager.install_override(&page, Some("default-src 'self'")).await.unwrap_err();
        assert!(matches!(err, OverrideError::Configuration(_)));
        assert!(f.store.dynamic_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store_reads_as_no_rule() {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let manager = RuleManager::new(
            Arc::new(MemoryRuleStore::unavailable()),
            PolicySnapshotStore::new(storage.clone()),
            ConfigStore::new(storage),
        );

        assert!(!manager.is_available());
        assert_eq!(manager.find_rule_for_origin("https://a.test/").await, None);
        assert_eq!(manager.try_find_rule_for_origin("https://a.test/").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_and_remove_rules() {
        let f = fixture().await;
        f.manager
            .install_override(&InspectedPage::new(1, "https://a.test/"), Some("default-src 'self'"))
            .await
            .unwrap();
        f.manager
            .install_reporting(&InspectedPage::new(2, "http://localhost:8080/"))
            .await
            .unwrap();

        let listed = f.manager.list_overrides().await.unwrap();
        assert_eq!(
            listed,
            vec![
                OverrideSummary {
                    id: 1,
                    origin: "https://a.test".into(),
                    mode: OverrideMode::Override
                },
                OverrideSummary {
                    id: 2,
                    origin: "http://localhost:8080".into(),
                    mode: OverrideMode::Suggest
                },
            ]
        );

        f.manager.remove_rule(1).await.unwrap();
        assert_eq!(f.manager.list_overrides().await.unwrap().len(), 1);
        assert_eq!(f.manager.clear_all().await.unwrap(), 1);
        assert!(f.manager.list_overrides().await.unwrap().is_empty());
    }
}
