//! Origin helpers
//!
//! Origins are compared as `host:port`, with the port defaulted from the
//! scheme when absent. The parser is deliberately lenient so it also
//! accepts CSP host-source expressions such as `https://*.example.com`,
//! which are not valid URLs.

/// Default port for a scheme: 443 for `https`/`wss`, 80 otherwise
pub fn default_port(scheme: &str) -> u16 {
    match scheme.to_ascii_lowercase().as_str() {
        "https" | "wss" => 443,
        _ => 80,
    }
}

/// Build a `host:port` origin statement from a URL or host-source expression.
///
/// Returns `None` when the input has no `scheme://authority` part.
pub fn to_origin(uri: &str) -> Option<String> {
    let (scheme, rest) = uri.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    // Drop any userinfo
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if authority.is_empty() {
        return None;
    }

    let (host, port) = split_host_port(authority);
    let port = port.unwrap_or_else(|| default_port(scheme));

    Some(format!("{}:{}", host.to_ascii_lowercase(), port))
}

/// Lowercased hostname of a URL, if it has one
pub fn hostname_of(uri: &str) -> Option<String> {
    let parsed = url::Url::parse(uri).ok()?;
    parsed.host_str().map(|host| host.to_ascii_lowercase())
}

fn split_host_port(authority: &str) -> (&str, Option<u16>) {
    // IPv6 literal, e.g. [::1]:8080
    if authority.starts_with('[') {
        if let Some(end) = authority.find(']') {
            let host = &authority[..=end];
            let port = authority[end + 1..]
                .strip_prefix(':')
                .and_then(|p| p.parse().ok());
            return (host, port);
        }
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host, Some(port)),
            // Wildcard or garbage port: fall back to the scheme default
            Err(_) => (host, None),
        },
        None => (authority, None),
    }
}
