//! Hostname extraction from site URLs.

use reqwest::Url;

/// Host part of a URL, without scheme, credentials, port, path or query.
///
/// Returns `None` when the URL cannot be parsed or has no host.
pub fn hostname(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some(host.trim_end_matches('.').to_ascii_lowercase())
}

/// Name to use for a registration lookup of `host`.
///
/// A leading `www.` label is not part of the registered name.
pub fn registration_name(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}
