//! Canonical link form used as a mention's identity key.

use nd_core::config::DEFAULT_TRACKING_PARAMS;
use url::Url;

/// Canonicalize with the default tracking-parameter list.
///
/// Every trailing slash is stripped, so `https://a.com/a//` becomes `https://a.com/a`.
pub fn canonicalize(input: &str) -> String {
    canonicalize_with(input, DEFAULT_TRACKING_PARAMS)
}

/// Strip fragment and tracking params, drop an empty query, lowercase the host
/// and trailing slashes. Unparseable input comes back trimmed.
///
/// Repeated trailing slashes are all stripped so the result is a fixed point.
pub fn canonicalize_with<S: AsRef<str>>(input: &str, tracking: &[S]) -> String {
    let trimmed = input.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !tracking.iter().any(|t| t.as_ref() == k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    if let Some(host) = url.host_str() {
        let lower = host.to_lowercase();
        if lower != host {
            // Only non-special schemes keep host case through parsing.
            let _ = url.set_host(Some(&lower));
        }
    }

    let s = url.to_string();
    s.trim_end_matches('/').to_string()
}

/// Canonical form of a link usable as a grouping key. `None` for blank or
/// unparseable input.
pub fn canonical_key<S: AsRef<str>>(input: &str, tracking: &[S]) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() || Url::parse(trimmed).is_err() {
        return None;
    }
    Some(canonicalize_with(trimmed, tracking)).filter(|c| !c.is_empty())
}

/// Lowercased host of a link, if it parses.
pub fn host_of(link: &str) -> Option<String> {
    let url = Url::parse(link.trim()).ok()?;
    url.host_str().map(|h| h.to_lowercase())
}
