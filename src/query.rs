//! Query-string handling for the authorization redirect contract.
//!
//! The provider hands the authorization code back as a `code` query
//! parameter. Parsing is deliberately literal: pairs are split on `&`, keys
//! and values on the first `=` only, and values are not percent-decoded, so
//! a literal `=` inside the code survives intact.

/// Split a URL into base, query (without `?`), and fragment (with `#`).
fn split_url(url: &str) -> (&str, Option<&str>, Option<&str>) {
    let (without_fragment, fragment) = match url.find('#') {
        Some(i) => (&url[..i], Some(&url[i..])),
        None => (url, None),
    };
    match without_fragment.find('?') {
        Some(i) => (
            &without_fragment[..i],
            Some(&without_fragment[i + 1..]),
            fragment,
        ),
        None => (without_fragment, None, fragment),
    }
}

/// Extract the authorization code from a URL, if present.
///
/// The first `code` parameter wins when the query carries duplicates.
pub fn code_param(url: &str) -> Option<String> {
    let (_, query, _) = split_url(url);
    for pair in query?.split('&') {
        let mut parts = pair.splitn(2, '=');
        if parts.next() == Some("code") {
            return Some(parts.next().unwrap_or_default().to_string());
        }
    }
    None
}

/// Remove every `code` parameter from a URL, leaving all other parameters
/// and their relative order untouched. Drops the `?` when nothing remains.
pub fn strip_code_param(url: &str) -> String {
    let (base, query, fragment) = split_url(url);
    let Some(query) = query else {
        return url.to_string();
    };
    let kept = query
        .split('&')
        .filter(|pair| pair.splitn(2, '=').next() != Some("code"))
        .collect::<Vec<_>>()
        .join("&");
    let mut out = String::from(base);
    if !kept.is_empty() {
        out.push('?');
        out.push_str(&kept);
    }
    if let Some(fragment) = fragment {
        out.push_str(fragment);
    }
    out
}
