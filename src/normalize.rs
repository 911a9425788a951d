//! Search-engine redirect unwrapping.
//!
//! Bing wraps organic links as `https://www.bing.com/ck/a?...&u=a1<base64>`,
//! Google as `https://www.google.com/url?...&url=<percent-encoded>`, and
//! DuckDuckGo as `https://duckduckgo.com/l/?uddg=<percent-encoded>`. Everything
//! downstream wants the publisher URL.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use reqwest::Url;

/// Marker Bing puts in front of the base64 payload.
const ENCODED_PREFIX: &str = "a1";

/// Query parameters that carry the real destination on redirector hosts.
const TARGET_PARAMS: &[&str] = &["u", "url", "q", "uddg"];

/// Hosts that only ever show up when a scraper picked the wrong anchor.
const SINK_HOSTS: &[&str] = &[
    "example.invalid",
    "invalid",
    "0.0.0.0",
    "placeholder.com",
    "via.placeholder.com",
    "go.microsoft.com",
];

/// Nested redirectors (Google wrapping Bing and so on) unwrap this deep at most.
const MAX_UNWRAP_DEPTH: usize = 3;

/// Unwrap redirector links and reject anything that is not a usable
/// absolute `http(s)` destination.
///
/// Already-clean URLs come back unchanged, so the function is idempotent.
pub fn normalize(raw_url: &str) -> Option<String> {
    let mut current = raw_url.trim().to_string();
    if current.is_empty() {
        return None;
    }

    if let Some(decoded) = decode_prefixed(&current) {
        current = decoded;
    }

    for _ in 0..MAX_UNWRAP_DEPTH {
        let parsed = Url::parse(&current).ok()?;
        if !is_redirector(&parsed) {
            break;
        }
        // A redirector we cannot unwrap points back at the search engine.
        current = redirect_target(&parsed)?;
    }

    let parsed = Url::parse(&current).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_ascii_lowercase();
    if is_sink_host(&host) || is_redirector(&parsed) {
        return None;
    }

    Some(current)
}

/// Decode the `a1` + base64 scheme. Only accepted when the payload decodes to
/// an absolute http(s) URL, so ordinary strings that happen to start with
/// `a1` pass through.
fn decode_prefixed(value: &str) -> Option<String> {
    let payload = value.strip_prefix(ENCODED_PREFIX)?;
    // Form decoding turns `+` into a space before we ever see the value.
    let payload = payload.replace(' ', "+");
    let payload = payload.trim_end_matches('=');

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .ok()?;
    let decoded = String::from_utf8(bytes).ok()?;

    if is_absolute_http(&decoded) {
        Some(decoded)
    } else {
        None
    }
}

fn redirect_target(url: &Url) -> Option<String> {
    let value = TARGET_PARAMS.iter().find_map(|param| {
        url.query_pairs()
            .find(|(key, _)| key == param)
            .map(|(_, value)| value.into_owned())
    })?;

    if let Some(decoded) = decode_prefixed(&value) {
        return Some(decoded);
    }

    if is_absolute_http(&value) {
        // Escapes left in the target's own query belong to the target.
        return Some(value);
    }

    // `query_pairs` already percent-decoded once; some engines double-encode.
    let lower = value.to_ascii_lowercase();
    if lower.starts_with("http%3a") || lower.starts_with("https%3a") {
        let decoded = urlencoding::decode(&value).ok()?.into_owned();
        if is_absolute_http(&decoded) {
            return Some(decoded);
        }
    }
    None
}

fn is_absolute_http(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn is_redirector(url: &Url) -> bool {
    let host = match url.host_str() {
        Some(h) => h.to_ascii_lowercase(),
        None => return false,
    };
    let path = url.path();

    (host_matches(&host, "bing.com") && path.starts_with("/ck/"))
        || (host_matches(&host, "google.com") && path == "/url")
        || (host_matches(&host, "duckduckgo.com") && path.starts_with("/l/"))
}

fn is_sink_host(host: &str) -> bool {
    SINK_HOSTS.iter().any(|sink| host_matches(host, sink))
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bing_wrap(target: &str) -> String {
        let encoded = URL_SAFE_NO_PAD.encode(target);
        format!(
            "https://www.bing.com/ck/a?!&&p=3f1c2d&ptn=3&ver=2&hsh=4&u=a1{}&ntb=1",
            encoded
        )
    }

    #[test]
    fn test_unwraps_bing_redirector() {
        let wrapped = bing_wrap("https://example.com/sds.pdf");
        assert_eq!(
            normalize(&wrapped).as_deref(),
            Some("https://example.com/sds.pdf")
        );
    }

    #[test]
    fn test_unwraps_google_redirector() {
        let wrapped = "https://www.google.com/url?sa=t&url=https%3A%2F%2Fwww.wd40.com.au%2Fsds%2Fmulti-use.pdf&usg=abc";
        assert_eq!(
            normalize(wrapped).as_deref(),
            Some("https://www.wd40.com.au/sds/multi-use.pdf")
        );

        // An escaped `&` inside the target's query stays escaped.
        let escaped = "https://www.google.com/url?url=https%3A%2F%2Fshop.com.au%2Fsearch%3Fq%3Dsalt%2526pepper%26page%3D2";
        assert_eq!(
            normalize(escaped).as_deref(),
            Some("https://shop.com.au/search?q=salt%26pepper&page=2")
        );
    }

    #[test]
    fn test_unwraps_double_encoded_target() {
        let wrapped = "https://www.google.com/url?url=https%253A%252F%252Fshop.com.au%252Fp%252F42";
        assert_eq!(normalize(wrapped).as_deref(), Some("https://shop.com.au/p/42"));
    }

    #[test]
    fn test_unwraps_duckduckgo_redirector() {
        let wrapped = "https://duckduckgo.com/l/?uddg=https%3A%2F%2Fshop.example.com.au%2Fp%2F123&rut=xyz";
        assert_eq!(
            normalize(wrapped).as_deref(),
            Some("https://shop.example.com.au/p/123")
        );
    }

    #[test]
    fn test_decodes_bare_prefixed_payload() {
        let raw = format!("a1{}", URL_SAFE_NO_PAD.encode("https://example.com/sds.pdf"));
        assert_eq!(normalize(&raw).as_deref(), Some("https://example.com/sds.pdf"));
    }

    #[test]
    fn test_idempotent_over_fixtures() {
        let fixtures = vec![
            "https://example.com/sds.pdf".to_string(),
            "http://www.bunnings.com.au/wd-40-multi-use-product_p1234".to_string(),
            "https://example.com/path?query=1#frag".to_string(),
            bing_wrap("https://example.com/sds.pdf"),
            bing_wrap(&bing_wrap("https://example.com/nested.pdf")),
            "https://www.google.com/url?url=https%3A%2F%2Fexample.com%2Fa".to_string(),
        ];
        for fixture in fixtures {
            let once = normalize(&fixture);
            let twice = once.as_deref().and_then(normalize);
            assert_eq!(once, twice, "not idempotent for {}", fixture);
        }
    }

    #[test]
    fn test_clean_url_unchanged() {
        let url = "https://www.chemwatch.net/sds/Isocol.pdf";
        assert_eq!(normalize(url).as_deref(), Some(url));
    }

    #[test]
    fn test_rejects_non_http_and_relative() {
        assert_eq!(normalize("javascript:void(0)"), None);
        assert_eq!(normalize("/search?q=wd40"), None);
        assert_eq!(normalize("ftp://example.com/file.pdf"), None);
        assert_eq!(normalize(""), None);
    }

    #[test]
    fn test_rejects_sink_hosts() {
        assert_eq!(normalize("https://example.invalid/page"), None);
        assert_eq!(normalize("http://0.0.0.0/"), None);
    }

    #[test]
    fn test_rejects_undecodable_redirector() {
        assert_eq!(normalize("https://www.bing.com/ck/a?!&&p=abc&ntb=1"), None);
    }
}
