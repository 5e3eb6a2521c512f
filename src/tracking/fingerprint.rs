//! Client fingerprint extraction from HTTP headers
//!
//! A fingerprint is the (IP, user-agent, referrer) tuple used to identify a
//! requester for duplicate filtering. Missing headers collapse to fixed
//! sentinel values so that two header-less requests still compare equal.

use axum::http::HeaderMap;

/// Sentinel for a missing IP or user-agent
pub const UNKNOWN: &str = "unknown";

/// Sentinel referrer for requests without a Referer header
pub const DIRECT: &str = "direct";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub ip: String,
    pub user_agent: String,
    pub referrer: String,
}

/// Extract the requester fingerprint from request headers
///
/// The client IP is the first (leftmost) entry of `x-forwarded-for`; there
/// is no socket-address fallback, so direct connections without the header
/// are all attributed to the `unknown` sentinel.
pub fn extract_fingerprint(headers: &HeaderMap) -> Fingerprint {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string();

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string();

    let referrer = headers
        .get("referer")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DIRECT)
        .to_string();

    Fingerprint {
        ip,
        user_agent,
        referrer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_sentinels_for_missing_headers() {
        let fp = extract_fingerprint(&HeaderMap::new());

        assert_eq!(fp.ip, "unknown");
        assert_eq!(fp.user_agent, "unknown");
        assert_eq!(fp.referrer, "direct");
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1"),
        );

        let fp = extract_fingerprint(&headers);
        assert_eq!(fp.ip, "203.0.113.1");
    }

    #[test]
    fn test_full_fingerprint() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0"));
        headers.insert("referer", HeaderValue::from_static("https://blog.example/"));

        let fp = extract_fingerprint(&headers);
        assert_eq!(fp.ip, "203.0.113.7");
        assert_eq!(fp.user_agent, "Mozilla/5.0");
        assert_eq!(fp.referrer, "https://blog.example/");
    }

    #[test]
    fn test_empty_header_values_fall_back() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        headers.insert("user-agent", HeaderValue::from_static(""));

        let fp = extract_fingerprint(&headers);
        assert_eq!(fp.ip, "unknown");
        assert_eq!(fp.user_agent, "unknown");
    }
}
