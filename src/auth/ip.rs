//! Client IP extraction utilities.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::ConnectInfo,
    http::{Extensions, HeaderMap},
};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Extract the client IP.
///
/// With `trust_forwarded_for`, the first hop of `X-Forwarded-For` wins when it
/// parses as an IP. Otherwise the socket address from `ConnectInfo` is used.
pub fn extract_client_ip(
    headers: &HeaderMap,
    extensions: &Extensions,
    trust_forwarded_for: bool,
) -> Option<String> {
    if trust_forwarded_for {
        if let Some(ip) = forwarded_for(headers) {
            return Some(ip.to_string());
        }
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    let value = headers.get(FORWARDED_FOR)?.to_str().ok()?;
    value.split(',').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_socket(addr: &str) -> Extensions {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(addr.parse::<SocketAddr>().unwrap()));
        extensions
    }

    #[test]
    fn test_socket_address() {
        let ip = extract_client_ip(&HeaderMap::new(), &with_socket("10.0.0.1:4000"), false);
        assert_eq!(ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_forwarded_for_ignored_unless_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("203.0.113.7, 10.0.0.2"));
        let extensions = with_socket("10.0.0.1:4000");

        assert_eq!(
            extract_client_ip(&headers, &extensions, false).as_deref(),
            Some("10.0.0.1")
        );
        assert_eq!(
            extract_client_ip(&headers, &extensions, true).as_deref(),
            Some("203.0.113.7")
        );
    }

    #[test]
    fn test_unparseable_forwarded_for_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("unknown"));

        assert_eq!(
            extract_client_ip(&headers, &with_socket("[::1]:4000"), true).as_deref(),
            Some("::1")
        );
        assert_eq!(extract_client_ip(&headers, &Extensions::new(), true), None);
    }
}
