use std::net::IpAddr;

/// Parses the original client IP from an `X-Forwarded-For` header value.
///
/// Format: "client, proxy1, proxy2, ..." - the leftmost entry is the original
/// client. Returns `None` when that entry is missing or not an IP address.
#[must_use]
pub fn parse_original_client_ip(xff_header: &str) -> Option<IpAddr> {
    xff_header
        .split(',')
        .next()
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .and_then(|ip| ip.parse().ok())
}
