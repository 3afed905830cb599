//! TLS-redirect policy.
//!
//! Ported from `cockpitwebserver.c`'s `process_request`/`is_localhost_connection`:
//! a plaintext request is bounced to `https://` unless it hits the
//! configured exception prefix or arrives on a loopback address (where
//! there is no network path for an eavesdropper to exploit).

use std::net::{IpAddr, SocketAddr};

use enums::Status;
use headers::HeaderMap;

/// Decide whether a plaintext turn should be redirected to HTTPS.
///
/// Only called when the connection actually requested redirect checking
/// (`check_tls_redirect`, set by `ConnectionFSM` when the `REDIRECT_TLS`
/// flag is on and the peeked first byte was not a TLS handshake) and no
/// earlier delayed reply has already been chosen.
pub struct RedirectPolicy<'a> {
    pub ssl_exception_prefix: &'a str,
}

impl<'a> RedirectPolicy<'a> {
    pub fn new(ssl_exception_prefix: &'a str) -> RedirectPolicy<'a> {
        RedirectPolicy { ssl_exception_prefix: ssl_exception_prefix }
    }

    /// Returns `Some(Status::MovedPermanently)` if this turn should be
    /// redirected, `None` if it should proceed to dispatch as usual.
    pub fn decide(&self, path: &str, local_addr: &SocketAddr) -> Option<Status> {
        if !self.ssl_exception_prefix.is_empty() && path_has_prefix(path, self.ssl_exception_prefix) {
            return None;
        }
        if is_loopback(local_addr) {
            return None;
        }
        Some(Status::MovedPermanently)
    }

    /// Build the `Location` header value and HTML body for the 301.
    ///
    /// `host` is the incoming `Host` header taken verbatim (empty if it was
    /// somehow missing, though `RequestParser` already rejects that case
    /// before redirect policy ever runs).
    pub fn location(host: &str, path: &str) -> String {
        format!("https://{}{}", host, path)
    }
}

/// `host` lookup helper for callers that only have a `HeaderMap` handy.
pub fn host_header(headers: &HeaderMap) -> &str {
    headers.get("Host").unwrap_or("")
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    match path.as_bytes().get(prefix.len()) {
        None => true,
        Some(&b'/') => true,
        _ => false,
    }
}

fn is_loopback(addr: &SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;
    use enums::Status;
    use super::RedirectPolicy;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn redirects_non_loopback_without_exception() {
        let policy = RedirectPolicy::new("");
        assert_matches!(policy.decide("/shell/index.html", &addr("10.0.0.1:8080")),
                         Some(Status::MovedPermanently));
    }

    #[test]
    fn skips_loopback() {
        let policy = RedirectPolicy::new("");
        assert_matches!(policy.decide("/shell/index.html", &addr("127.0.0.1:8080")), None);
        assert_matches!(policy.decide("/shell/index.html", &addr("[::1]:8080")), None);
    }

    #[test]
    fn skips_exception_prefix() {
        let policy = RedirectPolicy::new("/metrics");
        assert_matches!(policy.decide("/metrics/cpu", &addr("10.0.0.1:8080")), None);
        assert_matches!(policy.decide("/metricsboo", &addr("10.0.0.1:8080")),
                         Some(Status::MovedPermanently));
    }

    #[test]
    fn location_uses_host_and_path_verbatim() {
        let loc = RedirectPolicy::location("h", "/shell/index.html");
        assert_eq!(loc, "https://h/shell/index.html");
    }
}
