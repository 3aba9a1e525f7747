//! Network layer for `MockNet`
//!
//! Provides the stub listener, the control API and upstream forwarding,
//! all on hyper with bounded concurrency.

mod client;
mod connection_pool;
mod control;
mod http;
mod server;

pub use client::{ForwardedResponse, HttpClient, UPSTREAM_TIMEOUT_MS};
pub use connection_pool::{ConnectionGuard, ConnectionPool};
pub use control::ControlApi;
pub use http::{HttpHandler, ResponseBody};
pub use server::MockServer;

/// Graceful shutdown timeout
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// Headers owned by the transport rather than by a stub
///
/// Hop-by-hop headers plus `content-length`, which hyper derives from the body.
#[must_use]
pub fn is_transport_header(name: &str) -> bool {
    const TRANSPORT_HEADERS: [&str; 10] = [
        "connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "proxy-connection",
        "te",
        "trailer",
        "transfer-encoding",
        "upgrade",
        "content-length",
    ];

    TRANSPORT_HEADERS
        .iter()
        .any(|header| header.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_headers() {
        assert!(is_transport_header("Transfer-Encoding"));
        assert!(is_transport_header("content-length"));
        assert!(is_transport_header("CONNECTION"));
        assert!(!is_transport_header("Content-Type"));
        assert!(!is_transport_header("Authorization"));
    }
}
