//! # Request Origin Extractor
//!
//! [`RequestOrigin`] captures the transport facts the lookup pipeline needs
//! (peer address and headers) and exposes them as a
//! [`TransportContext`].

use std::borrow::Cow;
use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use idsrv_lookup::TransportContext;

/// Peer address reported when the server was not started with connect info.
pub const UNKNOWN_PEER: &str = "unknown";

/// Peer address and headers of the current request.
#[derive(Debug, Clone)]
pub struct RequestOrigin {
    peer: Option<SocketAddr>,
    headers: HeaderMap,
}

impl RequestOrigin {
    pub fn new(peer: Option<SocketAddr>, headers: HeaderMap) -> Self {
        Self { peer, headers }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::new(peer, parts.headers.clone()))
    }
}

impl TransportContext for RequestOrigin {
    fn peer_address(&self) -> String {
        self.peer
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_PEER.to_string())
    }

    fn header(&self, name: &str) -> Option<Cow<'_, str>> {
        let value = self.headers.get(name)?;
        Some(match value.to_str() {
            Ok(ascii) => Cow::Borrowed(ascii),
            Err(_) => Cow::Owned(value.as_bytes().iter().map(|&b| char::from(b)).collect()),
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use idsrv_lookup::resolve;

    use super::*;

    #[test]
    fn peer_address_drops_port() {
        let peer = "10.0.0.3:51234".parse().unwrap();
        let origin = RequestOrigin::new(Some(peer), HeaderMap::new());
        assert_eq!(origin.peer_address(), "10.0.0.3");
    }

    #[test]
    fn missing_peer_is_unknown() {
        let origin = RequestOrigin::new(None, HeaderMap::new());
        assert_eq!(origin.peer_address(), UNKNOWN_PEER);
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("a.org,b.org"));
        let origin = RequestOrigin::new(None, headers);
        assert_eq!(
            origin.header("X-Forwarded-For").as_deref(),
            Some("a.org,b.org")
        );
        assert_eq!(origin.header("User-Agent"), None);
    }

    #[test]
    fn non_ascii_forwarded_for_keeps_request_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_bytes(b"10.0.0.1,h\xe9st.example").unwrap(),
        );
        let origin = RequestOrigin::new(Some("127.0.0.1:5000".parse().unwrap()), headers);
        assert_eq!(
            origin.header("X-Forwarded-For").as_deref(),
            Some("10.0.0.1,h\u{e9}st.example")
        );

        let provenance = resolve(&origin);
        assert!(!provenance.is_recursive());
        assert_eq!(
            provenance.recursion_hosts(),
            ["10.0.0.1", "h\u{e9}st.example"]
        );
        assert_eq!(provenance.requester(), "h\u{e9}st.example");
    }

    #[test]
    fn ipv6_peer() {
        let origin = RequestOrigin::new(Some("[::1]:8090".parse().unwrap()), HeaderMap::new());
        assert_eq!(origin.peer_address(), "::1");
    }
}
