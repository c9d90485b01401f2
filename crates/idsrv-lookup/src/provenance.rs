//! # Request Provenance
//!
//! Derives a [`Provenance`] from transport metadata.
//!
//! ## Rules
//!
//! - `X-Forwarded-For` absent or blank: the request is recursive and the
//!   requester is the immediate peer address.
//! - Otherwise the header value is split on `,` without trimming. The
//!   requester is the last element and the request is not recursive.
//!
//! Header names are matched case-insensitively. A header that is present
//! always counts, whatever bytes its value holds.

use std::borrow::Cow;

use idsrv_core::Provenance;

/// Forwarding chain header set by relaying identity servers.
pub const FORWARDED_FOR: &str = "X-Forwarded-For";

/// Client user agent header.
pub const USER_AGENT: &str = "User-Agent";

/// Read-only view of the transport a request arrived on.
pub trait TransportContext: Send + Sync {
    /// Address of the immediate peer, without port.
    fn peer_address(&self) -> String;

    /// First value of header `name`, matched case-insensitively.
    ///
    /// Returns `Some` whenever the header is present. Values that are not
    /// visible ASCII are decoded as ISO-8859-1 rather than dropped.
    fn header(&self, name: &str) -> Option<Cow<'_, str>>;
}

/// Derive provenance from a transport.
pub fn resolve(transport: &dyn TransportContext) -> Provenance {
    let user_agent = transport.header(USER_AGENT).map(Cow::into_owned);
    let forwarded_for = transport.header(FORWARDED_FOR);
    tracing::debug!(x_forwarded_for = ?forwarded_for, "resolving request provenance");

    match forwarded_for {
        Some(chain) if !chain.trim().is_empty() => Provenance::forwarded(&chain, user_agent),
        _ => Provenance::direct(transport.peer_address(), user_agent),
    }
}

/// In-memory transport, used when a request does not come from an HTTP
/// stack (tests, embedding).
#[derive(Debug, Clone, Default)]
pub struct SimpleTransport {
    peer: String,
    headers: Vec<(String, String)>,
}

impl SimpleTransport {
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl TransportContext for SimpleTransport {
    fn peer_address(&self) -> String {
        self.peer.clone()
    }

    fn header(&self, name: &str) -> Option<Cow<'_, str>> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| Cow::Borrowed(v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_header_is_recursive() {
        let p = resolve(&SimpleTransport::new("192.168.1.4"));
        assert!(p.is_recursive());
        assert!(p.recursion_hosts().is_empty());
        assert_eq!(p.requester(), "192.168.1.4");
        assert_eq!(p.user_agent(), None);
    }

    #[test]
    fn blank_header_is_recursive() {
        for blank in ["", "   ", "\t"] {
            let t = SimpleTransport::new("10.1.1.1").with_header(FORWARDED_FOR, blank);
            let p = resolve(&t);
            assert!(p.is_recursive(), "{blank:?}");
            assert_eq!(p.requester(), "10.1.1.1");
        }
    }

    #[test]
    fn header_name_is_case_insensitive() {
        let t = SimpleTransport::new("10.1.1.1")
            .with_header("x-forwarded-for", "id.example.org")
            .with_header("user-agent", "sydent/2");
        let p = resolve(&t);
        assert!(!p.is_recursive());
        assert_eq!(p.requester(), "id.example.org");
        assert_eq!(p.user_agent(), Some("sydent/2"));
    }

    #[test]
    fn chain_keeps_order_and_whitespace() {
        let t = SimpleTransport::new("10.1.1.1").with_header(FORWARDED_FOR, "a.org, b.org,c.org");
        let p = resolve(&t);
        assert_eq!(p.recursion_hosts(), ["a.org", " b.org", "c.org"]);
        assert_eq!(p.requester(), "c.org");
    }

    #[test]
    fn non_ascii_chain_is_forwarded() {
        let t = SimpleTransport::new("127.0.0.1")
            .with_header(FORWARDED_FOR, "10.0.0.1,h\u{e9}st.example");
        let p = resolve(&t);
        assert!(!p.is_recursive());
        assert_eq!(p.recursion_hosts(), ["10.0.0.1", "h\u{e9}st.example"]);
        assert_eq!(p.requester(), "h\u{e9}st.example");
    }

    #[test]
    fn commas_only_header() {
        let t = SimpleTransport::new("10.1.1.1").with_header(FORWARDED_FOR, ",,");
        let p = resolve(&t);
        assert!(!p.is_recursive());
        assert_eq!(p.recursion_hosts(), ["", "", ""]);
        assert_eq!(p.requester(), "");
    }
}
