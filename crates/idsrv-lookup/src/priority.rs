//! # Priority Lookup Strategy
//!
//! The default [`LookupStrategy`]: an ordered chain of providers.
//!
//! ## Recursion Invariant
//!
//! Remote providers are consulted only when the request is recursive,
//! recursion is enabled, and the requester's address is inside an allowed
//! range. A forwarded request never reaches a remote provider, so two
//! servers forwarding to each other cannot loop.

use std::cmp::Reverse;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use idsrv_core::{
    BulkLookupRequest, Provenance, SingleLookupReply, SingleLookupRequest, ThreePidMapping,
};

use crate::cidr::CidrRange;
use crate::provider::ThreePidProvider;
use crate::strategy::{LookupStrategy, StrategyError};

/// Who may cause this server to query remote providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursionPolicy {
    enabled: bool,
    allowed: Vec<CidrRange>,
}

impl RecursionPolicy {
    pub fn new(enabled: bool, allowed: Vec<CidrRange>) -> Self {
        Self { enabled, allowed }
    }

    /// Local providers only, for every request.
    pub fn disabled() -> Self {
        Self::new(false, Vec::new())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a request with this provenance may reach remote providers.
    pub fn allows_remote(&self, provenance: &Provenance) -> bool {
        if !self.enabled || !provenance.is_recursive() {
            return false;
        }
        match provenance.requester().parse::<IpAddr>() {
            Ok(addr) => self.allowed.iter().any(|range| range.contains(&addr)),
            Err(_) => false,
        }
    }
}

impl Default for RecursionPolicy {
    fn default() -> Self {
        Self::new(true, CidrRange::default_allowed())
    }
}

/// Providers consulted in descending priority order.
pub struct PriorityLookupStrategy {
    providers: Vec<Arc<dyn ThreePidProvider>>,
    policy: RecursionPolicy,
}

impl PriorityLookupStrategy {
    /// Providers with equal priority keep their given order.
    pub fn new(mut providers: Vec<Arc<dyn ThreePidProvider>>, policy: RecursionPolicy) -> Self {
        providers.sort_by_key(|p| Reverse(p.priority()));
        Self { providers, policy }
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.name())
    }

    pub fn policy(&self) -> &RecursionPolicy {
        &self.policy
    }

    fn eligible(&self, provenance: &Provenance) -> Vec<Arc<dyn ThreePidProvider>> {
        let allow_remote = self.policy.allows_remote(provenance);
        if !allow_remote {
            tracing::debug!(
                requester = provenance.requester(),
                recursive = provenance.is_recursive(),
                "remote providers not eligible"
            );
        }
        self.providers
            .iter()
            .filter(|p| allow_remote || p.is_local())
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for PriorityLookupStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityLookupStrategy")
            .field("providers", &self.providers().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .finish()
    }
}

#[async_trait]
impl LookupStrategy for PriorityLookupStrategy {
    async fn find_single(
        &self,
        request: &SingleLookupRequest,
    ) -> Result<Option<SingleLookupReply>, StrategyError> {
        for provider in self.eligible(&request.provenance) {
            if let Some(reply) = provider.find_single(request).await? {
                tracing::info!(provider = provider.name(), mxid = %reply.mxid(), "mapping found");
                return Ok(Some(reply));
            }
        }
        Ok(None)
    }

    async fn find_bulk(
        &self,
        request: &BulkLookupRequest,
    ) -> Result<Vec<ThreePidMapping>, StrategyError> {
        let mut pending = request.mappings.clone();
        let mut found = Vec::new();
        for provider in self.eligible(&request.provenance) {
            if pending.is_empty() {
                break;
            }
            let resolved: Vec<ThreePidMapping> = provider
                .populate(&request.provenance, &pending)
                .await?
                .into_iter()
                .filter(ThreePidMapping::is_resolved)
                .collect();
            tracing::debug!(
                provider = provider.name(),
                resolved = resolved.len(),
                "bulk provider pass"
            );
            pending.retain(|m| !resolved.iter().any(|r| r.same_threepid(m)));
            found.extend(resolved);
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use idsrv_core::MatrixId;

    use super::*;
    use crate::memory::MemoryProvider;

    /// Remote provider that answers every 3PID and counts calls.
    struct EchoRemote {
        calls: AtomicUsize,
        priority: i32,
    }

    impl EchoRemote {
        fn new(priority: i32) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                priority,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ThreePidProvider for EchoRemote {
        fn name(&self) -> &str {
            "echo"
        }

        fn is_local(&self) -> bool {
            false
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        async fn find_single(
            &self,
            request: &SingleLookupRequest,
        ) -> Result<Option<SingleLookupReply>, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mxid = MatrixId::parse("@remote:upstream.org").unwrap();
            let reply = SingleLookupReply::new(request, mxid, chrono::Utc::now());
            Ok(Some(reply))
        }

        async fn populate(
            &self,
            _provenance: &Provenance,
            pending: &[ThreePidMapping],
        ) -> Result<Vec<ThreePidMapping>, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mxid = MatrixId::parse("@remote:upstream.org").unwrap();
            Ok(pending.iter().map(|m| m.clone().resolved(mxid.clone())).collect())
        }
    }

    fn dyn_remote(remote: &Arc<EchoRemote>) -> Arc<dyn ThreePidProvider> {
        remote.clone()
    }

    fn memory(priority: i32, entries: &[(&str, &str, &str)]) -> Arc<dyn ThreePidProvider> {
        let p = MemoryProvider::new(priority);
        for (medium, address, mxid) in entries {
            p.insert(*medium, *address, MatrixId::parse(mxid).unwrap());
        }
        Arc::new(p)
    }

    fn single(provenance: Provenance, medium: &str, address: &str) -> SingleLookupRequest {
        SingleLookupRequest::new(provenance, medium, address)
    }

    #[test]
    fn providers_sorted_by_descending_priority() {
        let strategy = PriorityLookupStrategy::new(
            vec![dyn_remote(&EchoRemote::new(0)), memory(10, &[])],
            RecursionPolicy::default(),
        );
        assert_eq!(strategy.providers().collect::<Vec<_>>(), ["memory", "echo"]);
    }

    #[test]
    fn policy_requires_recursive_enabled_and_allowed() {
        let policy = RecursionPolicy::default();
        let direct = |peer: &str| Provenance::direct(peer, None);
        assert!(policy.allows_remote(&direct("127.0.0.1")));
        assert!(policy.allows_remote(&direct("192.168.10.2")));
        assert!(!policy.allows_remote(&direct("8.8.8.8")));
        assert!(!policy.allows_remote(&direct("not-an-ip")));
        assert!(!policy.allows_remote(&Provenance::forwarded("127.0.0.1", None)));
        assert!(!RecursionPolicy::disabled().allows_remote(&direct("127.0.0.1")));
    }

    #[tokio::test]
    async fn first_provider_with_a_match_wins() {
        let remote = EchoRemote::new(0);
        let strategy = PriorityLookupStrategy::new(
            vec![
                dyn_remote(&remote),
                memory(10, &[("email", "a@example.org", "@a:example.org")]),
            ],
            RecursionPolicy::default(),
        );
        let request = single(Provenance::direct("127.0.0.1", None), "email", "a@example.org");
        let reply = strategy.find_single(&request).await.unwrap().unwrap();
        assert_eq!(reply.mxid().as_str(), "@a:example.org");
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn falls_through_to_remote_for_allowed_recursive_requests() {
        let remote = EchoRemote::new(0);
        let strategy = PriorityLookupStrategy::new(
            vec![dyn_remote(&remote), memory(10, &[])],
            RecursionPolicy::default(),
        );
        let request = single(Provenance::direct("10.0.0.7", None), "email", "x@example.org");
        let reply = strategy.find_single(&request).await.unwrap();
        assert_eq!(reply.unwrap().mxid().as_str(), "@remote:upstream.org");
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn remote_never_consulted_for_forwarded_or_outside_requests() {
        let remote = EchoRemote::new(0);
        let strategy = PriorityLookupStrategy::new(
            vec![dyn_remote(&remote), memory(10, &[])],
            RecursionPolicy::default(),
        );
        for provenance in [
            Provenance::forwarded("127.0.0.1", None),
            Provenance::direct("203.0.113.5", None),
        ] {
            let reply = strategy
                .find_single(&single(provenance, "email", "x@example.org"))
                .await
                .unwrap();
            assert!(reply.is_none());
        }
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn bulk_passes_only_pending_mappings_downstream() {
        let remote = EchoRemote::new(0);
        let strategy = PriorityLookupStrategy::new(
            vec![
                memory(10, &[("email", "a@example.org", "@a:example.org")]),
                dyn_remote(&remote),
            ],
            RecursionPolicy::default(),
        );
        let request = BulkLookupRequest::new(
            Provenance::direct("127.0.0.1", None),
            vec![
                ThreePidMapping::new("email", "a@example.org"),
                ThreePidMapping::new("msisdn", "15550001"),
            ],
        );
        let found = strategy.find_bulk(&request).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].mxid.as_ref().unwrap().as_str(), "@a:example.org");
        assert_eq!(found[1].value, "15550001");
        assert_eq!(
            found[1].mxid.as_ref().unwrap().as_str(),
            "@remote:upstream.org"
        );
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn bulk_skips_remaining_providers_once_all_resolved() {
        let remote = EchoRemote::new(0);
        let strategy = PriorityLookupStrategy::new(
            vec![
                memory(10, &[("email", "a@example.org", "@a:example.org")]),
                dyn_remote(&remote),
            ],
            RecursionPolicy::default(),
        );
        let request = BulkLookupRequest::new(
            Provenance::direct("127.0.0.1", None),
            vec![ThreePidMapping::new("email", "a@example.org")],
        );
        assert_eq!(strategy.find_bulk(&request).await.unwrap().len(), 1);
        assert_eq!(remote.calls(), 0);
    }
}
