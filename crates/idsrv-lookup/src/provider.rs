//! A single source of 3PID mappings, consulted by
//! [`PriorityLookupStrategy`](crate::PriorityLookupStrategy).

use async_trait::async_trait;
use idsrv_core::{Provenance, SingleLookupReply, SingleLookupRequest, ThreePidMapping};

use crate::strategy::StrategyError;

#[async_trait]
pub trait ThreePidProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether the provider answers from data this server owns. Remote
    /// providers query other servers and are subject to the recursion policy.
    fn is_local(&self) -> bool;

    /// Higher priorities are consulted first.
    fn priority(&self) -> i32;

    async fn find_single(
        &self,
        request: &SingleLookupRequest,
    ) -> Result<Option<SingleLookupReply>, StrategyError>;

    /// Resolve what it can of `pending`, returning only resolved mappings.
    async fn populate(
        &self,
        provenance: &Provenance,
        pending: &[ThreePidMapping],
    ) -> Result<Vec<ThreePidMapping>, StrategyError>;
}
