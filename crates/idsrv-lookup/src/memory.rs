//! # In-Memory Provider
//!
//! Local provider over a concurrent map keyed by `(medium, address)`.
//! Each entry keeps the time its mapping was asserted, so repeated lookups
//! of the same 3PID produce identical replies (and identical canonical bytes).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use idsrv_core::{MatrixId, Provenance, SingleLookupReply, SingleLookupRequest, ThreePidMapping};

use crate::provider::ThreePidProvider;
use crate::strategy::StrategyError;

#[derive(Debug, Clone)]
struct Entry {
    mxid: MatrixId,
    ts: DateTime<Utc>,
}

/// Mappings held in process memory.
#[derive(Debug)]
pub struct MemoryProvider {
    priority: i32,
    entries: DashMap<(String, String), Entry>,
}

impl MemoryProvider {
    pub const NAME: &'static str = "memory";

    pub fn new(priority: i32) -> Self {
        Self {
            priority,
            entries: DashMap::new(),
        }
    }

    /// Map `(medium, address)` to `mxid`, asserted now.
    pub fn insert(&self, medium: impl Into<String>, address: impl Into<String>, mxid: MatrixId) {
        self.insert_at(medium, address, mxid, Utc::now());
    }

    /// Map `(medium, address)` to `mxid`, asserted at `ts`.
    pub fn insert_at(
        &self,
        medium: impl Into<String>,
        address: impl Into<String>,
        mxid: MatrixId,
        ts: DateTime<Utc>,
    ) {
        self.entries
            .insert((medium.into(), address.into()), Entry { mxid, ts });
    }

    pub fn remove(&self, medium: &str, address: &str) -> bool {
        self.entries
            .remove(&(medium.to_string(), address.to_string()))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, medium: &str, address: &str) -> Option<Entry> {
        self.entries
            .get(&(medium.to_string(), address.to_string()))
            .map(|e| e.value().clone())
    }
}

#[async_trait]
impl ThreePidProvider for MemoryProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_local(&self) -> bool {
        true
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn find_single(
        &self,
        request: &SingleLookupRequest,
    ) -> Result<Option<SingleLookupReply>, StrategyError> {
        let found = self.get(&request.medium, &request.address);
        tracing::debug!(medium = %request.medium, found = found.is_some(), "memory lookup");
        Ok(found.map(|e| SingleLookupReply::new(request, e.mxid, e.ts)))
    }

    async fn populate(
        &self,
        _provenance: &Provenance,
        pending: &[ThreePidMapping],
    ) -> Result<Vec<ThreePidMapping>, StrategyError> {
        Ok(pending
            .iter()
            .filter_map(|m| {
                self.get(&m.medium, &m.value)
                    .map(|e| m.clone().resolved(e.mxid))
            })
            .collect())
    }
}
