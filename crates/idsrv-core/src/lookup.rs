//! # Lookup Data Model
//!
//! Request and reply types for single and bulk 3PID lookups. Every value here
//! lives for exactly one request/response cycle.
//!
//! ## Provenance Invariant
//!
//! A request is *recursive* when it came straight from an end client and
//! *forwarded* when another identity server relayed it. The recursion flag is
//! not stored: it is derived from the forwarding chain, so
//! `is_recursive() == recursion_hosts().is_empty()` holds for every value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::MatrixId;

/// Epoch milliseconds of 9999-12-31T23:59:59Z, the default `not_after`.
pub const DEFAULT_NOT_AFTER_MILLIS: i64 = 253_402_300_799_000;

/// Who asked, and through which servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    requester: String,
    user_agent: Option<String>,
    recursion_hosts: Vec<String>,
}

impl Provenance {
    /// A request received directly from a client at `peer`.
    pub fn direct(peer: impl Into<String>, user_agent: Option<String>) -> Self {
        Self {
            requester: peer.into(),
            user_agent,
            recursion_hosts: Vec::new(),
        }
    }

    /// A request relayed through the servers listed in a forwarding chain.
    ///
    /// The chain is split on `,` with no trimming of individual hosts. The
    /// requester is the last element, which is the empty string for a chain
    /// such as `",,"`.
    pub fn forwarded(chain: &str, user_agent: Option<String>) -> Self {
        let recursion_hosts: Vec<String> = chain.split(',').map(str::to_string).collect();
        let requester = recursion_hosts.last().cloned().unwrap_or_default();
        Self {
            requester,
            user_agent,
            recursion_hosts,
        }
    }

    /// The origin host or address of the request.
    pub fn requester(&self) -> &str {
        &self.requester
    }

    /// The client's user agent, if it sent one.
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Whether the request originated directly from a client.
    pub fn is_recursive(&self) -> bool {
        self.recursion_hosts.is_empty()
    }

    /// The forwarding chain, empty for recursive requests.
    pub fn recursion_hosts(&self) -> &[String] {
        &self.recursion_hosts
    }

    /// The `X-Forwarded-For` value to send when relaying this request upstream.
    pub fn upstream_forwarded_for(&self) -> String {
        if self.is_recursive() {
            self.requester.clone()
        } else {
            self.recursion_hosts.join(",")
        }
    }
}

/// Lookup of one 3PID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleLookupRequest {
    pub provenance: Provenance,
    /// Medium, passed through unvalidated (e.g. `email`, `msisdn`).
    pub medium: String,
    /// The identifier value within the medium.
    pub address: String,
}

impl SingleLookupRequest {
    pub fn new(
        provenance: Provenance,
        medium: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            provenance,
            medium: medium.into(),
            address: address.into(),
        }
    }
}

/// Lookup of many 3PIDs at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkLookupRequest {
    pub provenance: Provenance,
    pub mappings: Vec<ThreePidMapping>,
}

impl BulkLookupRequest {
    pub fn new(provenance: Provenance, mappings: Vec<ThreePidMapping>) -> Self {
        Self {
            provenance,
            mappings,
        }
    }
}

/// A `(medium, value)` pair, optionally resolved to a Matrix ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreePidMapping {
    pub medium: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mxid: Option<MatrixId>,
}

impl ThreePidMapping {
    /// An unresolved mapping as received from a client.
    pub fn new(medium: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            medium: medium.into(),
            value: value.into(),
            mxid: None,
        }
    }

    /// This mapping, resolved to `mxid`.
    pub fn resolved(mut self, mxid: MatrixId) -> Self {
        self.mxid = Some(mxid);
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.mxid.is_some()
    }

    /// Whether two mappings name the same 3PID, ignoring resolution.
    pub fn same_threepid(&self, other: &ThreePidMapping) -> bool {
        self.medium == other.medium && self.value == other.value
    }
}

/// A strategy's answer to a single lookup.
///
/// Serializes to the wire field set `address`, `medium`, `mxid`,
/// `not_after`, `not_before`, `ts`, with times as epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleLookupReply {
    address: String,
    medium: String,
    mxid: MatrixId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    not_after: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    not_before: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    ts: DateTime<Utc>,
}

impl SingleLookupReply {
    /// A reply to `request`, asserted at `ts`, valid from the epoch until
    /// [`DEFAULT_NOT_AFTER_MILLIS`].
    pub fn new(request: &SingleLookupRequest, mxid: MatrixId, ts: DateTime<Utc>) -> Self {
        Self {
            address: request.address.clone(),
            medium: request.medium.clone(),
            mxid,
            not_after: millis(DEFAULT_NOT_AFTER_MILLIS),
            not_before: millis(0),
            ts,
        }
    }

    /// Override the validity window.
    pub fn with_validity(mut self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn medium(&self) -> &str {
        &self.medium
    }

    pub fn mxid(&self) -> &MatrixId {
        &self.mxid
    }

    pub fn ts(&self) -> DateTime<Utc> {
        self.ts
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }
}

fn millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
