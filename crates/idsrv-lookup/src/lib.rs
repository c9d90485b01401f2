//! # idsrv-lookup: The Lookup and Signing Pipeline
//!
//! Turns an inbound lookup into a response body:
//!
//! ```text
//! transport ─▶ provenance ─▶ LookupStrategy ─▶ reply shaping
//!                                               │
//!                     single: canonicalize ─▶ sign ─▶ serialize
//!                     bulk:   serialize (unsigned)
//! ```
//!
//! - [`provenance`] derives who asked and through which servers.
//! - [`strategy`] and [`provider`] are the resolution seams;
//!   [`PriorityLookupStrategy`] chains [`MemoryProvider`] and
//!   [`ForwardingProvider`] under a recursion policy.
//! - [`service::LookupService`] orchestrates one request end to end.
//!
//! ## Crate Policy
//!
//! - Collaborators are injected at construction. There is no global state.
//! - Every collaborator trait is `Send + Sync`; a `LookupService` is shared
//!   across request tasks behind an `Arc`.
//! - HTTP framing lives in `idsrv-api`. This crate sees transports only
//!   through [`TransportContext`].

pub mod body;
pub mod cidr;
pub mod error;
pub mod forward;
pub mod memory;
pub mod priority;
pub mod provenance;
pub mod provider;
pub mod reply;
pub mod service;
pub mod strategy;

pub use body::{parse_bulk_body, BulkBodyError};
pub use cidr::{CidrError, CidrRange};
pub use error::LookupError;
pub use forward::ForwardingProvider;
pub use memory::MemoryProvider;
pub use priority::{PriorityLookupStrategy, RecursionPolicy};
pub use provenance::{resolve, SimpleTransport, TransportContext};
pub use provider::ThreePidProvider;
pub use reply::{BulkLookupAnswer, SignedReply, UnsignedReply};
pub use service::{LookupService, NO_MATCH_BODY};
pub use strategy::{LookupStrategy, StrategyError};
