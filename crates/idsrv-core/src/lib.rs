//! # idsrv-core: Foundational Types for the Identity Lookup Server
//!
//! This crate defines the type-system primitives shared by every other crate
//! in the workspace. It depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **`CanonicalBytes` newtype.** ALL bytes that get signed flow through
//!    `CanonicalBytes::new()`. No raw `serde_json::to_vec()` for signing input.
//!    A signature over non-canonical bytes cannot be verified by a client that
//!    re-canonicalizes the response, so the wrong path is made unrepresentable.
//!
//! 2. **Provenance is set once.** `Provenance` carries the requester, the
//!    recursion flag and the forwarding chain. The flag and the chain are only
//!    ever assigned together, by one of two constructors.
//!
//! 3. **Validated Matrix IDs.** A `MatrixId` can only be built through
//!    `MatrixId::parse()`. Replies never carry a bare string identity.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `idsrv-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod error;
pub mod identity;
pub mod lookup;

// Re-export primary types for ergonomic imports.
pub use canonical::{CanonicalBytes, CanonicalEncoder, JcsEncoder};
pub use error::{CanonicalizationError, CryptoError, IdsrvError, ValidationError};
pub use identity::MatrixId;
pub use lookup::{
    BulkLookupRequest, Provenance, SingleLookupReply, SingleLookupRequest, ThreePidMapping,
};
