//! Errors surfaced by [`LookupService`](crate::LookupService).
//!
//! "No mapping found" is not an error: it produces `{}` for single lookups
//! and an empty `threepids` list for bulk lookups.

use idsrv_core::CanonicalizationError;
use idsrv_crypto::SigningError;
use thiserror::Error;

use crate::body::BulkBodyError;
use crate::strategy::StrategyError;

#[derive(Error, Debug)]
pub enum LookupError {
    /// The bulk request body could not be parsed.
    #[error("invalid bulk lookup body: {0}")]
    RequestBody(#[from] BulkBodyError),

    /// The lookup strategy failed.
    #[error("lookup strategy failed: {0}")]
    Downstream(#[from] StrategyError),

    /// No signature could be produced. Unsigned replies are never returned.
    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    #[error("response serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
