//! # Lookup Service
//!
//! One pass per request:
//!
//! - single: provenance → strategy → `{}` or shape → canonicalize → sign → body
//! - bulk: provenance → parse body → strategy → unsigned body
//!
//! Nothing is retried and nothing is cached between requests. The body is
//! fully built before it is returned.

use std::sync::Arc;

use idsrv_core::{BulkLookupRequest, CanonicalEncoder, SingleLookupRequest};
use idsrv_crypto::SignatureService;

use crate::body::parse_bulk_body;
use crate::error::LookupError;
use crate::provenance::{resolve, TransportContext};
use crate::reply::{BulkLookupAnswer, UnsignedReply};
use crate::strategy::LookupStrategy;

/// Body returned for a single lookup with no match.
pub const NO_MATCH_BODY: &str = "{}";

/// Orchestrates lookups over injected collaborators.
#[derive(Clone)]
pub struct LookupService {
    strategy: Arc<dyn LookupStrategy>,
    signer: Arc<dyn SignatureService>,
    encoder: Arc<dyn CanonicalEncoder>,
}

impl LookupService {
    pub fn new(
        strategy: Arc<dyn LookupStrategy>,
        signer: Arc<dyn SignatureService>,
        encoder: Arc<dyn CanonicalEncoder>,
    ) -> Self {
        Self {
            strategy,
            signer,
            encoder,
        }
    }

    /// The identity replies are signed under.
    pub fn server_name(&self) -> &str {
        self.signer.server_name()
    }

    /// Look up one 3PID. Returns `{}` when nothing matches, otherwise the
    /// signed reply.
    pub async fn handle_single_lookup(
        &self,
        transport: &dyn TransportContext,
        medium: &str,
        address: &str,
    ) -> Result<String, LookupError> {
        let provenance = resolve(transport);
        tracing::info!(
            requester = provenance.requester(),
            user_agent = ?provenance.user_agent(),
            recursive = provenance.is_recursive(),
            medium,
            "single lookup request"
        );
        let request = SingleLookupRequest::new(provenance, medium, address);

        let Some(reply) = self.strategy.find_single(&request).await? else {
            tracing::info!(medium, "no mapping found, returning empty object");
            return Ok(NO_MATCH_BODY.to_string());
        };

        let unsigned = UnsignedReply::from_reply(&reply)?;
        let canonical = unsigned.canonical_bytes(self.encoder.as_ref())?;
        let signatures = self.signer.sign(&canonical)?;
        let signed = unsigned.into_signed(signatures)?;
        Ok(signed.to_json_string()?)
    }

    /// Look up many 3PIDs. The answer is not signed.
    pub async fn handle_bulk_lookup(
        &self,
        transport: &dyn TransportContext,
        body: &[u8],
    ) -> Result<String, LookupError> {
        let provenance = resolve(transport);
        tracing::info!(
            requester = provenance.requester(),
            user_agent = ?provenance.user_agent(),
            recursive = provenance.is_recursive(),
            "bulk lookup request"
        );
        let mappings = parse_bulk_body(body)?;
        let request = BulkLookupRequest::new(provenance, mappings);

        let found = self.strategy.find_bulk(&request).await?;
        tracing::info!(
            requested = request.mappings.len(),
            found = found.len(),
            "bulk lookup complete"
        );
        Ok(BulkLookupAnswer::from_mappings(&found).to_json_string()?)
    }
}

impl std::fmt::Debug for LookupService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupService")
            .field("server_name", &self.server_name())
            .finish_non_exhaustive()
    }
}
