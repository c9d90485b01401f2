//! # Application State
//!
//! Shared, read-only state handed to every handler. Cloning is cheap: the
//! lookup service sits behind an `Arc` and the metrics registry is
//! internally shared.

use std::sync::Arc;

use idsrv_crypto::{Ed25519PublicKey, KeyId};
use idsrv_lookup::LookupService;

use crate::middleware::metrics::ApiMetrics;

/// The public half of this server's signing identity.
#[derive(Debug, Clone)]
pub struct SigningIdentity {
    pub server_name: String,
    pub key_id: KeyId,
    pub public_key: Ed25519PublicKey,
    /// True when the key was generated at startup rather than configured.
    pub ephemeral: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub lookup: Arc<LookupService>,
    pub signing: SigningIdentity,
    /// `None` when metrics are disabled.
    pub metrics: Option<ApiMetrics>,
}

impl AppState {
    pub fn new(
        lookup: LookupService,
        signing: SigningIdentity,
        metrics: Option<ApiMetrics>,
    ) -> Self {
        Self {
            lookup: Arc::new(lookup),
            signing,
            metrics,
        }
    }

    pub(crate) fn record_lookup(&self, kind: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_lookup(kind, outcome);
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("signing", &self.signing)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}
