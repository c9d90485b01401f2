//! # Server Bootstrap
//!
//! Turns a validated [`IdsrvConfig`] into an [`AppState`]:
//!
//! 1. **Load Signing Key**: from `signing.seed_hex`, or generate an
//!    ephemeral one.
//! 2. **Build Providers**: in-memory mappings and upstream forwarding, per
//!    config, under the recursion policy.
//! 3. **Assemble Pipeline**: strategy, signer and JCS encoder behind a
//!    `LookupService`.
//! 4. **Log Identity**: structured startup banner.

use std::sync::Arc;
use std::time::Duration;

use idsrv_core::JcsEncoder;
use idsrv_crypto::{Ed25519KeyPair, Ed25519SignatureService};
use idsrv_lookup::{
    ForwardingProvider, LookupService, MemoryProvider, PriorityLookupStrategy, RecursionPolicy,
    StrategyError, ThreePidProvider,
};

use crate::config::{ConfigError, IdsrvConfig};
use crate::middleware::metrics::ApiMetrics;
use crate::state::{AppState, SigningIdentity};

/// Errors during server bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Signing key could not be loaded.
    #[error("signing key error: {0}")]
    SigningKey(String),

    #[error("lookup provider error: {0}")]
    Provider(#[from] StrategyError),

    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Build application state from configuration.
pub fn bootstrap(config: &IdsrvConfig) -> Result<AppState, BootstrapError> {
    config.validate()?;

    let (keypair, ephemeral) = load_or_generate_signing_key(config)?;
    let signer =
        Ed25519SignatureService::new(config.matrix.domain.clone(), config.key_id()?, keypair);
    let signing = SigningIdentity {
        server_name: config.matrix.domain.clone(),
        key_id: signer.key_id().clone(),
        public_key: signer.public_key(),
        ephemeral,
    };

    let strategy = build_strategy(config)?;
    log_banner(config, &signing, &strategy);

    let lookup = LookupService::new(Arc::new(strategy), Arc::new(signer), Arc::new(JcsEncoder));

    let metrics = if config.server.metrics_enabled {
        Some(ApiMetrics::new()?)
    } else {
        None
    };

    Ok(AppState::new(lookup, signing, metrics))
}

fn load_or_generate_signing_key(
    config: &IdsrvConfig,
) -> Result<(Ed25519KeyPair, bool), BootstrapError> {
    match &config.signing.seed_hex {
        Some(hex) => {
            let key = Ed25519KeyPair::from_seed_hex(hex.trim())
                .map_err(|e| BootstrapError::SigningKey(e.to_string()))?;
            Ok((key, false))
        }
        None => {
            tracing::warn!(
                "no signing seed configured, generating ephemeral key; \
                 lookup signatures will not verify after restart"
            );
            Ok((Ed25519KeyPair::generate(), true))
        }
    }
}

fn build_strategy(config: &IdsrvConfig) -> Result<PriorityLookupStrategy, BootstrapError> {
    let mut providers: Vec<Arc<dyn ThreePidProvider>> = Vec::new();

    let memory = &config.lookup.memory;
    if memory.enabled {
        let provider = MemoryProvider::new(memory.priority);
        for (medium, address, mxid) in config.memory_mappings()? {
            provider.insert(medium, address, mxid);
        }
        providers.push(Arc::new(provider));
    }

    let forward = &config.lookup.forward;
    if forward.enabled {
        let provider = ForwardingProvider::new(
            config.forward_servers()?,
            Duration::from_secs(forward.timeout_secs),
            forward.priority,
        )?;
        providers.push(Arc::new(provider));
    }

    let policy = RecursionPolicy::new(config.lookup.recursion.enabled, config.allowed_cidrs()?);
    Ok(PriorityLookupStrategy::new(providers, policy))
}

fn log_banner(config: &IdsrvConfig, signing: &SigningIdentity, strategy: &PriorityLookupStrategy) {
    tracing::info!(
        server_name = %signing.server_name,
        key_id = %signing.key_id,
        public_key = %signing.public_key,
        ephemeral_key = signing.ephemeral,
        providers = ?strategy.providers().collect::<Vec<_>>(),
        recursion = strategy.policy().is_enabled(),
        mappings = config.lookup.memory.mappings.len(),
        "identity server configured"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_ephemeral_key() {
        let state = bootstrap(&IdsrvConfig::default()).unwrap();
        assert!(state.signing.ephemeral);
        assert_eq!(state.signing.server_name, "localhost");
        assert_eq!(state.signing.key_id.as_str(), "ed25519:0");
        assert!(state.metrics.is_some());
    }

    #[test]
    fn configured_seed_is_deterministic() {
        let mut config = IdsrvConfig::default();
        config.signing.seed_hex = Some("07".repeat(32));
        let a = bootstrap(&config).unwrap();
        let b = bootstrap(&config).unwrap();
        assert!(!a.signing.ephemeral);
        assert_eq!(a.signing.public_key, b.signing.public_key);
    }

    #[test]
    fn bad_seed_is_rejected() {
        let mut config = IdsrvConfig::default();
        config.signing.seed_hex = Some("zz".into());
        assert!(matches!(bootstrap(&config), Err(BootstrapError::SigningKey(_))));
    }

    #[test]
    fn metrics_can_be_disabled() {
        let mut config = IdsrvConfig::default();
        config.server.metrics_enabled = false;
        assert!(bootstrap(&config).unwrap().metrics.is_none());
    }

    #[test]
    fn providers_follow_config() {
        let yaml = concat!(
            "lookup:\n",
            "  forward:\n",
            "    enabled: true\n",
            "    priority: 20\n",
            "    servers: [\"http://127.0.0.1:1\"]\n",
        );
        let config = IdsrvConfig::from_yaml(yaml).unwrap();
        let strategy = build_strategy(&config).unwrap();
        assert_eq!(
            strategy.providers().collect::<Vec<_>>(),
            ["forward", "memory"]
        );
    }
}
