//! # Server Configuration
//!
//! Loaded from a YAML file, then overridden by environment variables, then
//! validated. Every section has defaults, so an empty file (or no file) is a
//! valid local-only configuration with an ephemeral signing key.
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `IDSRV_BIND` | `server.bind` |
//! | `IDSRV_METRICS_ENABLED` | `server.metrics_enabled` |
//! | `IDSRV_DOMAIN` | `matrix.domain` |
//! | `IDSRV_SIGNING_KEY_HEX` | `signing.seed_hex` |

use std::net::SocketAddr;
use std::path::Path;

use idsrv_core::MatrixId;
use idsrv_crypto::KeyId;
use idsrv_lookup::cidr::DEFAULT_ALLOWED_CIDRS;
use idsrv_lookup::CidrRange;
use serde::Deserialize;
use url::Url;

/// Errors while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for this schema.
    #[error("invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An environment override could not be parsed.
    #[error("invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },

    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdsrvConfig {
    pub server: ServerSection,
    pub matrix: MatrixSection,
    pub signing: SigningSection,
    pub lookup: LookupSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: SocketAddr,
    pub metrics_enabled: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8090)),
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatrixSection {
    /// This server's own identity; lookup replies are signed under it.
    pub domain: String,
}

impl Default for MatrixSection {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
        }
    }
}

/// Custom `Debug` redacts the seed.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SigningSection {
    pub key_id: String,
    /// 64 hex characters. Absent means an ephemeral key is generated.
    pub seed_hex: Option<String>,
}

impl Default for SigningSection {
    fn default() -> Self {
        Self {
            key_id: KeyId::default().to_string(),
            seed_hex: None,
        }
    }
}

impl std::fmt::Debug for SigningSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningSection")
            .field("key_id", &self.key_id)
            .field("seed_hex", &self.seed_hex.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LookupSection {
    pub recursion: RecursionSection,
    pub memory: MemorySection,
    pub forward: ForwardSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecursionSection {
    pub enabled: bool,
    pub allowed_cidrs: Vec<String>,
}

impl Default for RecursionSection {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_cidrs: DEFAULT_ALLOWED_CIDRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub enabled: bool,
    pub priority: i32,
    pub mappings: Vec<MappingEntry>,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 10,
            mappings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MappingEntry {
    pub medium: String,
    pub address: String,
    pub mxid: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForwardSection {
    pub enabled: bool,
    pub priority: i32,
    pub servers: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ForwardSection {
    fn default() -> Self {
        Self {
            enabled: false,
            priority: 0,
            servers: Vec::new(),
            timeout_secs: 5,
        }
    }
}

impl IdsrvConfig {
    /// Load from `path` (or defaults), apply process environment overrides,
    /// and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Apply overrides from an environment lookup function.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(bind) = env("IDSRV_BIND") {
            self.server.bind = bind.parse().map_err(|e| ConfigError::Env {
                var: "IDSRV_BIND",
                reason: format!("{e}"),
            })?;
        }
        if let Some(enabled) = env("IDSRV_METRICS_ENABLED") {
            self.server.metrics_enabled = enabled.to_lowercase() != "false";
        }
        if let Some(domain) = env("IDSRV_DOMAIN") {
            self.matrix.domain = domain;
        }
        if let Some(seed) = env("IDSRV_SIGNING_KEY_HEX") {
            self.signing.seed_hex = Some(seed);
        }
        Ok(())
    }

    /// Check every value that is parsed lazily at bootstrap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.matrix.domain.trim().is_empty() {
            return Err(ConfigError::Invalid("matrix.domain must not be empty".into()));
        }
        self.key_id()?;
        self.allowed_cidrs()?;
        self.memory_mappings()?;
        if self.lookup.forward.enabled {
            let servers = self.forward_servers()?;
            if servers.is_empty() {
                return Err(ConfigError::Invalid(
                    "lookup.forward.enabled requires at least one server".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn key_id(&self) -> Result<KeyId, ConfigError> {
        KeyId::parse(&self.signing.key_id)
            .map_err(|e| ConfigError::Invalid(format!("signing.key_id: {e}")))
    }

    pub fn allowed_cidrs(&self) -> Result<Vec<CidrRange>, ConfigError> {
        self.lookup
            .recursion
            .allowed_cidrs
            .iter()
            .map(|raw| {
                CidrRange::parse(raw).map_err(|e| {
                    ConfigError::Invalid(format!("lookup.recursion.allowed_cidrs: {e}"))
                })
            })
            .collect()
    }

    pub fn memory_mappings(&self) -> Result<Vec<(String, String, MatrixId)>, ConfigError> {
        self.lookup
            .memory
            .mappings
            .iter()
            .map(|m| {
                let mxid = MatrixId::parse(&m.mxid)
                    .map_err(|e| ConfigError::Invalid(format!("lookup.memory.mappings: {e}")))?;
                Ok((m.medium.clone(), m.address.clone(), mxid))
            })
            .collect()
    }

    pub fn forward_servers(&self) -> Result<Vec<Url>, ConfigError> {
        self.lookup
            .forward
            .servers
            .iter()
            .map(|raw| {
                let url = Url::parse(raw).map_err(|e| {
                    ConfigError::Invalid(format!("lookup.forward.servers: {raw:?}: {e}"))
                })?;
                match url.scheme() {
                    "http" | "https" => Ok(url),
                    other => Err(ConfigError::Invalid(format!(
                        "lookup.forward.servers: {raw:?}: unsupported scheme {other}"
                    ))),
                }
            })
            .collect()
    }
}
