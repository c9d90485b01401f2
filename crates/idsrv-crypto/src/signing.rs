//! # Signature Envelopes and the Signing Service
//!
//! A signed JSON object carries a `signatures` member shaped as
//! `{ "<server name>": { "<key id>": "<unpadded base64>" } }`. The signature
//! covers the canonical bytes of the object *without* its `signatures` (and
//! `unsigned`) members.
//!
//! `SignatureService` is the seam the lookup pipeline signs through. The
//! service owns the server's identity, so callers never pick which name or
//! key a reply is signed under.

use std::collections::BTreeMap;
use std::sync::Arc;

use idsrv_core::{CanonicalBytes, CryptoError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, KeyId};

/// JSON member holding the signature envelope.
pub const SIGNATURES_KEY: &str = "signatures";

/// JSON member excluded from signing alongside `signatures`.
pub const UNSIGNED_KEY: &str = "unsigned";

/// Signatures keyed by signing identity, then by key ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signatures(BTreeMap<String, BTreeMap<String, String>>);

impl Signatures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `signature` for `server_name` under `key_id`.
    pub fn insert(&mut self, server_name: &str, key_id: &KeyId, signature: &Ed25519Signature) {
        self.0
            .entry(server_name.to_string())
            .or_default()
            .insert(key_id.as_str().to_string(), signature.to_base64());
    }

    /// The base64 signature for `server_name` / `key_id`, if present.
    pub fn get(&self, server_name: &str, key_id: &str) -> Option<&str> {
        self.0.get(server_name)?.get(key_id).map(String::as_str)
    }

    /// All key IDs signed under `server_name`.
    pub fn for_server(&self, server_name: &str) -> Option<&BTreeMap<String, String>> {
        self.0.get(server_name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }
}

/// The signing service could not produce a signature.
#[derive(Error, Debug)]
pub enum SigningError {
    /// No usable key is loaded.
    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),

    /// The underlying primitive failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Produces signature envelopes over canonical bytes on behalf of this server.
pub trait SignatureService: Send + Sync {
    /// The identity signatures are keyed under (the server's own domain).
    fn server_name(&self) -> &str;

    /// Sign `data`, returning an envelope with at least one signature for
    /// [`server_name`](Self::server_name).
    fn sign(&self, data: &CanonicalBytes) -> Result<Signatures, SigningError>;
}

/// Single-key Ed25519 signing service.
///
/// The key pair is shared read-only; the service never rotates or mutates it.
#[derive(Debug, Clone)]
pub struct Ed25519SignatureService {
    server_name: String,
    key_id: KeyId,
    key: Arc<Ed25519KeyPair>,
}

impl Ed25519SignatureService {
    pub fn new(server_name: impl Into<String>, key_id: KeyId, key: Ed25519KeyPair) -> Self {
        Self {
            server_name: server_name.into(),
            key_id,
            key: Arc::new(key),
        }
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.key.public_key()
    }
}

impl SignatureService for Ed25519SignatureService {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    fn sign(&self, data: &CanonicalBytes) -> Result<Signatures, SigningError> {
        let signature = self.key.sign(data);
        let mut envelope = Signatures::new();
        envelope.insert(&self.server_name, &self.key_id, &signature);
        Ok(envelope)
    }
}

/// Verify a signed JSON object as a remote client would.
///
/// Strips `signatures` and `unsigned`, re-canonicalizes the remainder, and
/// checks the signature recorded for `server_name` / `key_id`.
pub fn verify_signed_object(
    object: &Map<String, Value>,
    server_name: &str,
    key_id: &KeyId,
    public_key: &Ed25519PublicKey,
) -> Result<(), CryptoError> {
    let encoded = object
        .get(SIGNATURES_KEY)
        .and_then(|s| s.get(server_name))
        .and_then(|s| s.get(key_id.as_str()))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            CryptoError::VerificationFailed(format!(
                "no signature from {server_name} with {key_id}"
            ))
        })?;
    let signature = Ed25519Signature::from_base64(encoded)?;

    let mut unsigned = object.clone();
    unsigned.remove(SIGNATURES_KEY);
    unsigned.remove(UNSIGNED_KEY);
    let canonical = CanonicalBytes::new(&unsigned)
        .map_err(|e| CryptoError::VerificationFailed(format!("cannot canonicalize: {e}")))?;

    public_key.verify(&canonical, &signature)
}
