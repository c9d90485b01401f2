//! # idsrv-crypto: Cryptographic Primitives
//!
//! - **Ed25519** key handling, signing and verification over `CanonicalBytes`.
//! - **Signature envelopes**: the `signatures` object attached to signed
//!   lookup replies, keyed by server name and then by key ID.
//! - **`SignatureService`**: the injection seam the lookup pipeline signs
//!   through.
//!
//! ## Crate Policy
//!
//! - Depends only on `idsrv-core` internally.
//! - No mocking of cryptographic operations in tests: all tests use real
//!   `CanonicalBytes` and real Ed25519.
//! - Private key material is never serialized, logged, or formatted.

pub mod ed25519;
pub mod signing;

pub use ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, KeyId};
pub use signing::{
    verify_signed_object, Ed25519SignatureService, SignatureService, Signatures, SigningError,
};
