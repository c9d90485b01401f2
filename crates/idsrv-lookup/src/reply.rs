//! # Reply Shaping
//!
//! A single lookup reply passes through two distinct encodings:
//!
//! 1. [`UnsignedReply::canonical_bytes`] produces the bytes that get signed.
//! 2. [`SignedReply::to_json_string`] produces the response body.
//!
//! Both operate on the generic object form of the reply, so the signed bytes
//! are exactly what a verifier reconstructs by removing `signatures` from
//! the body and canonicalizing the rest.
//!
//! Bulk answers are serialized as-is and carry no signatures.

use idsrv_core::{
    CanonicalBytes, CanonicalEncoder, CanonicalizationError, SingleLookupReply, ThreePidMapping,
};
use idsrv_crypto::signing::SIGNATURES_KEY;
use idsrv_crypto::Signatures;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single lookup reply in object form, before signing.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedReply(Map<String, Value>);

impl UnsignedReply {
    pub fn from_reply(reply: &SingleLookupReply) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(reply)? {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(serde::ser::Error::custom("lookup reply did not serialize to an object")),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The bytes a signature over this reply covers.
    pub fn canonical_bytes(
        &self,
        encoder: &dyn CanonicalEncoder,
    ) -> Result<CanonicalBytes, CanonicalizationError> {
        encoder.encode(&self.0)
    }

    /// Attach a signature envelope.
    pub fn into_signed(self, signatures: Signatures) -> Result<SignedReply, serde_json::Error> {
        let mut map = self.0;
        let signatures = serde_json::to_value(signatures)?;
        map.insert(SIGNATURES_KEY.to_string(), signatures);
        Ok(SignedReply(map))
    }
}

/// A reply with its `signatures` member attached.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedReply(Map<String, Value>);

impl SignedReply {
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The response body.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

/// `{"threepids": [[medium, address, mxid], ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkLookupAnswer {
    threepids: Vec<(String, String, String)>,
}

impl BulkLookupAnswer {
    /// Resolved mappings in the given order; unresolved ones are skipped.
    pub fn from_mappings(mappings: &[ThreePidMapping]) -> Self {
        let threepids = mappings
            .iter()
            .filter_map(|m| {
                m.mxid
                    .as_ref()
                    .map(|mxid| (m.medium.clone(), m.value.clone(), mxid.to_string()))
            })
            .collect();
        Self { threepids }
    }

    pub fn len(&self) -> usize {
        self.threepids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threepids.is_empty()
    }

    pub fn into_entries(self) -> Vec<(String, String, String)> {
        self.threepids
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use idsrv_core::{JcsEncoder, MatrixId, Provenance, SingleLookupRequest};
    use idsrv_crypto::signing::verify_signed_object;
    use idsrv_crypto::{Ed25519KeyPair, Ed25519SignatureService, KeyId, SignatureService};

    use super::*;

    fn reply() -> SingleLookupReply {
        let request = SingleLookupRequest::new(
            Provenance::direct("127.0.0.1", None),
            "email",
            "alice@example.org",
        );
        let ts = DateTime::from_timestamp_millis(1_600_000_000_000).unwrap();
        SingleLookupReply::new(&request, MatrixId::parse("@alice:example.org").unwrap(), ts)
    }

    #[test]
    fn canonical_bytes_are_sorted_and_compact() {
        let unsigned = UnsignedReply::from_reply(&reply()).unwrap();
        let bytes = unsigned.canonical_bytes(&JcsEncoder).unwrap();
        assert_eq!(
            std::str::from_utf8(bytes.as_bytes()).unwrap(),
            concat!(
                r#"{"address":"alice@example.org","medium":"email","mxid":"@alice:example.org","#,
                r#""not_after":253402300799000,"not_before":0,"ts":1600000000000}"#,
            )
        );
    }

    #[test]
    fn signed_reply_verifies_after_stripping_signatures() {
        let signer = Ed25519SignatureService::new(
            "example.org",
            KeyId::default(),
            Ed25519KeyPair::from_seed(&[3u8; 32]),
        );
        let unsigned = UnsignedReply::from_reply(&reply()).unwrap();
        let canonical = unsigned.canonical_bytes(&JcsEncoder).unwrap();
        let signed = unsigned.clone().into_signed(signer.sign(&canonical).unwrap()).unwrap();

        let body: Value = serde_json::from_str(&signed.to_json_string().unwrap()).unwrap();
        let object = body.as_object().unwrap();
        verify_signed_object(object, "example.org", signer.key_id(), &signer.public_key()).unwrap();

        let mut stripped = object.clone();
        stripped.remove("signatures");
        assert_eq!(&stripped, unsigned.as_map());
    }

    #[test]
    fn bulk_answer_skips_unresolved() {
        let mappings = vec![
            ThreePidMapping::new("email", "a@example.com")
                .resolved(MatrixId::parse("@a:example.com").unwrap()),
            ThreePidMapping::new("msisdn", "1555"),
        ];
        let answer = BulkLookupAnswer::from_mappings(&mappings);
        assert_eq!(answer.len(), 1);
        assert_eq!(
            answer.to_json_string().unwrap(),
            r#"{"threepids":[["email","a@example.com","@a:example.com"]]}"#
        );
    }

    #[test]
    fn empty_bulk_answer() {
        let answer = BulkLookupAnswer::from_mappings(&[]);
        assert!(answer.is_empty());
        assert_eq!(answer.to_json_string().unwrap(), r#"{"threepids":[]}"#);
    }
}
