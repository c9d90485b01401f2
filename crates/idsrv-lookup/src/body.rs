//! Bulk lookup request body parsing.
//!
//! Accepted shape: `{"threepids": [["<medium>", "<address>"], ...]}`. Every
//! entry must be a list of exactly two strings.

use idsrv_core::ThreePidMapping;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BulkBodyError {
    #[error("body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("body must be a JSON object")]
    NotAnObject,

    #[error("body has no \"threepids\" field")]
    MissingThreePids,

    #[error("\"threepids\" must be a list")]
    NotAList,

    #[error("\"threepids\" entry {index} must be a [medium, address] pair of strings")]
    InvalidPair { index: usize },
}

pub fn parse_bulk_body(body: &[u8]) -> Result<Vec<ThreePidMapping>, BulkBodyError> {
    let value: Value = serde_json::from_slice(body)?;
    let object = value.as_object().ok_or(BulkBodyError::NotAnObject)?;
    let entries = object
        .get("threepids")
        .ok_or(BulkBodyError::MissingThreePids)?
        .as_array()
        .ok_or(BulkBodyError::NotAList)?;

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| match entry.as_array().map(Vec::as_slice) {
            Some([Value::String(medium), Value::String(address)]) => {
                Ok(ThreePidMapping::new(medium.as_str(), address.as_str()))
            }
            _ => Err(BulkBodyError::InvalidPair { index }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_in_order() {
        let body = br#"{"threepids":[["email","a@example.com"],["msisdn","1555"]]}"#;
        let mappings = parse_bulk_body(body).unwrap();
        assert_eq!(
            mappings,
            vec![
                ThreePidMapping::new("email", "a@example.com"),
                ThreePidMapping::new("msisdn", "1555"),
            ]
        );
    }

    #[test]
    fn empty_list_is_valid() {
        assert!(parse_bulk_body(br#"{"threepids":[]}"#).unwrap().is_empty());
    }

    #[test]
    fn extra_fields_are_ignored() {
        let body = br#"{"threepids":[["email","a@example.com"]],"other":1}"#;
        assert_eq!(parse_bulk_body(body).unwrap().len(), 1);
    }

    #[test]
    fn rejects_malformed_bodies() {
        assert!(matches!(
            parse_bulk_body(b"not json"),
            Err(BulkBodyError::InvalidJson(_))
        ));
        assert!(matches!(parse_bulk_body(b"[]"), Err(BulkBodyError::NotAnObject)));
        assert!(matches!(parse_bulk_body(b"{}"), Err(BulkBodyError::MissingThreePids)));
        assert!(matches!(
            parse_bulk_body(br#"{"threepids":"not-a-list"}"#),
            Err(BulkBodyError::NotAList)
        ));
    }

    #[test]
    fn rejects_wrong_arity_and_types() {
        let cases: [(&[u8], usize); 4] = [
            (br#"{"threepids":[["email"]]}"#, 0),
            (br#"{"threepids":[["email","a","b"]]}"#, 0),
            (br#"{"threepids":[["email","a"],["msisdn",1555]]}"#, 1),
            (br#"{"threepids":[["email","a"],"email"]}"#, 1),
        ];
        for (body, bad) in cases {
            match parse_bulk_body(body) {
                Err(BulkBodyError::InvalidPair { index }) => assert_eq!(index, bad),
                other => panic!("expected InvalidPair, got {other:?}"),
            }
        }
    }
}
