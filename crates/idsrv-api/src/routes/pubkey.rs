//! Public key publication, so clients can verify lookup signatures.
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | GET | `/_matrix/identity/api/v1/pubkey/{key_id}` | `{"public_key": "<base64>"}` |
//! | GET | `/_matrix/identity/api/v1/pubkey/isvalid?public_key=` | `{"valid": bool}` |

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use idsrv_crypto::Ed25519PublicKey;
use serde::{Deserialize, Serialize};

use super::API_PREFIX;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub public_key: String,
}

#[derive(Debug, Deserialize)]
pub struct IsValidQuery {
    pub public_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IsValidResponse {
    pub valid: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(&format!("{API_PREFIX}/pubkey/isvalid"), get(is_valid))
        .route(&format!("{API_PREFIX}/pubkey/{{key_id}}"), get(get_key))
}

/// GET /_matrix/identity/api/v1/pubkey/{key_id}
async fn get_key(
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> Result<Json<PublicKeyResponse>, AppError> {
    if key_id != state.signing.key_id.as_str() {
        return Err(AppError::NotFound(format!("unknown key {key_id}")));
    }
    Ok(Json(PublicKeyResponse {
        public_key: state.signing.public_key.to_base64(),
    }))
}

/// GET /_matrix/identity/api/v1/pubkey/isvalid
///
/// A key is valid when it is this server's current signing key.
async fn is_valid(
    State(state): State<AppState>,
    Query(query): Query<IsValidQuery>,
) -> Json<IsValidResponse> {
    let valid = query
        .public_key
        .as_deref()
        .and_then(|raw| Ed25519PublicKey::from_base64(raw).ok())
        .is_some_and(|key| key == state.signing.public_key);
    Json(IsValidResponse { valid })
}
