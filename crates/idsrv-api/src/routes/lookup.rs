//! Single and bulk 3PID lookup endpoints.
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | GET | `/_matrix/identity/api/v1` | `{}` |
//! | GET | `/_matrix/identity/api/v1/lookup?medium=&address=` | `{}` or signed mapping |
//! | POST | `/_matrix/identity/api/v1/bulk_lookup` | `{"threepids": [...]}` (unsigned) |

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use idsrv_lookup::NO_MATCH_BODY;
use serde::Deserialize;

use super::{json_body, API_PREFIX};
use crate::error::AppError;
use crate::extractors::RequestOrigin;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub medium: Option<String>,
    pub address: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(API_PREFIX, get(ping))
        .route(&format!("{API_PREFIX}/lookup"), get(single_lookup))
        .route(&format!("{API_PREFIX}/bulk_lookup"), post(bulk_lookup))
}

/// GET /_matrix/identity/api/v1: service discovery ping.
async fn ping() -> Response {
    json_body("{}".to_string())
}

/// GET /_matrix/identity/api/v1/lookup
async fn single_lookup(
    State(state): State<AppState>,
    origin: RequestOrigin,
    Query(query): Query<LookupQuery>,
) -> Result<Response, AppError> {
    let medium = query
        .medium
        .ok_or_else(|| AppError::BadRequest("missing query parameter: medium".into()))?;
    let address = query
        .address
        .ok_or_else(|| AppError::BadRequest("missing query parameter: address".into()))?;

    let result = state
        .lookup
        .handle_single_lookup(&origin, &medium, &address)
        .await;
    let outcome = match &result {
        Ok(body) if body == NO_MATCH_BODY => "miss",
        Ok(_) => "hit",
        Err(_) => "error",
    };
    state.record_lookup("single", outcome);
    Ok(json_body(result?))
}

/// POST /_matrix/identity/api/v1/bulk_lookup
///
/// The raw body is handed to the lookup service, so a malformed body is
/// reported like any other lookup failure.
async fn bulk_lookup(
    State(state): State<AppState>,
    origin: RequestOrigin,
    body: Bytes,
) -> Result<Response, AppError> {
    let result = state.lookup.handle_bulk_lookup(&origin, &body).await;
    state.record_lookup("bulk", if result.is_ok() { "ok" } else { "error" });
    Ok(json_body(result?))
}
