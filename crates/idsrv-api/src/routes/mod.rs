//! # Identity Routes
//!
//! Everything under [`API_PREFIX`]:
//! - [`lookup`]: ping, single lookup and bulk lookup.
//! - [`pubkey`]: signing key publication and validity checks.

use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};

pub mod lookup;
pub mod pubkey;

/// Base path of the identity service API.
pub const API_PREFIX: &str = "/_matrix/identity/api/v1";

/// Wrap an already-serialized JSON body.
pub(crate) fn json_body(body: String) -> Response {
    ([(CONTENT_TYPE, "application/json; charset=utf-8")], body).into_response()
}
