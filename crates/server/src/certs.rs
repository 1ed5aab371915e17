//! `__certs`: the public signing key of a cell as a JWK Set.

use crate::error::KeyStoreError;
use crate::keys::Jwks;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use utoipa_axum::{router::OpenApiRouter, routes};

pub const CERTS_TAG: &str = "Certificates";

pub fn router(state: AppState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(get_certs))
        .with_state(state)
}

/// JWK Set of the cell.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/{cell}/__certs",
    tag = CERTS_TAG,
    operation_id = "Cell Certificates",
    summary = "Public keys used to verify tokens issued by the cell",
    description = "Returns the cell's RSA public key as a JWK Set. The key pair is generated on \
                   first access and stays stable afterwards, so repeated calls return the same \
                   `kid` and modulus.",
    params(("cell" = String, Path, description = "Cell name.")),
    responses(
        (status = 200, description = "JWK Set", body = Jwks, content_type = "application/json"),
        (status = 404, description = "Unknown cell"),
        (status = 500, description = "Key store failure"),
    )
)]
pub async fn get_certs(State(state): State<AppState>, Path(cell): Path<String>) -> Response {
    match state.cells.get(&cell).await {
        Ok(Some(_)) => {}
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to look up cell");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    match state.keys.get_keys(&cell).await {
        Ok(jwks) => Json(jwks).into_response(),
        Err(KeyStoreError::UnknownCell(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(e @ KeyStoreError::Lock(_)) => {
            tracing::warn!(error = %e, "key store busy");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to load cell key");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
