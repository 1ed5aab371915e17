//! `__authz`: the per-cell authorization endpoint.
//!
//! Implements the OAuth2 implicit grant (`response_type=token`) with resource owner
//! password credentials, plus the forced password-change step for accounts in the
//! `passwordChangeRequired` state.

pub mod flow;
pub mod handlers;
pub mod request;
pub mod response;
pub mod templates;

use crate::state::AppState;
use utoipa_axum::{router::OpenApiRouter, routes};

pub const AUTHZ_TAG: &str = "Authorization";

pub fn router(state: AppState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::authz_get,
            handlers::authz_post,
            handlers::authz_options
        ))
        .with_state(state)
}
