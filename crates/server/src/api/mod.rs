//! HTTP surface of the service.
//!
//! - `/{cell}/__authz` - authorization endpoint ([`crate::authz`])
//! - `/{cell}/__certs` - JWK Set of the cell ([`crate::certs`])
//! - `/__admin/*` - network-restricted provisioning ([`crate::admin`])
//! - `/healthz` - health check
//! - `/api-docs` - Redoc rendering of the OpenAPI document

pub mod client_ip;
pub mod health;
pub mod openapi;

pub use health::MISC_TAG;

use crate::state::AppState;
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Assembles every route with its middleware. Used by the server and by tests.
pub fn build_router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/__admin", crate::admin::router(state.clone()))
        .merge(crate::authz::router(state.clone()))
        .merge(crate::certs::router(state))
        .routes(routes!(health::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Binds `listen_addr` and serves until the process is stopped.
#[tracing::instrument(skip(state))]
pub async fn start_webserver(state: AppState) -> color_eyre::Result<()> {
    let addr = state.config.listen_addr.clone();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
