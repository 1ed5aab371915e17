//! Health check endpoint.

pub const MISC_TAG: &str = "Miscellaneous";

/// Health check endpoint.
#[tracing::instrument()]
#[utoipa::path(
    method(get, head),
    path = "/healthz",
    tag = MISC_TAG,
    operation_id = "Health Check",
    summary = "Service health check",
    description = "Plain `ok` while the process accepts requests. Does not touch the database.",
    responses(
        (status = 200, description = "Service is healthy", body = str, content_type = "text/plain", example = "ok")
    )
)]
pub async fn health() -> &'static str {
    "ok"
}
