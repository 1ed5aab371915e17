//! Administrative endpoints for provisioning cells and accounts.
//!
//! Only reachable from `admin.allowed_nets`. Everything else gets 403 before any handler runs.

use crate::api::client_ip::ClientIp;
use crate::cells::CellProperties;
use crate::directory::{Account, NewAccount};
use crate::error::{CellError, DirectoryError};
use crate::locks::{LockManager, LockSnapshot};
use crate::state::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::put,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

pub const ADMIN_TAG: &str = "Administration";

pub fn router(state: AppState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(create_cell))
        .routes(routes!(delete_cell))
        .routes(routes!(set_cell_properties))
        .routes(routes!(create_account))
        .routes(routes!(delete_account))
        .routes(routes!(unlock_account))
        .routes(routes!(list_locks, delete_locks))
        // Catch-all path, kept out of the OpenAPI document.
        .route("/cells/{cell}/resources/{*path}", put(put_resource))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_allowed_net))
        .with_state(state)
}

async fn require_allowed_net(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    request: Request,
    next: Next,
) -> Response {
    let allowed = state
        .config
        .admin
        .allowed_nets
        .iter()
        .any(|net| net.contains(&client_ip));
    if !allowed {
        tracing::warn!(%client_ip, path = %request.uri().path(), "admin access denied");
        return (StatusCode::FORBIDDEN, "Access denied").into_response();
    }
    next.run(request).await
}

fn error_json(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

fn cell_error(err: CellError) -> Response {
    match err {
        CellError::InvalidName(_) => error_json(StatusCode::BAD_REQUEST, err),
        CellError::AlreadyExists => error_json(StatusCode::CONFLICT, err),
        CellError::NotFound => error_json(StatusCode::NOT_FOUND, err),
        CellError::Database(ref e) => {
            tracing::error!(error = %e, "cell registry database error");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, err)
        }
    }
}

fn directory_error(err: DirectoryError) -> Response {
    match err {
        DirectoryError::NotFound | DirectoryError::UnknownCell => {
            error_json(StatusCode::NOT_FOUND, err)
        }
        DirectoryError::AlreadyExists => error_json(StatusCode::CONFLICT, err),
        DirectoryError::InvalidName(_)
        | DirectoryError::InvalidPassword
        | DirectoryError::InvalidIpRange(_) => error_json(StatusCode::BAD_REQUEST, err),
        DirectoryError::Hash(_) | DirectoryError::Database(_) => {
            tracing::error!(error = %err, "account directory failure");
            error_json(StatusCode::INTERNAL_SERVER_ERROR, err)
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCell {
    #[schema(example = "alpha")]
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CellView {
    pub name: String,
    pub url: String,
    pub authorization_html_url: Option<String>,
    pub authorization_password_change_html_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClearedLocks {
    pub cleared: usize,
}

/// Account as returned by the admin API. Never includes the password hash.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccountView {
    pub name: String,
    pub status: String,
    pub failed_count: i32,
    #[serde(with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub last_authenticated: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub locked_until: Option<OffsetDateTime>,
    pub ip_address_range: Option<String>,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            name: account.name,
            status: account.status,
            failed_count: account.failed_count,
            last_authenticated: account.last_authenticated,
            locked_until: account.locked_until,
            ip_address_range: account.ip_address_range,
        }
    }
}

/// Create a cell.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/cells",
    tag = ADMIN_TAG,
    operation_id = "Create Cell",
    request_body = CreateCell,
    responses(
        (status = 201, description = "Cell created", body = CellView),
        (status = 400, description = "Invalid cell name"),
        (status = 403, description = "Client address not in allowed networks"),
        (status = 409, description = "Cell already exists"),
    )
)]
pub async fn create_cell(State(state): State<AppState>, Json(body): Json<CreateCell>) -> Response {
    match state.cells.create(&body.name).await {
        Ok(cell) => {
            tracing::info!(cell = %cell.name, "cell created");
            let view = CellView {
                url: state.cell_url(&cell.name),
                name: cell.name,
                authorization_html_url: cell.authorization_html_url,
                authorization_password_change_html_url: cell
                    .authorization_password_change_html_url,
            };
            (StatusCode::CREATED, Json(view)).into_response()
        }
        Err(e) => cell_error(e),
    }
}

/// Delete a cell together with its accounts, resources and signing key.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/cells/{cell}",
    tag = ADMIN_TAG,
    operation_id = "Delete Cell",
    params(("cell" = String, Path, description = "Cell name.")),
    responses(
        (status = 204, description = "Cell deleted"),
        (status = 403, description = "Client address not in allowed networks"),
        (status = 404, description = "Unknown cell"),
        (status = 503, description = "Cell key lock could not be acquired in time"),
    )
)]
pub async fn delete_cell(State(state): State<AppState>, Path(cell): Path<String>) -> Response {
    // Keeps a concurrent first key access from writing a key row for the deleted cell.
    let _guard = match state.locks.acquire(&LockManager::cell_key(&cell)).await {
        Ok(guard) => guard,
        Err(e) => {
            tracing::warn!(error = %e, "cell key busy, cell not deleted");
            return error_json(StatusCode::SERVICE_UNAVAILABLE, e);
        }
    };
    match state.cells.delete(&cell).await {
        Ok(()) => {
            state.keys.invalidate(&cell);
            tracing::info!(%cell, "cell deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => cell_error(e),
    }
}

/// Configure the custom authorization pages of a cell.
#[tracing::instrument(skip(state, props))]
#[utoipa::path(
    put,
    path = "/cells/{cell}/properties",
    tag = ADMIN_TAG,
    operation_id = "Set Cell Properties",
    description = "Both URLs may be cell-relative paths of stored resources or absolute URLs \
                   under the cell URL. Omitted or empty values restore the default forms.",
    params(("cell" = String, Path, description = "Cell name.")),
    request_body = CellProperties,
    responses(
        (status = 204, description = "Properties stored"),
        (status = 403, description = "Client address not in allowed networks"),
        (status = 404, description = "Unknown cell"),
    )
)]
pub async fn set_cell_properties(
    State(state): State<AppState>,
    Path(cell): Path<String>,
    Json(props): Json<CellProperties>,
) -> Response {
    match state.cells.set_properties(&cell, props).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => cell_error(e),
    }
}

/// Store a resource (e.g. a custom login page) under a cell-relative path.
#[tracing::instrument(skip(state, headers, body), fields(len = body.len()))]
pub async fn put_resource(
    State(state): State<AppState>,
    Path((cell, path)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    let Ok(body) = String::from_utf8(body.to_vec()) else {
        return error_json(StatusCode::BAD_REQUEST, "Resource body must be UTF-8");
    };
    match state
        .cells
        .put_resource(&cell, &path, content_type, body)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => cell_error(e),
    }
}

/// Create an account in a cell.
#[tracing::instrument(skip(state, body), fields(account = %body.name))]
#[utoipa::path(
    post,
    path = "/cells/{cell}/accounts",
    tag = ADMIN_TAG,
    operation_id = "Create Account",
    params(("cell" = String, Path, description = "Cell name.")),
    request_body = NewAccount,
    responses(
        (status = 201, description = "Account created", body = AccountView),
        (status = 400, description = "Invalid name, password or IP range"),
        (status = 403, description = "Client address not in allowed networks"),
        (status = 404, description = "Unknown cell"),
        (status = 409, description = "Account already exists"),
    )
)]
pub async fn create_account(
    State(state): State<AppState>,
    Path(cell): Path<String>,
    Json(body): Json<NewAccount>,
) -> Response {
    match state.directory.create(&cell, body).await {
        Ok(account) => (StatusCode::CREATED, Json(AccountView::from(account))).into_response(),
        Err(e) => directory_error(e),
    }
}

/// Delete an account.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/cells/{cell}/accounts/{name}",
    tag = ADMIN_TAG,
    operation_id = "Delete Account",
    params(
        ("cell" = String, Path, description = "Cell name."),
        ("name" = String, Path, description = "Account name."),
    ),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 403, description = "Client address not in allowed networks"),
        (status = 404, description = "Unknown account"),
    )
)]
pub async fn delete_account(
    State(state): State<AppState>,
    Path((cell, name)): Path<(String, String)>,
) -> Response {
    match state.directory.delete(&cell, &name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => directory_error(e),
    }
}

/// Clear the lockout state of an account.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/cells/{cell}/accounts/{name}/lock",
    tag = ADMIN_TAG,
    operation_id = "Unlock Account",
    description = "Resets the failure counter, lifts the account lock and removes any pending \
                   authentication interval.",
    params(
        ("cell" = String, Path, description = "Cell name."),
        ("name" = String, Path, description = "Account name."),
    ),
    responses(
        (status = 204, description = "Account unlocked"),
        (status = 403, description = "Client address not in allowed networks"),
        (status = 404, description = "Unknown account"),
        (status = 503, description = "Account lock could not be acquired in time"),
    )
)]
pub async fn unlock_account(
    State(state): State<AppState>,
    Path((cell, name)): Path<(String, String)>,
) -> Response {
    let _guard = match state
        .locks
        .acquire(&LockManager::account_key(&cell, &name))
        .await
    {
        Ok(guard) => guard,
        Err(e) => {
            tracing::warn!(error = %e, "account busy, unlock not applied");
            return error_json(StatusCode::SERVICE_UNAVAILABLE, e);
        }
    };
    match state.directory.unlock(&cell, &name).await {
        Ok(account) => {
            state
                .locks
                .release(&LockManager::interval_key(&cell, &account.name));
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => directory_error(e),
    }
}

/// Snapshot of the lock table.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/locks",
    tag = ADMIN_TAG,
    operation_id = "List Locks",
    responses(
        (status = 200, description = "Unexpired lock table entries", body = Vec<LockSnapshot>),
        (status = 403, description = "Client address not in allowed networks"),
    )
)]
pub async fn list_locks(State(state): State<AppState>) -> Json<Vec<LockSnapshot>> {
    Json(state.locks.snapshot())
}

/// Bulk deletion of the lock table.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/locks",
    tag = ADMIN_TAG,
    operation_id = "Delete All Locks",
    responses(
        (status = 200, description = "Number of cleared entries", body = ClearedLocks),
        (status = 403, description = "Client address not in allowed networks"),
    )
)]
pub async fn delete_locks(State(state): State<AppState>) -> Json<ClearedLocks> {
    Json(ClearedLocks {
        cleared: state.locks.delete_all(),
    })
}
