use crate::api::client_ip::ClientIp;
use crate::authz::flow::{self, PasswordChange, PasswordChangeRejection, PasswordGrant};
use crate::authz::request::{
    AuthzForm, AuthzQuery, FlowParams, non_empty, validate_client, validate_response_type,
};
use crate::authz::response::{self, error_page, error_redirect, token_redirect};
use crate::authz::AUTHZ_TAG;
use crate::cells::{AuthPage, Cell};
use crate::error::AuthzError;
use crate::messages::MessageCode;
use crate::state::AppState;
use crate::token::negotiate_expires_in;
use axum::{
    Form,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// Validated request context shared by GET and POST.
struct AuthzContext {
    cell: Cell,
    cell_url: String,
    params: FlowParams,
    expires_in: i64,
}

/// Runs the checks every `__authz` request goes through, in order: cell, client_id and
/// redirect_uri, response_type, expires_in. The `Err` side is the finished response.
async fn prepare(
    state: &AppState,
    cell: &str,
    response_type: Option<&str>,
    client_id: Option<&str>,
    redirect_uri: Option<&str>,
    request_state: Option<&str>,
    expires_in: Option<&str>,
) -> Result<AuthzContext, Response> {
    let cell = match state.cells.get(cell).await {
        Ok(Some(cell)) => cell,
        Ok(None) => return Err(StatusCode::NOT_FOUND.into_response()),
        Err(e) => {
            tracing::error!(error = %e, "failed to look up cell");
            return Err(error_page(
                StatusCode::INTERNAL_SERVER_ERROR,
                MessageCode::ServerBusy,
            ));
        }
    };
    let cell_url = state.cell_url(&cell.name);

    if let Err(code) = validate_client(client_id, redirect_uri, &cell_url) {
        tracing::debug!(code = %code, "rejected client parameters");
        return Err(error_response(&AuthzError::MalformedRequest(code)));
    }
    let params = FlowParams {
        response_type: response_type.map(str::to_string),
        client_id: client_id.unwrap_or_default().to_string(),
        redirect_uri: redirect_uri.unwrap_or_default().to_string(),
        state: request_state.unwrap_or_default().to_string(),
        expires_in: expires_in.map(str::to_string),
    };

    if let Err(code) = validate_response_type(response_type) {
        return Err(error_redirect(&params.redirect_uri, &params.state, code));
    }
    let token = &state.config.token;
    let Some(expires_in) = negotiate_expires_in(
        expires_in,
        token.access_token_lifetime,
        token.max_access_token_lifetime,
    ) else {
        return Err(error_redirect(
            &params.redirect_uri,
            &params.state,
            MessageCode::InvalidExpiresIn,
        ));
    };

    Ok(AuthzContext {
        cell,
        cell_url,
        params,
        expires_in,
    })
}

fn prompt(page: AuthPage) -> MessageCode {
    match page {
        AuthPage::Login => MessageCode::EnterCredentials,
        AuthPage::PasswordChange => MessageCode::PasswordChangeRequired,
    }
}

/// The cell's custom page when one is configured and there is no outcome to report,
/// otherwise the default form carrying `code` and the echoed request parameters.
async fn authorization_page(
    state: &AppState,
    ctx: &AuthzContext,
    page: AuthPage,
    code: MessageCode,
    access_token: &str,
) -> Response {
    if code == prompt(page) {
        match state.cells.custom_page(&ctx.cell, &ctx.cell_url, page).await {
            Ok(Some(body)) => return response::html(StatusCode::OK, body),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "custom authorization page lookup failed"),
        }
    }
    match page {
        AuthPage::Login => response::login_page(&ctx.cell_url, &ctx.params, code),
        AuthPage::PasswordChange => {
            response::password_change_page(&ctx.cell_url, &ctx.params, access_token, code)
        }
    }
}

fn error_response(err: &AuthzError) -> Response {
    error_page(err.status(), err.code())
}

/// Display the authorization form.
#[tracing::instrument(skip(state, query), fields(client_id = ?query.client_id))]
#[utoipa::path(
    get,
    path = "/{cell}/__authz",
    tag = AUTHZ_TAG,
    operation_id = "Authorization Form",
    summary = "Display the login form of a cell",
    description = "Renders the cell's custom authorization page if one is configured, otherwise the \
                   system default login form. With `password_change_required=true` the \
                   password-change form is rendered instead.",
    params(
        ("cell" = String, Path, description = "Cell name."),
        AuthzQuery,
    ),
    responses(
        (status = 200, description = "Login form HTML", body = String, content_type = "text/html"),
        (status = 303, description = "Error redirect to redirect_uri"),
        (status = 400, description = "client_id or redirect_uri invalid", body = String, content_type = "text/html"),
        (status = 404, description = "Unknown cell"),
    )
)]
pub async fn authz_get(
    State(state): State<AppState>,
    Path(cell): Path<String>,
    Query(query): Query<AuthzQuery>,
) -> Response {
    let ctx = match prepare(
        &state,
        &cell,
        non_empty(&query.response_type),
        non_empty(&query.client_id),
        non_empty(&query.redirect_uri),
        query.state.as_deref(),
        query.expires_in.as_deref(),
    )
    .await
    {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };

    if query.password_change_required.as_deref() == Some("true") {
        let access_token = query.access_token.as_deref().unwrap_or_default();
        authorization_page(
            &state,
            &ctx,
            AuthPage::PasswordChange,
            MessageCode::PasswordChangeRequired,
            access_token,
        )
        .await
    } else {
        authorization_page(
            &state,
            &ctx,
            AuthPage::Login,
            MessageCode::EnterCredentials,
            "",
        )
        .await
    }
}

/// Authenticate and issue a token.
#[tracing::instrument(skip(state, form), fields(client_id = ?form.client_id, client_ip = %client_ip.0))]
#[utoipa::path(
    post,
    path = "/{cell}/__authz",
    tag = AUTHZ_TAG,
    operation_id = "Authorization Submit",
    summary = "Implicit grant with resource owner password credentials",
    description = "Authenticates `username`/`password` against the cell's accounts. On success \
                   redirects (303) to `redirect_uri` with the access token in the fragment. \
                   Authentication failures re-render the form (HTTP 200) with a message code.\n\n\
                   When `access_token` carries a password-change token, `password` is the new \
                   password; after it is stored the password flow continues with it.",
    params(("cell" = String, Path, description = "Cell name.")),
    request_body(
        content = AuthzForm,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 200, description = "Form re-rendered with an error message", body = String, content_type = "text/html"),
        (status = 303, description = "Redirect to redirect_uri with token or error in the fragment"),
        (status = 400, description = "client_id or redirect_uri invalid", body = String, content_type = "text/html"),
        (status = 404, description = "Unknown cell"),
        (status = 503, description = "Account busy"),
    )
)]
pub async fn authz_post(
    State(state): State<AppState>,
    Path(cell): Path<String>,
    client_ip: ClientIp,
    Form(form): Form<AuthzForm>,
) -> Response {
    let ctx = match prepare(
        &state,
        &cell,
        non_empty(&form.response_type),
        non_empty(&form.client_id),
        non_empty(&form.redirect_uri),
        form.state.as_deref(),
        form.expires_in.as_deref(),
    )
    .await
    {
        Ok(ctx) => ctx,
        Err(resp) => return resp,
    };

    if form.cancel_flg.as_deref() == Some("true") {
        return error_redirect(
            &ctx.params.redirect_uri,
            &ctx.params.state,
            MessageCode::UserCancelled,
        );
    }

    let username = match non_empty(&form.access_token) {
        Some(access_token) => {
            let change = PasswordChange {
                cell: &ctx.cell.name,
                access_token,
                new_password: non_empty(&form.password),
                client_id: &ctx.params.client_id,
                client_ip: client_ip.0,
            };
            match flow::change_password(&state, change).await {
                Ok(username) => username,
                Err(PasswordChangeRejection::Login(code)) => {
                    return authorization_page(&state, &ctx, AuthPage::Login, code, "").await;
                }
                Err(PasswordChangeRejection::PasswordChange(code)) => {
                    return authorization_page(
                        &state,
                        &ctx,
                        AuthPage::PasswordChange,
                        code,
                        access_token,
                    )
                    .await;
                }
                Err(PasswordChangeRejection::Error(err)) => return error_response(&err),
            }
        }
        None => match non_empty(&form.username) {
            Some(username) => username.to_string(),
            None => {
                return authorization_page(
                    &state,
                    &ctx,
                    AuthPage::Login,
                    MessageCode::CredentialsMissing,
                    "",
                )
                .await;
            }
        },
    };
    let Some(password) = non_empty(&form.password) else {
        return authorization_page(
            &state,
            &ctx,
            AuthPage::Login,
            MessageCode::CredentialsMissing,
            "",
        )
        .await;
    };

    let grant = PasswordGrant {
        cell: &ctx.cell.name,
        username: &username,
        password,
        client_id: &ctx.params.client_id,
        expires_in: ctx.expires_in,
        client_ip: client_ip.0,
    };
    match flow::authenticate(&state, grant).await {
        Ok(issued) => token_redirect(&ctx.params.redirect_uri, &ctx.params.state, &issued),
        Err(err) if err.status() == StatusCode::OK => {
            authorization_page(&state, &ctx, AuthPage::Login, err.code(), "").await
        }
        Err(err) => error_response(&err),
    }
}

/// Allowed methods of the authorization endpoint.
#[utoipa::path(
    options,
    path = "/{cell}/__authz",
    tag = AUTHZ_TAG,
    operation_id = "Authorization Options",
    params(("cell" = String, Path, description = "Cell name.")),
    responses((status = 200, description = "Allowed methods in the `Allow` header"))
)]
pub async fn authz_options(Path(_cell): Path<String>) -> impl IntoResponse {
    (StatusCode::OK, [(header::ALLOW, "OPTIONS, GET, POST")])
}
