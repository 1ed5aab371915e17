//! Parameters of `__authz` requests and their validation.

use crate::messages::MessageCode;
use serde::Deserialize;
use url::Url;
use utoipa::{IntoParams, ToSchema};

/// Query string of `GET __authz`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthzQuery {
    /// Must be `token`.
    pub response_type: Option<String>,
    /// URL of the client application.
    pub client_id: Option<String>,
    /// Where the result is sent. Must live under `client_id`.
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
    /// Requested token lifetime in seconds.
    pub expires_in: Option<String>,
    /// `true` renders the password-change page.
    pub password_change_required: Option<String>,
    /// Password-change token to embed in the password-change page.
    pub access_token: Option<String>,
}

/// Form body of `POST __authz`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AuthzForm {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
    pub expires_in: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// `AP~` password-change token; `password` then carries the new password.
    pub access_token: Option<String>,
    /// `true` when the user pressed cancel.
    pub cancel_flg: Option<String>,
}

/// Parameters common to every `__authz` request, echoed back into rendered forms.
#[derive(Debug, Clone, Default)]
pub struct FlowParams {
    pub response_type: Option<String>,
    pub client_id: String,
    pub redirect_uri: String,
    pub state: String,
    pub expires_in: Option<String>,
}

/// Treats empty form fields as absent.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn parse_http_url(raw: &str) -> Option<Url> {
    if raw.contains(['\r', '\n']) {
        return None;
    }
    let url = Url::parse(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    Some(url)
}

/// Checks `client_id` and `redirect_uri`. Failures are never redirected since the
/// redirect target itself cannot be trusted.
pub fn validate_client(
    client_id: Option<&str>,
    redirect_uri: Option<&str>,
    cell_url: &str,
) -> Result<(), MessageCode> {
    let client = client_id
        .and_then(parse_http_url)
        .ok_or(MessageCode::InvalidClientId)?;
    if client.as_str().trim_end_matches('/') == cell_url.trim_end_matches('/') {
        return Err(MessageCode::InvalidClientId);
    }

    let redirect = redirect_uri
        .and_then(parse_http_url)
        .ok_or(MessageCode::InvalidRedirectUri)?;
    if redirect.fragment().is_some() {
        return Err(MessageCode::InvalidRedirectUri);
    }
    let same_origin = client.scheme() == redirect.scheme()
        && client.host_str() == redirect.host_str()
        && client.port_or_known_default() == redirect.port_or_known_default();
    if !same_origin || !redirect.path().starts_with(client.path()) {
        return Err(MessageCode::InvalidRedirectUri);
    }
    Ok(())
}

/// The only supported response type is `token`.
pub fn validate_response_type(response_type: Option<&str>) -> Result<(), MessageCode> {
    match response_type {
        None => Err(MessageCode::ResponseTypeMissing),
        Some("token") => Ok(()),
        Some(_) => Err(MessageCode::UnsupportedResponseType),
    }
}
