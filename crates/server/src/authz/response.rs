//! HTML pages and redirects produced by `__authz`.

use crate::authz::request::FlowParams;
use crate::authz::templates::{ErrorTemplate, LoginTemplate, PasswordChangeTemplate};
use crate::messages::MessageCode;
use crate::token::TokenKind;
use askama::Template;
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use time::OffsetDateTime;

pub const HTML_CONTENT_TYPE: &str = "text/html;charset=UTF-8";

/// A token ready to be handed to the client.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub kind: TokenKind,
    pub expires_in: i64,
    /// Previous successful authentication, reported with password-change tokens.
    pub last_authenticated: Option<OffsetDateTime>,
    pub failed_count: i32,
}

/// 303 See Other. A location that is not a valid header value yields the error page.
fn see_other(location: &str) -> Response {
    match HeaderValue::try_from(location) {
        Ok(value) => (StatusCode::SEE_OTHER, [(header::LOCATION, value)]).into_response(),
        Err(_) => error_page(StatusCode::BAD_REQUEST, MessageCode::InvalidRedirectUri),
    }
}

pub fn html(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)], body).into_response()
}

fn render<T: Template>(template: T) -> Response {
    match template.render() {
        Ok(body) => html(StatusCode::OK, body),
        Err(e) => {
            tracing::error!("Failed to render authorization template: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

pub fn login_page(cell_url: &str, params: &FlowParams, code: MessageCode) -> Response {
    render(LoginTemplate::new(cell_url, params, code))
}

pub fn password_change_page(
    cell_url: &str,
    params: &FlowParams,
    access_token: &str,
    code: MessageCode,
) -> Response {
    render(PasswordChangeTemplate::new(
        cell_url,
        params,
        access_token,
        code,
    ))
}

/// Stand-alone error page for requests that cannot be redirected.
pub fn error_page(status: StatusCode, code: MessageCode) -> Response {
    match ErrorTemplate::new(code).render() {
        Ok(body) => html(status, body),
        Err(e) => {
            tracing::error!("Failed to render error template: {}", e);
            (status, code.code()).into_response()
        }
    }
}

/// OAuth2 `error` value for a request validation failure.
fn oauth_error(code: MessageCode) -> &'static str {
    match code {
        MessageCode::UnsupportedResponseType => "unsupported_response_type",
        MessageCode::UserCancelled => "unauthorized_client",
        _ => "invalid_request",
    }
}

/// 303 to `redirect_uri#error=...&error_description=...&state=...&code=...`.
pub fn error_redirect(redirect_uri: &str, state: &str, code: MessageCode) -> Response {
    let location = format!(
        "{redirect_uri}#error={}&error_description={}&state={}&code={}",
        oauth_error(code),
        urlencoding::encode(code.message()),
        urlencoding::encode(state),
        code.code(),
    );
    see_other(&location)
}

/// 303 to `redirect_uri#access_token=...&token_type=Bearer&expires_in=N&state=S`, with the
/// extra password-change fields for `AP~` tokens.
pub fn token_redirect(redirect_uri: &str, state: &str, issued: &IssuedToken) -> Response {
    let mut location = format!(
        "{redirect_uri}#access_token={}&token_type=Bearer&expires_in={}&state={}",
        urlencoding::encode(&issued.token),
        issued.expires_in,
        urlencoding::encode(state),
    );
    if issued.kind == TokenKind::PasswordChange {
        let last_authenticated = issued
            .last_authenticated
            .map(|t| ((t.unix_timestamp_nanos() / 1_000_000) as i64).to_string())
            .unwrap_or_default();
        location.push_str(&format!(
            "&last_authenticated={last_authenticated}&failed_count={}&password_change_required=true",
            issued.failed_count
        ));
    }
    see_other(&location)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(resp: &Response) -> String {
        resp.headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn error_redirect_fragment() {
        let resp = error_redirect(
            "https://app.example/cb",
            "xyz",
            MessageCode::UnsupportedResponseType,
        );
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let loc = location(&resp);
        assert!(loc.starts_with("https://app.example/cb#error=unsupported_response_type&"));
        assert!(loc.contains("&state=xyz&code=PR400-AZ-0001"));
    }

    #[test]
    fn password_change_redirect_carries_extra_fields() {
        let issued = IssuedToken {
            token: "AP~a.b.c".into(),
            kind: TokenKind::PasswordChange,
            expires_in: 5,
            last_authenticated: None,
            failed_count: 3,
        };
        let loc = location(&token_redirect("https://app.example/cb", "s", &issued));
        assert!(loc.starts_with("https://app.example/cb#access_token=AP~a.b.c&token_type=Bearer&expires_in=5&state=s"));
        assert!(loc.ends_with("&last_authenticated=&failed_count=3&password_change_required=true"));
    }

    #[test]
    fn html_pages_use_utf8_content_type() {
        let resp = error_page(StatusCode::BAD_REQUEST, MessageCode::InvalidClientId);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            HTML_CONTENT_TYPE
        );
    }
}
