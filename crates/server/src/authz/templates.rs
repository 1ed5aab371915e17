use crate::authz::request::FlowParams;
use crate::messages::MessageCode;
use askama::Template;

/// System default login form.
#[derive(Template)]
#[template(path = "authform.html")]
pub struct LoginTemplate<'a> {
    pub title: &'static str,
    pub cell_url: &'a str,
    pub response_type: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub state: &'a str,
    pub expires_in: &'a str,
    pub message_code: &'static str,
    pub message: &'static str,
    pub is_error: bool,
}

/// System default password-change form.
#[derive(Template)]
#[template(path = "authform_passwordchange.html")]
pub struct PasswordChangeTemplate<'a> {
    pub cell_url: &'a str,
    pub response_type: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub state: &'a str,
    pub expires_in: &'a str,
    pub access_token: &'a str,
    pub message_code: &'static str,
    pub message: &'static str,
    pub is_error: bool,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub message_code: &'static str,
    pub message: &'static str,
}

/// Prompts are informational, everything else is shown as an error.
fn is_error(code: MessageCode) -> bool {
    !matches!(
        code,
        MessageCode::EnterCredentials | MessageCode::PasswordChangeRequired
    )
}

impl<'a> LoginTemplate<'a> {
    pub fn new(cell_url: &'a str, params: &'a FlowParams, code: MessageCode) -> Self {
        Self {
            title: MessageCode::FormTitle.message(),
            cell_url,
            response_type: params.response_type.as_deref().unwrap_or("token"),
            client_id: &params.client_id,
            redirect_uri: &params.redirect_uri,
            state: &params.state,
            expires_in: params.expires_in.as_deref().unwrap_or_default(),
            message_code: code.code(),
            message: code.message(),
            is_error: is_error(code),
        }
    }
}

impl<'a> PasswordChangeTemplate<'a> {
    pub fn new(
        cell_url: &'a str,
        params: &'a FlowParams,
        access_token: &'a str,
        code: MessageCode,
    ) -> Self {
        Self {
            cell_url,
            response_type: params.response_type.as_deref().unwrap_or("token"),
            client_id: &params.client_id,
            redirect_uri: &params.redirect_uri,
            state: &params.state,
            expires_in: params.expires_in.as_deref().unwrap_or_default(),
            access_token,
            message_code: code.code(),
            message: code.message(),
            is_error: is_error(code),
        }
    }
}

impl ErrorTemplate {
    pub fn new(code: MessageCode) -> Self {
        Self {
            message_code: code.code(),
            message: code.message(),
        }
    }
}
