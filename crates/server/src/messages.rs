//! Stable message codes shown on the authorization pages and carried in error redirects.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageCode {
    /// Login form title.
    FormTitle,
    /// Default prompt on the login form.
    EnterCredentials,
    /// Username or password missing.
    CredentialsMissing,
    /// Wrong credentials. Also used for every state that must not be revealed.
    IncorrectCredentials,
    /// Password-change token expired.
    TokenExpired,
    /// Password change required prompt.
    PasswordChangeRequired,
    /// New password missing.
    NewPasswordMissing,
    /// New password does not meet the policy.
    InvalidPasswordFormat,
    /// Storing the new password failed.
    PasswordChangeFailed,
    UnsupportedResponseType,
    InvalidClientId,
    InvalidRedirectUri,
    ResponseTypeMissing,
    InvalidExpiresIn,
    UserCancelled,
    ServerBusy,
}

impl MessageCode {
    pub const fn code(self) -> &'static str {
        match self {
            MessageCode::FormTitle => "PS-AU-0001",
            MessageCode::EnterCredentials => "PS-AU-0002",
            MessageCode::CredentialsMissing => "PS-AU-0003",
            MessageCode::IncorrectCredentials => "PS-AU-0004",
            MessageCode::TokenExpired => "PS-AU-0005",
            MessageCode::PasswordChangeRequired => "PS-AU-0006",
            MessageCode::NewPasswordMissing => "PS-AU-0007",
            MessageCode::InvalidPasswordFormat => "PS-AU-0008",
            MessageCode::PasswordChangeFailed => "PS-AU-0009",
            MessageCode::UnsupportedResponseType => "PR400-AZ-0001",
            MessageCode::InvalidClientId => "PR400-AZ-0002",
            MessageCode::InvalidRedirectUri => "PR400-AZ-0003",
            MessageCode::ResponseTypeMissing => "PR400-AZ-0004",
            MessageCode::InvalidExpiresIn => "PR400-AZ-0008",
            MessageCode::UserCancelled => "PR401-AZ-0001",
            MessageCode::ServerBusy => "PS-SV-0001",
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            MessageCode::FormTitle => "Login",
            MessageCode::EnterCredentials => "Enter your ID and password.",
            MessageCode::CredentialsMissing => "Please enter your ID and password.",
            MessageCode::IncorrectCredentials => "The ID or password is incorrect.",
            MessageCode::TokenExpired => "Your session has expired. Please log in again.",
            MessageCode::PasswordChangeRequired => "You are required to change your password.",
            MessageCode::NewPasswordMissing => "Please enter a new password.",
            MessageCode::InvalidPasswordFormat => {
                "The new password does not meet the password policy."
            }
            MessageCode::PasswordChangeFailed => "Failed to change the password.",
            MessageCode::UnsupportedResponseType => "Unsupported response_type.",
            MessageCode::InvalidClientId => "client_id is missing or invalid.",
            MessageCode::InvalidRedirectUri => "redirect_uri is missing or invalid.",
            MessageCode::ResponseTypeMissing => "response_type is required.",
            MessageCode::InvalidExpiresIn => "expires_in is out of range.",
            MessageCode::UserCancelled => "The user cancelled the authorization.",
            MessageCode::ServerBusy => "The server is busy. Please try again later.",
        }
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
