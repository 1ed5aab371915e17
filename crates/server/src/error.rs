use crate::messages::MessageCode;
use axum::http::StatusCode;
use sea_orm::DbErr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("Timed out after {waited:?} waiting for lock {key}")]
    Timeout { key: String, waited: Duration },
}

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("Key generation failed: {0}")]
    Generate(String),
    #[error("Key encoding failed: {0}")]
    Encoding(String),
    #[error("Key generation task failed: {0}")]
    Join(String),
    #[error("Stored key for cell {0} vanished after commit")]
    Missing(String),
    #[error("Cell {0} does not exist")]
    UnknownCell(String),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Account not found")]
    NotFound,
    #[error("Account already exists")]
    AlreadyExists,
    #[error("Cell does not exist")]
    UnknownCell,
    #[error("Invalid account name: {0}")]
    InvalidName(String),
    #[error("Password does not meet the password policy")]
    InvalidPassword,
    #[error("Invalid IP address range: {0}")]
    InvalidIpRange(String),
    #[error("Password hashing failed: {0}")]
    Hash(String),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

#[derive(Debug, Error)]
pub enum CellError {
    #[error("Invalid cell name: {0}")]
    InvalidName(String),
    #[error("Cell already exists")]
    AlreadyExists,
    #[error("Cell not found")]
    NotFound,
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token has no recognised prefix")]
    UnknownPrefix,
    #[error("Malformed token: {0}")]
    Malformed(String),
    #[error("Token signature is invalid")]
    InvalidSignature,
    #[error("Token was issued by another cell")]
    WrongIssuer,
    #[error("Token has expired")]
    Expired,
    #[error("Token signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::InvalidIssuer => TokenError::WrongIssuer,
            _ => TokenError::Malformed(err.to_string()),
        }
    }
}

/// Outcome of an authorization request that did not produce a token.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account is deactivated")]
    AccountDeactivated,
    #[error("Account not found")]
    AccountNotFound,
    #[error("Account is locked")]
    AccountLocked,
    #[error("Malformed request: {0}")]
    MalformedRequest(MessageCode),
    #[error(transparent)]
    LockTimeout(#[from] LockError),
    #[error(transparent)]
    KeyStoreFailure(#[from] KeyStoreError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl AuthzError {
    /// Code rendered to the user. Authentication failures deliberately share one code.
    pub fn code(&self) -> MessageCode {
        match self {
            AuthzError::InvalidCredentials
            | AuthzError::AccountDeactivated
            | AuthzError::AccountNotFound
            | AuthzError::AccountLocked => MessageCode::IncorrectCredentials,
            AuthzError::MalformedRequest(code) => *code,
            AuthzError::Token(TokenError::Expired) => MessageCode::TokenExpired,
            AuthzError::Token(_) => MessageCode::EnterCredentials,
            AuthzError::LockTimeout(_)
            | AuthzError::KeyStoreFailure(_)
            | AuthzError::Database(_) => MessageCode::ServerBusy,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthzError::InvalidCredentials
            | AuthzError::AccountDeactivated
            | AuthzError::AccountNotFound
            | AuthzError::AccountLocked
            | AuthzError::Token(_) => StatusCode::OK,
            AuthzError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            AuthzError::LockTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthzError::KeyStoreFailure(_) | AuthzError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<DirectoryError> for AuthzError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound | DirectoryError::UnknownCell => AuthzError::AccountNotFound,
            DirectoryError::Database(e) => AuthzError::Database(e),
            other => AuthzError::Database(DbErr::Custom(other.to_string())),
        }
    }
}
