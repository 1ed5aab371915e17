//! Authentication flows behind `POST __authz`.
//!
//! Password flow:
//! acquire `account:{cell}:{name}` → look up account → check interval lock, account lock,
//! IP range, password, status (in that order) → record the outcome → issue a token.
//! Every failing check counts as a failure and re-arms the authentication interval.

use crate::authz::response::IssuedToken;
use crate::directory::AccountStatus;
use crate::error::{AuthzError, DirectoryError, KeyStoreError, LockError, TokenError};
use crate::locks::LockManager;
use crate::logging::AuthnEvent;
use crate::messages::MessageCode;
use crate::state::AppState;
use crate::token::{self, Claims, TokenKind};
use std::net::IpAddr;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::Instrument;

/// Why an authentication attempt was refused. Never shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    NotFound,
    WithinInterval,
    Locked,
    IpMismatch,
    WrongPassword,
    Deactivated,
}

impl Failure {
    pub const fn reason(self) -> &'static str {
        match self {
            Failure::NotFound => "account_not_found",
            Failure::WithinInterval => "authn_interval",
            Failure::Locked => "account_locked",
            Failure::IpMismatch => "ip_address_mismatch",
            Failure::WrongPassword => "wrong_password",
            Failure::Deactivated => "account_deactivated",
        }
    }
}

impl From<Failure> for AuthzError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::NotFound => AuthzError::AccountNotFound,
            Failure::WithinInterval | Failure::Locked => AuthzError::AccountLocked,
            Failure::IpMismatch | Failure::WrongPassword => AuthzError::InvalidCredentials,
            Failure::Deactivated => AuthzError::AccountDeactivated,
        }
    }
}

pub struct PasswordGrant<'a> {
    pub cell: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub client_id: &'a str,
    pub expires_in: i64,
    pub client_ip: IpAddr,
}

/// Runs the password flow and logs the outcome as one authn event.
pub async fn authenticate(
    state: &AppState,
    grant: PasswordGrant<'_>,
) -> Result<IssuedToken, AuthzError> {
    let evt = AuthnEvent::new(grant.cell, grant.client_ip);
    evt.add("account", grant.username);
    evt.add("flow", "password");

    let result = run_password_flow(state, &grant)
        .instrument(evt.span().clone())
        .await;
    match &result {
        Ok(issued) => evt.success(issued.kind.prefix()),
        Err(Rejected::Failure(failure)) => {
            evt.failure(failure.reason(), MessageCode::IncorrectCredentials)
        }
        Err(Rejected::Error(err)) => evt.error(err, err.code()),
    }
    result.map_err(|r| match r {
        Rejected::Failure(failure) => failure.into(),
        Rejected::Error(err) => err,
    })
}

enum Rejected {
    Failure(Failure),
    Error(AuthzError),
}

impl From<AuthzError> for Rejected {
    fn from(err: AuthzError) -> Self {
        Rejected::Error(err)
    }
}

impl From<DirectoryError> for Rejected {
    fn from(err: DirectoryError) -> Self {
        Rejected::Error(err.into())
    }
}

impl From<KeyStoreError> for Rejected {
    fn from(err: KeyStoreError) -> Self {
        Rejected::Error(err.into())
    }
}

impl From<LockError> for Rejected {
    fn from(err: LockError) -> Self {
        Rejected::Error(err.into())
    }
}

async fn run_password_flow(
    state: &AppState,
    grant: &PasswordGrant<'_>,
) -> Result<IssuedToken, Rejected> {
    let cell = grant.cell;
    let _guard = state
        .locks
        .acquire(&LockManager::account_key(cell, grant.username))
        .await?;
    let now = OffsetDateTime::now_utc();

    let Some(account) = state.directory.find(cell, grant.username).await? else {
        state.directory.verify_password(None, grant.password);
        return Err(Rejected::Failure(Failure::NotFound));
    };

    let interval_key = LockManager::interval_key(cell, &account.name);
    let failure = if state.locks.is_held(&interval_key) {
        Some(Failure::WithinInterval)
    } else if account.is_locked(now) {
        Some(Failure::Locked)
    } else if !account.allows_ip(&grant.client_ip) {
        Some(Failure::IpMismatch)
    } else if !state.directory.verify_password(Some(&account), grant.password) {
        Some(Failure::WrongPassword)
    } else if account.account_status() == AccountStatus::Deactivated {
        Some(Failure::Deactivated)
    } else {
        None
    };

    if let Some(failure) = failure {
        state.directory.record_auth_attempt(&account, false, now).await?;
        let interval = state.directory.authn_policy().valid_authn_interval;
        if interval > 0 {
            state.locks.register_expiring(
                &interval_key,
                &grant.client_ip.to_string(),
                Duration::from_secs(interval),
            );
        }
        return Err(Rejected::Failure(failure));
    }

    let key = state.keys.signing_key(cell).await?;
    let claims = Claims::new(
        &state.cell_url(cell),
        &account.name,
        grant.client_id,
        grant.expires_in,
        now,
    );
    let (kind, claims) = match account.account_status() {
        AccountStatus::PasswordChangeRequired => (
            TokenKind::PasswordChange,
            claims.with_password_change_info(account.last_authenticated, account.failed_count),
        ),
        _ => (TokenKind::Access, claims),
    };
    let token = token::encode(&key, kind, &claims)
        .map_err(|e| AuthzError::KeyStoreFailure(KeyStoreError::Encoding(e.to_string())))?;

    state.directory.record_auth_attempt(&account, true, now).await?;
    state.locks.release(&interval_key);

    Ok(IssuedToken {
        token,
        kind,
        expires_in: grant.expires_in,
        last_authenticated: account.last_authenticated,
        failed_count: account.failed_count,
    })
}

/// How a rejected password change is presented.
#[derive(Debug)]
pub enum PasswordChangeRejection {
    /// Back to the login form with this message.
    Login(MessageCode),
    /// Back to the password-change form with this message.
    PasswordChange(MessageCode),
    Error(AuthzError),
}

pub struct PasswordChange<'a> {
    pub cell: &'a str,
    pub access_token: &'a str,
    pub new_password: Option<&'a str>,
    pub client_id: &'a str,
    pub client_ip: IpAddr,
}

/// Replaces the password of the account named by a valid `AP~` token.
///
/// Returns the account name so the caller can continue with the password flow.
pub async fn change_password(
    state: &AppState,
    change: PasswordChange<'_>,
) -> Result<String, PasswordChangeRejection> {
    let evt = AuthnEvent::new(change.cell, change.client_ip);
    evt.add("flow", "password_change");

    let result = run_password_change(state, &change, &evt)
        .instrument(evt.span().clone())
        .await;
    match &result {
        Ok(_) => evt.success("password_changed"),
        Err(PasswordChangeRejection::Login(code))
        | Err(PasswordChangeRejection::PasswordChange(code)) => {
            evt.failure("password_change_rejected", *code)
        }
        Err(PasswordChangeRejection::Error(err)) => evt.error(err, err.code()),
    }
    result
}

async fn run_password_change(
    state: &AppState,
    change: &PasswordChange<'_>,
    evt: &AuthnEvent,
) -> Result<String, PasswordChangeRejection> {
    let Some(new_password) = change.new_password.filter(|p| !p.is_empty()) else {
        return Err(PasswordChangeRejection::PasswordChange(
            MessageCode::NewPasswordMissing,
        ));
    };

    let key = state
        .keys
        .signing_key(change.cell)
        .await
        .map_err(|e| PasswordChangeRejection::Error(e.into()))?;
    let decoded = match token::decode(&key, &state.cell_url(change.cell), change.access_token) {
        Ok(decoded) => decoded,
        Err(TokenError::Expired) => {
            return Err(PasswordChangeRejection::Login(MessageCode::TokenExpired));
        }
        Err(err) => {
            tracing::debug!(error = %err, "rejected password-change token");
            return Err(PasswordChangeRejection::Login(MessageCode::EnterCredentials));
        }
    };
    if decoded.kind != TokenKind::PasswordChange || decoded.claims.aud != change.client_id {
        return Err(PasswordChangeRejection::Login(MessageCode::EnterCredentials));
    }
    let account = decoded.claims.sub;
    evt.add("account", &account);

    let _guard = state
        .locks
        .acquire(&LockManager::account_key(change.cell, &account))
        .await
        .map_err(|e| PasswordChangeRejection::Error(e.into()))?;

    match state
        .directory
        .update_password(change.cell, &account, new_password)
        .await
    {
        Ok(_) => Ok(account),
        Err(DirectoryError::NotFound) => Err(PasswordChangeRejection::Login(
            MessageCode::IncorrectCredentials,
        )),
        Err(DirectoryError::InvalidPassword) => Err(PasswordChangeRejection::PasswordChange(
            MessageCode::InvalidPasswordFormat,
        )),
        Err(err) => {
            tracing::error!(error = %err, "failed to store new password");
            Err(PasswordChangeRejection::PasswordChange(
                MessageCode::PasswordChangeFailed,
            ))
        }
    }
}
