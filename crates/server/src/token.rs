//! Token codec.
//!
//! Tokens are RS256 JWTs signed with the cell key and prefixed with their kind:
//! `AR~` for access tokens and `AP~` for the restricted password-change token.

use crate::error::TokenError;
use crate::keys::CellKey;
use jsonwebtoken::{Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const ACCESS_TOKEN_PREFIX: &str = "AR~";
pub const PASSWORD_CHANGE_TOKEN_PREFIX: &str = "AP~";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    PasswordChange,
}

impl TokenKind {
    pub const fn prefix(self) -> &'static str {
        match self {
            TokenKind::Access => ACCESS_TOKEN_PREFIX,
            TokenKind::PasswordChange => PASSWORD_CHANGE_TOKEN_PREFIX,
        }
    }

    /// Splits a token into its kind and JWT body.
    pub fn classify(token: &str) -> Option<(TokenKind, &str)> {
        [TokenKind::Access, TokenKind::PasswordChange]
            .into_iter()
            .find_map(|kind| token.strip_prefix(kind.prefix()).map(|body| (kind, body)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Cell URL.
    pub iss: String,
    /// Account name.
    pub sub: String,
    /// client_id the token was issued to.
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    /// Epoch millis of the previous successful authentication. Password-change tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_authenticated: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_count: Option<i32>,
}

impl Claims {
    pub fn new(
        issuer: &str,
        subject: &str,
        audience: &str,
        lifetime_secs: i64,
        now: OffsetDateTime,
    ) -> Self {
        let iat = now.unix_timestamp();
        Self {
            iss: issuer.to_string(),
            sub: subject.to_string(),
            aud: audience.to_string(),
            iat,
            exp: iat + lifetime_secs,
            jti: uuid::Uuid::new_v4().to_string(),
            last_authenticated: None,
            failed_count: None,
        }
    }

    pub fn with_password_change_info(
        mut self,
        last_authenticated: Option<OffsetDateTime>,
        failed_count: i32,
    ) -> Self {
        self.last_authenticated =
            last_authenticated.map(|t| (t.unix_timestamp_nanos() / 1_000_000) as i64);
        self.failed_count = Some(failed_count);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    pub kind: TokenKind,
    pub claims: Claims,
}

pub fn encode(key: &CellKey, kind: TokenKind, claims: &Claims) -> Result<String, TokenError> {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(key.kid.clone());
    let jwt = jsonwebtoken::encode(&header, claims, &key.encoding)
        .map_err(|e| TokenError::Signing(e.to_string()))?;
    Ok(format!("{}{jwt}", kind.prefix()))
}

/// Verifies a prefixed token issued by `issuer` with `key`. Expiry is checked without leeway.
pub fn decode(key: &CellKey, issuer: &str, token: &str) -> Result<DecodedToken, TokenError> {
    let (kind, body) = TokenKind::classify(token).ok_or(TokenError::UnknownPrefix)?;

    let header = jsonwebtoken::decode_header(body)?;
    if header.kid.as_deref() != Some(key.kid.as_str()) {
        return Err(TokenError::InvalidSignature);
    }

    let mut validation = Validation::new(Algorithm::RS256);
    validation.leeway = 0;
    validation.set_issuer(&[issuer]);
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp", "iss", "sub"]);

    let data = jsonwebtoken::decode::<Claims>(body, &key.decoding, &validation)?;
    Ok(DecodedToken {
        kind,
        claims: data.claims,
    })
}

/// Resolves the token lifetime from the client's `expires_in`.
///
/// Absent or empty means `default`. Anything that is not an integer in `1..=max` is
/// rejected with `None`.
pub fn negotiate_expires_in(requested: Option<&str>, default: i64, max: i64) -> Option<i64> {
    match requested.map(str::trim).filter(|s| !s.is_empty()) {
        None => Some(default.min(max)),
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|secs| (1..=max).contains(secs)),
    }
}
