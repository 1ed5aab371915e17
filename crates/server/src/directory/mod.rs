//! Account directory: per-cell accounts, their credentials and the failure/lock policy.
//!
//! Counter mutations (`record_auth_attempt`, `unlock`) are expected to run while the caller
//! holds the `account:{cell}:{name}` named lock.

pub mod password;

use crate::config::{AuthnConfig, IpNet, PasswordPolicy};
use crate::entity::{account, cell};
use crate::error::DirectoryError;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use time::OffsetDateTime;
use utoipa::ToSchema;

pub use password::{hash_password, is_valid_password, verify_password};

pub type Account = account::Model;

/// Characters allowed in an account name after the leading alphanumeric one.
const ACCOUNT_NAME_SYMBOLS: &str = "-_!$*=^`{|}~.@";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum AccountStatus {
    #[default]
    Active,
    Deactivated,
    PasswordChangeRequired,
}

impl AccountStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Deactivated => "deactivated",
            AccountStatus::PasswordChangeRequired => "passwordChangeRequired",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "deactivated" => Ok(AccountStatus::Deactivated),
            "passwordChangeRequired" => Ok(AccountStatus::PasswordChangeRequired),
            other => Err(format!("unknown account status: {other}")),
        }
    }
}

impl account::Model {
    /// Unknown status strings are treated as deactivated.
    pub fn account_status(&self) -> AccountStatus {
        self.status.parse().unwrap_or(AccountStatus::Deactivated)
    }

    pub fn is_locked(&self, now: OffsetDateTime) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// Whether `ip` may authenticate as this account. No configured range means any address.
    pub fn allows_ip(&self, ip: &IpAddr) -> bool {
        match self.ip_address_range.as_deref() {
            None => true,
            Some(list) if list.trim().is_empty() => true,
            Some(list) => IpNet::parse_list(list)
                .map(|nets| nets.iter().any(|net| net.contains(ip)))
                .unwrap_or(false),
        }
    }
}

pub fn is_valid_account_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphanumeric()
        && name.len() <= 128
        && chars.all(|c| c.is_ascii_alphanumeric() || ACCOUNT_NAME_SYMBOLS.contains(c))
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct NewAccount {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub status: AccountStatus,
    pub ip_address_range: Option<String>,
}

#[derive(Clone)]
pub struct AccountDirectory {
    db: Arc<DatabaseConnection>,
    authn: AuthnConfig,
    policy: PasswordPolicy,
    /// Verified when the account does not exist so lookups cost the same either way.
    dummy_hash: Arc<str>,
}

impl AccountDirectory {
    pub fn new(
        db: Arc<DatabaseConnection>,
        authn: AuthnConfig,
        policy: PasswordPolicy,
    ) -> Result<Self, DirectoryError> {
        let dummy_hash = hash_password("dummy-password")?;
        Ok(Self {
            db,
            authn,
            policy,
            dummy_hash: dummy_hash.into(),
        })
    }

    pub fn authn_policy(&self) -> &AuthnConfig {
        &self.authn
    }

    #[tracing::instrument(skip(self, new), fields(account = %new.name))]
    pub async fn create(&self, cell: &str, new: NewAccount) -> Result<Account, DirectoryError> {
        if !is_valid_account_name(&new.name) {
            return Err(DirectoryError::InvalidName(new.name));
        }
        if !is_valid_password(&new.password, &self.policy) {
            return Err(DirectoryError::InvalidPassword);
        }
        if let Some(range) = new.ip_address_range.as_deref() {
            IpNet::parse_list(range).map_err(DirectoryError::InvalidIpRange)?;
        }
        if cell::Entity::find_by_id(cell)
            .one(self.db.as_ref())
            .await?
            .is_none()
        {
            return Err(DirectoryError::UnknownCell);
        }
        if self.find(cell, &new.name).await?.is_some() {
            return Err(DirectoryError::AlreadyExists);
        }

        let password_hash = hash_password(&new.password)?;
        let now = OffsetDateTime::now_utc();
        let model = account::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            cell: Set(cell.to_string()),
            name: Set(new.name),
            password_hash: Set(password_hash),
            status: Set(new.status.as_str().to_string()),
            failed_count: Set(0),
            last_authenticated: Set(None),
            locked_until: Set(None),
            ip_address_range: Set(new.ip_address_range),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(self.db.as_ref()).await?)
    }

    pub async fn delete(&self, cell: &str, name: &str) -> Result<(), DirectoryError> {
        let res = account::Entity::delete_many()
            .filter(account::Column::Cell.eq(cell))
            .filter(account::Column::Name.eq(name))
            .exec(self.db.as_ref())
            .await?;
        if res.rows_affected == 0 {
            return Err(DirectoryError::NotFound);
        }
        Ok(())
    }

    pub async fn find(&self, cell: &str, name: &str) -> Result<Option<Account>, DirectoryError> {
        Ok(account::Entity::find()
            .filter(account::Column::Cell.eq(cell))
            .filter(account::Column::Name.eq(name))
            .one(self.db.as_ref())
            .await?)
    }

    pub async fn lookup(&self, cell: &str, name: &str) -> Result<Account, DirectoryError> {
        self.find(cell, name).await?.ok_or(DirectoryError::NotFound)
    }

    /// Checks `password` against the account, or against a dummy hash when there is none.
    pub fn verify_password(&self, account: Option<&Account>, password: &str) -> bool {
        match account {
            Some(a) => verify_password(password, &a.password_hash),
            None => {
                verify_password(password, &self.dummy_hash);
                false
            }
        }
    }

    /// Applies the outcome of one authentication attempt to the account's counters.
    ///
    /// Success clears the failure count and any lock. It stamps `last_authenticated`
    /// unless the account still has to change its password. Failure increments the count
    /// and locks the account once it reaches `authn.account_lock_count`.
    pub async fn record_auth_attempt(
        &self,
        account: &Account,
        success: bool,
        now: OffsetDateTime,
    ) -> Result<Account, DirectoryError> {
        let mut model: account::ActiveModel = account.clone().into();
        if success {
            model.failed_count = Set(0);
            model.locked_until = Set(None);
            if account.account_status() != AccountStatus::PasswordChangeRequired {
                model.last_authenticated = Set(Some(now));
            }
        } else {
            // A lock that already ran out starts a fresh round of counting.
            let previous = match account.locked_until {
                Some(until) if until <= now => 0,
                _ => account.failed_count,
            };
            let failed = previous.saturating_add(1);
            model.failed_count = Set(failed);
            let threshold = self.authn.account_lock_count;
            if threshold > 0 && failed as u32 >= threshold && !account.is_locked(now) {
                let until = now + time::Duration::seconds(self.authn.account_lock_time as i64);
                tracing::info!(cell = %account.cell, account = %account.name, failed, "account locked");
                model.locked_until = Set(Some(until));
            } else if account.locked_until.is_some_and(|until| until <= now) {
                model.locked_until = Set(None);
            }
        }
        model.updated_at = Set(now);
        Ok(model.update(self.db.as_ref()).await?)
    }

    /// Replaces the password and marks the account active.
    pub async fn update_password(
        &self,
        cell: &str,
        name: &str,
        new_password: &str,
    ) -> Result<Account, DirectoryError> {
        if !is_valid_password(new_password, &self.policy) {
            return Err(DirectoryError::InvalidPassword);
        }
        let account = self.lookup(cell, name).await?;
        let password_hash = hash_password(new_password)?;
        let mut model: account::ActiveModel = account.into();
        model.password_hash = Set(password_hash);
        model.status = Set(AccountStatus::Active.as_str().to_string());
        model.updated_at = Set(OffsetDateTime::now_utc());
        Ok(model.update(self.db.as_ref()).await?)
    }

    pub async fn unlock(&self, cell: &str, name: &str) -> Result<Account, DirectoryError> {
        let account = self.lookup(cell, name).await?;
        let mut model: account::ActiveModel = account.into();
        model.failed_count = Set(0);
        model.locked_until = Set(None);
        model.updated_at = Set(OffsetDateTime::now_utc());
        Ok(model.update(self.db.as_ref()).await?)
    }
}
