//! Process-wide named locks.
//!
//! Two kinds of locks live here:
//! - named async mutexes (`acquire`) that serialize mutations of one resource, e.g.
//!   `account:{cell}:{name}` or `cell-key:{cell}`;
//! - an explicit lock table of expiring entries (`register_expiring`) used for the
//!   authentication interval. Only this table is visible to `snapshot` and `delete_all`.

use crate::error::LockError;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use utoipa::ToSchema;

#[derive(Clone, Debug)]
pub struct LockEntry {
    pub holder: String,
    pub expires_at: OffsetDateTime,
}

impl LockEntry {
    fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct LockSnapshot {
    pub key: String,
    pub holder: String,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct LockManager {
    mutexes: Arc<DashMap<String, Arc<Mutex<()>>>>,
    table: Arc<DashMap<String, LockEntry>>,
    acquire_timeout: Duration,
}

/// Held named lock. Released on drop.
pub struct LockGuard {
    key: String,
    mutexes: Arc<DashMap<String, Arc<Mutex<()>>>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Map + our guard are the only owners: nobody is waiting, forget the mutex.
        self.mutexes
            .remove_if(&self.key, |_, m| Arc::strong_count(m) <= 2);
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("key", &self.key).finish()
    }
}

impl LockManager {
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            mutexes: Arc::new(DashMap::new()),
            table: Arc::new(DashMap::new()),
            acquire_timeout,
        }
    }

    pub fn account_key(cell: &str, account: &str) -> String {
        format!("account:{cell}:{account}")
    }

    pub fn cell_key(cell: &str) -> String {
        format!("cell-key:{cell}")
    }

    /// Lock table key of the authentication interval of an account.
    pub fn interval_key(cell: &str, account: &str) -> String {
        format!("authn-interval:{cell}:{account}")
    }

    /// Waits for the named lock, giving up after the configured timeout.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn acquire(&self, key: &str) -> Result<LockGuard, LockError> {
        let mutex = self
            .mutexes
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match tokio::time::timeout(self.acquire_timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(LockGuard {
                key: key.to_string(),
                mutexes: self.mutexes.clone(),
                _guard: guard,
            }),
            Err(_) => {
                tracing::warn!(
                    key,
                    timeout_ms = self.acquire_timeout.as_millis() as u64,
                    "lock acquisition timed out"
                );
                Err(LockError::Timeout {
                    key: key.to_string(),
                    waited: self.acquire_timeout,
                })
            }
        }
    }

    /// Number of named locks currently held or waited on.
    pub fn active_named_locks(&self) -> usize {
        self.mutexes.len()
    }

    /// Registers (or re-arms) an expiring lock.
    pub fn register_expiring(&self, key: &str, holder: &str, ttl: Duration) {
        let expires_at = OffsetDateTime::now_utc() + ttl;
        self.table.insert(
            key.to_string(),
            LockEntry {
                holder: holder.to_string(),
                expires_at,
            },
        );
    }

    /// Whether an unexpired lock exists under `key`. Expired entries are dropped.
    pub fn is_held(&self, key: &str) -> bool {
        let now = OffsetDateTime::now_utc();
        let expired = match self.table.get(key) {
            Some(entry) if !entry.is_expired(now) => return true,
            Some(_) => true,
            None => false,
        };
        if expired {
            self.table.remove_if(key, |_, e| e.is_expired(now));
        }
        false
    }

    pub fn release(&self, key: &str) -> bool {
        self.table.remove(key).is_some()
    }

    /// Bulk deletion of the lock table. Returns how many entries were cleared.
    pub fn delete_all(&self) -> usize {
        let count = self.table.len();
        self.table.clear();
        tracing::info!(count, "cleared lock table");
        count
    }

    /// Unexpired entries of the lock table, sorted by key.
    pub fn snapshot(&self) -> Vec<LockSnapshot> {
        let now = OffsetDateTime::now_utc();
        self.table.retain(|_, e| !e.is_expired(now));
        let mut out: Vec<LockSnapshot> = self
            .table
            .iter()
            .map(|e| LockSnapshot {
                key: e.key().clone(),
                holder: e.value().holder.clone(),
                expires_at: e.value().expires_at,
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}
