//! Shared application state handed to every router.

use crate::cells::CellRegistry;
use crate::config::AppConfig;
use crate::directory::AccountDirectory;
use crate::error::DirectoryError;
use crate::keys::KeyStore;
use crate::locks::LockManager;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub locks: LockManager,
    pub keys: KeyStore,
    pub directory: AccountDirectory,
    pub cells: CellRegistry,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: Arc<AppConfig>) -> Result<Self, DirectoryError> {
        let locks = LockManager::new(config.lock.acquire_timeout());
        let keys = KeyStore::new(db.clone(), locks.clone(), config.keys.rsa_bits);
        let directory =
            AccountDirectory::new(db.clone(), config.authn.clone(), config.password.clone())?;
        let cells = CellRegistry::new(db.clone());
        Ok(Self {
            db,
            config,
            locks,
            keys,
            directory,
            cells,
        })
    }

    pub fn cell_url(&self, cell: &str) -> String {
        self.config.cell_url(cell)
    }
}
