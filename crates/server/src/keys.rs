//! Per-cell RSA signing keys and their JWKS rendering.
//!
//! Keys are generated lazily on first use. Generation is serialized in-process by the
//! `cell-key:{cell}` named lock and across processes by the `cell_key` primary key:
//! the row is inserted with `ON CONFLICT DO NOTHING` and then re-read, so whichever
//! keypair got committed first is the one every process uses. Deleting a cell holds the same
//! lock, and no key is generated for a cell that no longer exists.

use crate::entity::{cell, cell_key};
use crate::error::KeyStoreError;
use crate::locks::LockManager;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// JSON Web Key Set as served from `__certs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    pub fn find_by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Jwk {
    #[schema(example = "RSA")]
    pub kty: String,
    #[schema(example = "RS256")]
    pub alg: String,
    pub kid: String,
    /// Modulus, base64url without padding.
    pub n: String,
    #[schema(example = "AQAB")]
    pub e: String,
}

impl Jwk {
    fn from_public_key(public_key: &RsaPublicKey, kid: String) -> Self {
        Self {
            kty: "RSA".to_string(),
            alg: "RS256".to_string(),
            kid,
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    }
}

/// RFC 7638 thumbprint of an RSA JWK: SHA-256 over the canonical member JSON.
pub fn jwk_thumbprint(n: &str, e: &str) -> String {
    // Members in lexicographic order, no whitespace.
    let canonical = format!(r#"{{"e":"{e}","kty":"RSA","n":"{n}"}}"#);
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

/// The committed keypair of one cell, ready for signing and verification.
#[derive(Clone)]
pub struct CellKey {
    pub kid: String,
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub jwk: Jwk,
}

impl std::fmt::Debug for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellKey").field("kid", &self.kid).finish()
    }
}

impl CellKey {
    pub(crate) fn from_pem(kid: String, pem: &str) -> Result<Self, KeyStoreError> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|e| KeyStoreError::Encoding(e.to_string()))?;
        let jwk = Jwk::from_public_key(&RsaPublicKey::from(&private_key), kid.clone());
        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| KeyStoreError::Encoding(e.to_string()))?;
        let decoding = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|e| KeyStoreError::Encoding(e.to_string()))?;
        Ok(Self {
            kid,
            encoding,
            decoding,
            jwk,
        })
    }
}

pub(crate) struct GeneratedKey {
    pub(crate) kid: String,
    pub(crate) pem: String,
}

pub(crate) fn generate_keypair(bits: usize) -> Result<GeneratedKey, KeyStoreError> {
    let mut rng = rsa::rand_core::OsRng;
    let private_key =
        RsaPrivateKey::new(&mut rng, bits).map_err(|e| KeyStoreError::Generate(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);
    let kid = jwk_thumbprint(
        &URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
        &URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
    );
    let pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| KeyStoreError::Encoding(e.to_string()))?;
    Ok(GeneratedKey {
        kid,
        pem: pem.to_string(),
    })
}

#[derive(Clone)]
pub struct KeyStore {
    db: Arc<DatabaseConnection>,
    locks: LockManager,
    cache: Arc<DashMap<String, Arc<CellKey>>>,
    rsa_bits: usize,
}

impl KeyStore {
    pub fn new(db: Arc<DatabaseConnection>, locks: LockManager, rsa_bits: usize) -> Self {
        Self {
            db,
            locks,
            cache: Arc::new(DashMap::new()),
            rsa_bits,
        }
    }

    /// JWKS of the cell, creating the keypair on first access.
    pub async fn get_keys(&self, cell: &str) -> Result<Jwks, KeyStoreError> {
        let key = self.signing_key(cell).await?;
        Ok(Jwks {
            keys: vec![key.jwk.clone()],
        })
    }

    /// The cell's committed keypair, creating it on first access.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn signing_key(&self, cell: &str) -> Result<Arc<CellKey>, KeyStoreError> {
        if let Some(key) = self.cache.get(cell) {
            return Ok(key.clone());
        }

        let _guard = self.locks.acquire(&LockManager::cell_key(cell)).await?;
        // Another task may have finished while we waited for the lock.
        if let Some(key) = self.cache.get(cell) {
            return Ok(key.clone());
        }

        if let Some(row) = cell_key::Entity::find_by_id(cell)
            .one(self.db.as_ref())
            .await?
        {
            return self.cache_row(row);
        }
        if cell::Entity::find_by_id(cell)
            .one(self.db.as_ref())
            .await?
            .is_none()
        {
            return Err(KeyStoreError::UnknownCell(cell.to_string()));
        }

        let bits = self.rsa_bits;
        let generated = tokio::task::spawn_blocking(move || generate_keypair(bits))
            .await
            .map_err(|e| KeyStoreError::Join(e.to_string()))??;

        let row = cell_key::ActiveModel {
            cell: Set(cell.to_string()),
            kid: Set(generated.kid.clone()),
            private_key_pem: Set(generated.pem),
            created_at: Set(OffsetDateTime::now_utc()),
        };
        let inserted = cell_key::Entity::insert(row)
            .on_conflict(
                OnConflict::column(cell_key::Column::Cell)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;

        let committed = cell_key::Entity::find_by_id(cell)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| KeyStoreError::Missing(cell.to_string()))?;

        if inserted == 0 {
            tracing::info!(cell, kid = %committed.kid, "another process committed the cell key first");
        } else {
            tracing::info!(cell, kid = %committed.kid, "generated cell signing key");
        }
        self.cache_row(committed)
    }

    /// Drops the cached key, e.g. after the cell was deleted.
    pub fn invalidate(&self, cell: &str) {
        self.cache.remove(cell);
    }

    fn cache_row(&self, row: cell_key::Model) -> Result<Arc<CellKey>, KeyStoreError> {
        let key = Arc::new(CellKey::from_pem(row.kid, &row.private_key_pem)?);
        self.cache.insert(row.cell, key.clone());
        Ok(key)
    }
}
