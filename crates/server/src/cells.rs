//! Cell registry: cells, their authorization page properties and stored resources.

use crate::entity::{account, cell, cell_key, cell_resource};
use crate::error::CellError;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait, sea_query::OnConflict,
};
use serde::Deserialize;
use std::sync::Arc;
use time::OffsetDateTime;
use utoipa::ToSchema;

pub type Cell = cell::Model;

pub fn is_valid_cell_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphanumeric()
        && name.len() <= 128
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Which authorization page to resolve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthPage {
    Login,
    PasswordChange,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct CellProperties {
    pub authorization_html_url: Option<String>,
    pub authorization_password_change_html_url: Option<String>,
}

#[derive(Clone)]
pub struct CellRegistry {
    db: Arc<DatabaseConnection>,
}

impl CellRegistry {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create(&self, name: &str) -> Result<Cell, CellError> {
        if !is_valid_cell_name(name) {
            return Err(CellError::InvalidName(name.to_string()));
        }
        if self.get(name).await?.is_some() {
            return Err(CellError::AlreadyExists);
        }
        let now = OffsetDateTime::now_utc();
        let model = cell::ActiveModel {
            name: Set(name.to_string()),
            authorization_html_url: Set(None),
            authorization_password_change_html_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(self.db.as_ref()).await?)
    }

    pub async fn get(&self, name: &str) -> Result<Option<Cell>, CellError> {
        Ok(cell::Entity::find_by_id(name).one(self.db.as_ref()).await?)
    }

    pub async fn require(&self, name: &str) -> Result<Cell, CellError> {
        self.get(name).await?.ok_or(CellError::NotFound)
    }

    /// Removes the cell together with its accounts, resources and signing key.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<(), CellError> {
        let txn = self.db.begin().await?;
        account::Entity::delete_many()
            .filter(account::Column::Cell.eq(name))
            .exec(&txn)
            .await?;
        cell_resource::Entity::delete_many()
            .filter(cell_resource::Column::Cell.eq(name))
            .exec(&txn)
            .await?;
        cell_key::Entity::delete_by_id(name).exec(&txn).await?;
        let res = cell::Entity::delete_by_id(name).exec(&txn).await?;
        if res.rows_affected == 0 {
            txn.rollback().await?;
            return Err(CellError::NotFound);
        }
        txn.commit().await?;
        Ok(())
    }

    pub async fn set_properties(
        &self,
        name: &str,
        props: CellProperties,
    ) -> Result<Cell, CellError> {
        let cell = self.require(name).await?;
        let mut model: cell::ActiveModel = cell.into();
        model.authorization_html_url = Set(props.authorization_html_url);
        model.authorization_password_change_html_url =
            Set(props.authorization_password_change_html_url);
        model.updated_at = Set(OffsetDateTime::now_utc());
        Ok(model.update(self.db.as_ref()).await?)
    }

    /// Creates or replaces a stored resource at the cell-relative `path`.
    pub async fn put_resource(
        &self,
        cell: &str,
        path: &str,
        content_type: &str,
        body: String,
    ) -> Result<(), CellError> {
        self.require(cell).await?;
        let model = cell_resource::ActiveModel {
            cell: Set(cell.to_string()),
            path: Set(normalize_path(path)),
            content_type: Set(content_type.to_string()),
            body: Set(body),
            updated_at: Set(OffsetDateTime::now_utc()),
        };
        cell_resource::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([cell_resource::Column::Cell, cell_resource::Column::Path])
                    .update_columns([
                        cell_resource::Column::ContentType,
                        cell_resource::Column::Body,
                        cell_resource::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    pub async fn get_resource(
        &self,
        cell: &str,
        path: &str,
    ) -> Result<Option<cell_resource::Model>, CellError> {
        Ok(
            cell_resource::Entity::find_by_id((cell.to_string(), normalize_path(path)))
                .one(self.db.as_ref())
                .await?,
        )
    }

    /// Body of the custom authorization page configured for the cell, if any.
    ///
    /// The configured URL may be cell-relative (`/login.html`) or an absolute URL under
    /// `cell_url`. URLs pointing anywhere else, or at a missing resource, resolve to `None`.
    pub async fn custom_page(
        &self,
        cell: &Cell,
        cell_url: &str,
        page: AuthPage,
    ) -> Result<Option<String>, CellError> {
        let configured = match page {
            AuthPage::Login => cell.authorization_html_url.as_deref(),
            AuthPage::PasswordChange => cell.authorization_password_change_html_url.as_deref(),
        };
        let Some(url) = configured.map(str::trim).filter(|u| !u.is_empty()) else {
            return Ok(None);
        };
        let path = if let Some(rest) = url.strip_prefix(cell_url) {
            rest
        } else if url.contains("://") {
            tracing::warn!(cell = %cell.name, url, "authorization page outside the cell is ignored");
            return Ok(None);
        } else {
            url
        };
        Ok(self
            .get_resource(&cell.name, path)
            .await?
            .map(|resource| resource.body))
    }
}

fn normalize_path(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_name_rules() {
        assert!(is_valid_cell_name("tenant-1_a"));
        assert!(!is_valid_cell_name("__admin"));
        assert!(!is_valid_cell_name("bad.name"));
        assert!(!is_valid_cell_name(""));
        assert!(!is_valid_cell_name(&"c".repeat(129)));
    }

    #[test]
    fn paths_are_cell_relative() {
        assert_eq!(normalize_path("/login.html"), "login.html");
        assert_eq!(normalize_path("box/login.html"), "box/login.html");
    }
}
