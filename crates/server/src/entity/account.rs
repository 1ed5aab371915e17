//! Account entity - a login identity inside a cell.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "account")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub cell: String,
    pub name: String,
    /// Argon2id PHC string.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// One of `active`, `deactivated`, `passwordChangeRequired`.
    pub status: String,
    /// Failures since the last successful authentication.
    pub failed_count: i32,
    pub last_authenticated: Option<OffsetDateTime>,
    pub locked_until: Option<OffsetDateTime>,
    /// Comma separated CIDR list the client address must fall in.
    pub ip_address_range: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cell::Entity",
        from = "Column::Cell",
        to = "super::cell::Column::Name",
        on_delete = "Cascade"
    )]
    Cell,
}

impl Related<super::cell::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cell.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
