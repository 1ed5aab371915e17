//! Stored documents of a cell. Only custom authorization pages are kept here.

use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cell_resource")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub cell: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub path: String,
    pub content_type: String,
    #[sea_orm(column_type = "Text")]
    pub body: String,
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
