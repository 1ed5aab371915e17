use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cell_key")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub cell: String,
    pub kid: String,
    /// PKCS#1 PEM.
    #[sea_orm(column_type = "Text")]
    pub private_key_pem: String,
    pub created_at: OffsetDateTime,
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
