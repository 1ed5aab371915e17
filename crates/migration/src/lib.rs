pub use sea_orm_migration::prelude::*;

mod m20261015_120000_add_cell_tables;
mod m20261015_130000_add_account_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261015_120000_add_cell_tables::Migration),
            Box::new(m20261015_130000_add_account_table::Migration),
        ]
    }
}
