//! Creates the cell registry tables:
//! - cell: tenants and their authorization page properties
//! - cell_key: the one committed RSA signing keypair per cell
//! - cell_resource: stored documents used as custom login pages

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Cell::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Cell::Name).string().not_null().primary_key())
                    .col(ColumnDef::new(Cell::AuthorizationHtmlUrl).string().null())
                    .col(
                        ColumnDef::new(Cell::AuthorizationPasswordChangeHtmlUrl)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Cell::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Cell::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // The primary key on `cell` is what makes concurrent key generation commit
        // exactly one keypair.
        manager
            .create_table(
                Table::create()
                    .table(CellKey::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CellKey::Cell)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CellKey::Kid).string().not_null())
                    .col(ColumnDef::new(CellKey::PrivateKeyPem).text().not_null())
                    .col(
                        ColumnDef::new(CellKey::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_cell_key_cell")
                            .from(CellKey::Table, CellKey::Cell)
                            .to(Cell::Table, Cell::Name)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CellResource::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CellResource::Cell).string().not_null())
                    .col(ColumnDef::new(CellResource::Path).string().not_null())
                    .col(
                        ColumnDef::new(CellResource::ContentType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CellResource::Body).text().not_null())
                    .col(
                        ColumnDef::new(CellResource::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(CellResource::Cell)
                            .col(CellResource::Path),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_cell_resource_cell")
                            .from(CellResource::Table, CellResource::Cell)
                            .to(Cell::Table, Cell::Name)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CellResource::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CellKey::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Cell::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub(crate) enum Cell {
    Table,
    Name,
    AuthorizationHtmlUrl,
    AuthorizationPasswordChangeHtmlUrl,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CellKey {
    Table,
    Cell,
    Kid,
    PrivateKeyPem,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CellResource {
    Table,
    Cell,
    Path,
    ContentType,
    Body,
    UpdatedAt,
}
