use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApiKeys::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ApiKeys::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ApiKeys::Name).string_len(255).not_null())
                    .col(ColumnDef::new(ApiKeys::ClientId).string_len(100).not_null().unique_key())
                    .col(ColumnDef::new(ApiKeys::Key).string_len(100).not_null().unique_key())
                    .col(ColumnDef::new(ApiKeys::AppId).uuid().not_null())
                    .col(ColumnDef::new(ApiKeys::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(ApiKeys::DeletedAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_api_keys_app_id")
                            .from(ApiKeys::Table, ApiKeys::AppId)
                            .to(Apps::Table, Apps::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ApiKeys::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ApiKeys {
    #[sea_orm(iden = "apiKeys")]
    Table,
    Id,
    Name,
    ClientId,
    Key,
    AppId,
    CreatedAt,
    DeletedAt,
}

#[derive(DeriveIden)]
enum Apps {
    Table,
    Id,
}
