use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Files::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Files::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Files::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Files::Type).string_len(100).not_null())
                    .col(ColumnDef::new(Files::ContentType).string_len(100).not_null())
                    .col(ColumnDef::new(Files::Path).string_len(1024).not_null())
                    .col(ColumnDef::new(Files::Url).string_len(1024).not_null())
                    .col(ColumnDef::new(Files::UserId).string().not_null())
                    .col(ColumnDef::new(Files::AppId).uuid().not_null())
                    .col(ColumnDef::new(Files::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Files::DeletedAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_files_app_id")
                            .from(Files::Table, Files::AppId)
                            .to(Apps::Table, Apps::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Keyset pagination walks (created_at, id).
        manager
            .create_index(
                Index::create()
                    .name("cursor_idx")
                    .table(Files::Table)
                    .col(Files::Id)
                    .col(Files::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("files_app_id_created_at_idx")
                    .table(Files::Table)
                    .col(Files::AppId)
                    .col(Files::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Files::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Files {
    Table,
    Id,
    Name,
    Type,
    ContentType,
    Path,
    Url,
    UserId,
    AppId,
    CreatedAt,
    DeletedAt,
}

#[derive(DeriveIden)]
enum Apps {
    Table,
    Id,
}
