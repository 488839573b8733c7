use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Apps::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Apps::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Apps::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Apps::Description).string_len(500))
                    .col(ColumnDef::new(Apps::UserId).string().not_null())
                    .col(ColumnDef::new(Apps::StorageId).integer())
                    .col(ColumnDef::new(Apps::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Apps::DeletedAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_apps_user_id")
                            .from(Apps::Table, Apps::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_apps_storage_id")
                            .from(Apps::Table, Apps::StorageId)
                            .to(StorageConfiguration::Table, StorageConfiguration::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Apps::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Apps {
    Table,
    Id,
    Name,
    Description,
    UserId,
    StorageId,
    CreatedAt,
    DeletedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum StorageConfiguration {
    #[sea_orm(iden = "storageConfiguration")]
    Table,
    Id,
}
