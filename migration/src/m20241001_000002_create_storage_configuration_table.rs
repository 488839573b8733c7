use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StorageConfiguration::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StorageConfiguration::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StorageConfiguration::Name).string_len(100).not_null())
                    .col(ColumnDef::new(StorageConfiguration::UserId).string().not_null())
                    .col(ColumnDef::new(StorageConfiguration::Configuration).json().not_null())
                    .col(ColumnDef::new(StorageConfiguration::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(StorageConfiguration::DeletedAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_storage_configuration_user_id")
                            .from(StorageConfiguration::Table, StorageConfiguration::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StorageConfiguration::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StorageConfiguration {
    #[sea_orm(iden = "storageConfiguration")]
    Table,
    Id,
    Name,
    UserId,
    Configuration,
    CreatedAt,
    DeletedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
