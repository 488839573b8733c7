pub use sea_orm_migration::prelude::*;

mod m20241001_000001_create_users_table;
mod m20241001_000002_create_storage_configuration_table;
mod m20241001_000003_create_apps_table;
mod m20241001_000004_create_files_table;
mod m20241001_000005_create_api_keys_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20241001_000001_create_users_table::Migration),
            Box::new(m20241001_000002_create_storage_configuration_table::Migration),
            Box::new(m20241001_000003_create_apps_table::Migration),
            Box::new(m20241001_000004_create_files_table::Migration),
            Box::new(m20241001_000005_create_api_keys_table::Migration),
        ]
    }
}
