use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account row written by the sign-in flow; the core only reads it.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: Option<String>,
    #[sea_orm(unique)]
    pub email: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::app::Entity")]
    App,
    #[sea_orm(has_many = "super::storage_configuration::Entity")]
    StorageConfiguration,
}

impl Related<super::app::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::App.def()
    }
}

impl Related<super::storage_configuration::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StorageConfiguration.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
