//! `SeaORM` entity for the account_catalogs table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "account_catalogs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub version: String,
    pub effective_from: Date,
    pub effective_to: Option<Date>,
    #[sea_orm(column_type = "JsonBinary")]
    pub regions: Json,
    #[sea_orm(column_type = "JsonBinary")]
    pub accounts: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
