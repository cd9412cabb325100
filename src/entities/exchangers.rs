//! `SeaORM` Entity for exchangers table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "exchangers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub info: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::markets::Entity")]
    Markets,
    #[sea_orm(has_many = "super::currency_exchangers::Entity")]
    CurrencyExchangers,
}

impl Related<super::markets::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Markets.def()
    }
}

impl Related<super::currencies::Entity> for Entity {
    fn to() -> RelationDef {
        super::currency_exchangers::Relation::Currency.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::currency_exchangers::Relation::Exchanger.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
