//! `SeaORM` Entity for currencies table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "currencies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Lower-cased, trimmed long name (natural key)
    #[sea_orm(unique)]
    pub name: String,
    /// Short code, e.g. "BTC"
    pub abbr: String,
    /// When true, `abbr` is authoritative and feeds cannot change it
    pub abbr_final: bool,
    pub info: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::currency_exchangers::Entity")]
    CurrencyExchangers,
}

impl Related<super::currency_exchangers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CurrencyExchangers.def()
    }
}

impl Related<super::exchangers::Entity> for Entity {
    fn to() -> RelationDef {
        super::currency_exchangers::Relation::Exchanger.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::currency_exchangers::Relation::Currency.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
