//! `SeaORM` Entity for markets table
//!
//! Unique on (name, exchanger_id).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "markets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Display name as reported by the exchanger, e.g. "LTC-BTC"
    pub name: String,
    pub symbol_id: i32,
    pub exchanger_id: i32,
    pub active: bool,
    pub info: String,
    /// Decimal places
    pub precision: i32,
    /// Minimum tradable amount
    pub amount_min: f64,
    /// Maximum tradable amount
    pub amount_max: f64,
    /// Smallest price increment
    pub min_step: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::symbols::Entity",
        from = "Column::SymbolId",
        to = "super::symbols::Column::Id"
    )]
    Symbol,
    #[sea_orm(
        belongs_to = "super::exchangers::Entity",
        from = "Column::ExchangerId",
        to = "super::exchangers::Column::Id"
    )]
    Exchanger,
    #[sea_orm(has_many = "super::tickers::Entity")]
    Tickers,
    #[sea_orm(has_many = "super::trades::Entity")]
    Trades,
    #[sea_orm(has_many = "super::order_books::Entity")]
    OrderBooks,
}

impl Related<super::symbols::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Symbol.def()
    }
}

impl Related<super::exchangers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Exchanger.def()
    }
}

impl Related<super::tickers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tickers.def()
    }
}

impl Related<super::trades::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Trades.def()
    }
}

impl Related<super::order_books::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderBooks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
