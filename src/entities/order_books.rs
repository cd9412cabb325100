//! `SeaORM` Entity for order_books table
//!
//! Levels live in `order_book_bids` / `order_book_asks`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "order_books")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub time: DateTimeUtc,
    pub market_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::markets::Entity",
        from = "Column::MarketId",
        to = "super::markets::Column::Id"
    )]
    Market,
    #[sea_orm(has_many = "super::order_book_bids::Entity")]
    Bids,
    #[sea_orm(has_many = "super::order_book_asks::Entity")]
    Asks,
}

impl Related<super::markets::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Market.def()
    }
}

impl Related<super::order_book_bids::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bids.def()
    }
}

impl Related<super::order_book_asks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Asks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
