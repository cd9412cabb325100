//! `SeaORM` Entity for order_book_bids table
//!
//! Ordered references from an order book into `price_vols`.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "order_book_bids")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub order_book_id: i32,
    /// Zero-based level index, in feed order
    #[sea_orm(primary_key, auto_increment = false)]
    pub position: i32,
    pub price_vol_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order_books::Entity",
        from = "Column::OrderBookId",
        to = "super::order_books::Column::Id"
    )]
    OrderBook,
    #[sea_orm(
        belongs_to = "super::price_vols::Entity",
        from = "Column::PriceVolId",
        to = "super::price_vols::Column::Id"
    )]
    PriceVol,
}

impl Related<super::order_books::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderBook.def()
    }
}

impl Related<super::price_vols::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PriceVol.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
