//! `SeaORM` Entity for symbols table
//!
//! A traded pair; (base_id, quote_id) is ordered and unique.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "symbols")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub base_id: i32,
    pub quote_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::currencies::Entity",
        from = "Column::BaseId",
        to = "super::currencies::Column::Id"
    )]
    Base,
    #[sea_orm(
        belongs_to = "super::currencies::Entity",
        from = "Column::QuoteId",
        to = "super::currencies::Column::Id"
    )]
    Quote,
    #[sea_orm(has_many = "super::markets::Entity")]
    Markets,
}

impl Related<super::markets::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Markets.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
