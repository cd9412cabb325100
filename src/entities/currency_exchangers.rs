//! `SeaORM` Entity for currency_exchangers join table

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "currency_exchangers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub currency_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub exchanger_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::currencies::Entity",
        from = "Column::CurrencyId",
        to = "super::currencies::Column::Id"
    )]
    Currency,
    #[sea_orm(
        belongs_to = "super::exchangers::Entity",
        from = "Column::ExchangerId",
        to = "super::exchangers::Column::Id"
    )]
    Exchanger,
}

impl Related<super::currencies::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Currency.def()
    }
}

impl Related<super::exchangers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Exchanger.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
