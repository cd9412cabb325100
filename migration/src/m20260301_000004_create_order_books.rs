use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Content-addressed price levels, shared by every order book carrying them
        manager
            .create_table(
                Table::create()
                    .table(PriceVols::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PriceVols::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PriceVols::Price).double().not_null())
                    .col(ColumnDef::new(PriceVols::Volume).double().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_price_vols_price_volume")
                    .table(PriceVols::Table)
                    .col(PriceVols::Price)
                    .col(PriceVols::Volume)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrderBooks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderBooks::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OrderBooks::Time)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OrderBooks::MarketId).integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_books_market_id")
                            .from(OrderBooks::Table, OrderBooks::MarketId)
                            .to(Markets::Table, Markets::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_order_books_market_time")
                    .table(OrderBooks::Table)
                    .col(OrderBooks::MarketId)
                    .col(OrderBooks::Time)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(level_table(OrderBookBids::Table, "order_book_bids"))
            .await?;
        manager
            .create_table(level_table(OrderBookAsks::Table, "order_book_asks"))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OrderBookAsks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OrderBookBids::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OrderBooks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PriceVols::Table).to_owned())
            .await
    }
}

/// Ordered reference list from one side of an order book into `price_vols`.
/// `position` keeps the feed's level order.
fn level_table<T: IntoIden + Clone + 'static>(table: T, prefix: &str) -> TableCreateStatement {
    Table::create()
        .table(table.clone())
        .if_not_exists()
        .col(ColumnDef::new(Level::OrderBookId).integer().not_null())
        .col(ColumnDef::new(Level::Position).integer().not_null())
        .col(ColumnDef::new(Level::PriceVolId).integer().not_null())
        .primary_key(Index::create().col(Level::OrderBookId).col(Level::Position))
        .foreign_key(
            ForeignKey::create()
                .name(format!("fk_{prefix}_order_book_id"))
                .from(table.clone(), Level::OrderBookId)
                .to(OrderBooks::Table, OrderBooks::Id),
        )
        .foreign_key(
            ForeignKey::create()
                .name(format!("fk_{prefix}_price_vol_id"))
                .from(table, Level::PriceVolId)
                .to(PriceVols::Table, PriceVols::Id),
        )
        .to_owned()
}

#[derive(DeriveIden)]
enum Markets {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum PriceVols {
    Table,
    Id,
    Price,
    Volume,
}

#[derive(DeriveIden)]
enum OrderBooks {
    Table,
    Id,
    Time,
    MarketId,
}

#[derive(DeriveIden, Clone)]
enum OrderBookBids {
    Table,
}

#[derive(DeriveIden, Clone)]
enum OrderBookAsks {
    Table,
}

#[derive(DeriveIden)]
enum Level {
    OrderBookId,
    Position,
    PriceVolId,
}
