use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tickers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tickers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Tickers::Time)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Tickers::MarketId).integer().not_null())
                    .col(price_col(Tickers::High))
                    .col(price_col(Tickers::Low))
                    .col(price_col(Tickers::Bid))
                    .col(price_col(Tickers::BidVolume))
                    .col(price_col(Tickers::Ask))
                    .col(price_col(Tickers::AskVolume))
                    .col(price_col(Tickers::Last))
                    .col(price_col(Tickers::PreviousClose))
                    .col(price_col(Tickers::Change))
                    .col(price_col(Tickers::Percentage))
                    .col(price_col(Tickers::Average))
                    .col(price_col(Tickers::BaseVolume))
                    .col(price_col(Tickers::QuoteVolume))
                    .col(price_col(Tickers::Open))
                    .col(price_col(Tickers::Close))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_tickers_market_id")
                            .from(Tickers::Table, Tickers::MarketId)
                            .to(Markets::Table, Markets::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tickers_market_time")
                    .table(Tickers::Table)
                    .col(Tickers::MarketId)
                    .col(Tickers::Time)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Trades::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Trades::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Trades::Time)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Trades::MarketId).integer().not_null())
                    .col(ColumnDef::new(Trades::OrderId).string_len(128).not_null())
                    .col(
                        ColumnDef::new(Trades::TradeType)
                            .string_len(32)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Trades::Side)
                            .string_len(16)
                            .not_null()
                            .default(""),
                    )
                    .col(price_col(Trades::Price))
                    .col(price_col(Trades::Amount))
                    .col(price_col(Trades::Total))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trades_market_id")
                            .from(Trades::Table, Trades::MarketId)
                            .to(Markets::Table, Markets::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_trades_market_order")
                    .table(Trades::Table)
                    .col(Trades::MarketId)
                    .col(Trades::OrderId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Trades::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tickers::Table).to_owned())
            .await
    }
}

/// Numeric snapshot field; absent values are stored as zero
fn price_col<T: IntoIden>(name: T) -> ColumnDef {
    ColumnDef::new(name)
        .double()
        .not_null()
        .default(0.0)
        .to_owned()
}

#[derive(DeriveIden)]
enum Markets {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Tickers {
    Table,
    Id,
    Time,
    MarketId,
    High,
    Low,
    Bid,
    BidVolume,
    Ask,
    AskVolume,
    Last,
    PreviousClose,
    Change,
    Percentage,
    Average,
    BaseVolume,
    QuoteVolume,
    Open,
    Close,
}

#[derive(DeriveIden)]
enum Trades {
    Table,
    Id,
    Time,
    MarketId,
    OrderId,
    TradeType,
    Side,
    Price,
    Amount,
    Total,
}
