//! Persistence port
//!
//! Typed find / insert / save operations per entity kind. The storage layer
//! enforces uniqueness on every natural key; a lost insert race surfaces as
//! `StoreError::Constraint` so callers can re-read instead of failing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use tracing::warn;

use crate::entities::{
    currencies, currency_exchangers, exchangers, markets, order_book_asks, order_book_bids,
    order_books, price_vols, symbols, tickers, trades, prelude::*,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A row with the same natural key already exists
    #[error("unique constraint violated: {0}")]
    Constraint(String),
    #[error("database error: {0}")]
    Database(DbErr),
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) => StoreError::Constraint(msg),
            _ => StoreError::Database(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Rows go in and come out as entity models; the `id` of a model passed to an
/// `insert_*` method is ignored.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_currency(&self, name: &str) -> StoreResult<Option<currencies::Model>>;
    async fn get_currency(&self, id: i32) -> StoreResult<Option<currencies::Model>>;
    async fn insert_currency(&self, row: &currencies::Model) -> StoreResult<i32>;
    /// Overwrites `abbr` (and optionally locks it) unless the stored row is
    /// already locked. Returns whether a row changed.
    async fn update_currency_abbr(&self, id: i32, abbr: &str, finalize: bool)
        -> StoreResult<bool>;

    async fn find_exchanger(&self, name: &str) -> StoreResult<Option<exchangers::Model>>;
    async fn insert_exchanger(&self, row: &exchangers::Model) -> StoreResult<i32>;
    /// Idempotent many-to-many link
    async fn link_currency_exchanger(&self, currency_id: i32, exchanger_id: i32)
        -> StoreResult<()>;
    async fn exchanger_currencies(&self, exchanger_id: i32) -> StoreResult<Vec<currencies::Model>>;

    async fn find_symbol(&self, base_id: i32, quote_id: i32) -> StoreResult<Option<symbols::Model>>;
    async fn get_symbol(&self, id: i32) -> StoreResult<Option<symbols::Model>>;
    async fn insert_symbol(&self, base_id: i32, quote_id: i32) -> StoreResult<i32>;

    async fn find_market(&self, name: &str, exchanger_id: i32)
        -> StoreResult<Option<markets::Model>>;
    async fn get_market(&self, id: i32) -> StoreResult<Option<markets::Model>>;
    async fn insert_market(&self, row: &markets::Model) -> StoreResult<i32>;
    async fn save_market(&self, row: &markets::Model) -> StoreResult<()>;

    async fn find_price_vol(&self, price: f64, volume: f64) -> StoreResult<Option<price_vols::Model>>;
    async fn insert_price_vol(&self, price: f64, volume: f64) -> StoreResult<i32>;

    async fn find_ticker(&self, market_id: i32, time: DateTime<Utc>)
        -> StoreResult<Option<tickers::Model>>;
    async fn insert_ticker(&self, row: &tickers::Model) -> StoreResult<i32>;

    async fn find_trade(&self, market_id: i32, order_id: &str) -> StoreResult<Option<trades::Model>>;
    async fn insert_trade(&self, row: &trades::Model) -> StoreResult<i32>;

    async fn find_order_book(&self, market_id: i32, time: DateTime<Utc>)
        -> StoreResult<Option<order_books::Model>>;
    /// Writes the book row and its ordered level references atomically
    async fn insert_order_book(
        &self,
        market_id: i32,
        time: DateTime<Utc>,
        bid_ids: &[i32],
        ask_ids: &[i32],
    ) -> StoreResult<i32>;
    /// (bids, asks) in stored order
    async fn order_book_levels(
        &self,
        order_book_id: i32,
    ) -> StoreResult<(Vec<price_vols::Model>, Vec<price_vols::Model>)>;
}

/// `Store` backed by a sea-orm connection
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl Store for SeaOrmStore {
    async fn find_currency(&self, name: &str) -> StoreResult<Option<currencies::Model>> {
        Ok(Currencies::find()
            .filter(currencies::Column::Name.eq(name))
            .one(&self.db)
            .await?)
    }

    async fn get_currency(&self, id: i32) -> StoreResult<Option<currencies::Model>> {
        Ok(Currencies::find_by_id(id).one(&self.db).await?)
    }

    async fn insert_currency(&self, row: &currencies::Model) -> StoreResult<i32> {
        let model = currencies::ActiveModel {
            name: Set(row.name.clone()),
            abbr: Set(row.abbr.clone()),
            abbr_final: Set(row.abbr_final),
            info: Set(row.info.clone()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(model.id)
    }

    async fn update_currency_abbr(
        &self,
        id: i32,
        abbr: &str,
        finalize: bool,
    ) -> StoreResult<bool> {
        // The abbr_final filter makes the lock check and the write one statement
        let mut update = Currencies::update_many()
            .col_expr(currencies::Column::Abbr, Expr::value(abbr.to_string()))
            .filter(currencies::Column::Id.eq(id))
            .filter(currencies::Column::AbbrFinal.eq(false));
        if finalize {
            update = update.col_expr(currencies::Column::AbbrFinal, Expr::value(true));
        }
        let result = update.exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    async fn find_exchanger(&self, name: &str) -> StoreResult<Option<exchangers::Model>> {
        Ok(Exchangers::find()
            .filter(exchangers::Column::Name.eq(name))
            .one(&self.db)
            .await?)
    }

    async fn insert_exchanger(&self, row: &exchangers::Model) -> StoreResult<i32> {
        let model = exchangers::ActiveModel {
            name: Set(row.name.clone()),
            info: Set(row.info.clone()),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(model.id)
    }

    async fn link_currency_exchanger(
        &self,
        currency_id: i32,
        exchanger_id: i32,
    ) -> StoreResult<()> {
        let existing = CurrencyExchangers::find_by_id((currency_id, exchanger_id))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        let link = currency_exchangers::ActiveModel {
            currency_id: Set(currency_id),
            exchanger_id: Set(exchanger_id),
        };
        match CurrencyExchangers::insert(link)
            .exec_without_returning(&self.db)
            .await
            .map_err(StoreError::from)
        {
            Ok(_) | Err(StoreError::Constraint(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn exchanger_currencies(&self, exchanger_id: i32) -> StoreResult<Vec<currencies::Model>> {
        let links = CurrencyExchangers::find()
            .filter(currency_exchangers::Column::ExchangerId.eq(exchanger_id))
            .all(&self.db)
            .await?;
        let ids: Vec<i32> = links.into_iter().map(|l| l.currency_id).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(Currencies::find()
            .filter(currencies::Column::Id.is_in(ids))
            .order_by_asc(currencies::Column::Name)
            .all(&self.db)
            .await?)
    }

    async fn find_symbol(&self, base_id: i32, quote_id: i32) -> StoreResult<Option<symbols::Model>> {
        Ok(Symbols::find()
            .filter(symbols::Column::BaseId.eq(base_id))
            .filter(symbols::Column::QuoteId.eq(quote_id))
            .one(&self.db)
            .await?)
    }

    async fn get_symbol(&self, id: i32) -> StoreResult<Option<symbols::Model>> {
        Ok(Symbols::find_by_id(id).one(&self.db).await?)
    }

    async fn insert_symbol(&self, base_id: i32, quote_id: i32) -> StoreResult<i32> {
        let model = symbols::ActiveModel {
            base_id: Set(base_id),
            quote_id: Set(quote_id),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(model.id)
    }

    async fn find_market(
        &self,
        name: &str,
        exchanger_id: i32,
    ) -> StoreResult<Option<markets::Model>> {
        Ok(Markets::find()
            .filter(markets::Column::Name.eq(name))
            .filter(markets::Column::ExchangerId.eq(exchanger_id))
            .one(&self.db)
            .await?)
    }

    async fn get_market(&self, id: i32) -> StoreResult<Option<markets::Model>> {
        Ok(Markets::find_by_id(id).one(&self.db).await?)
    }

    async fn insert_market(&self, row: &markets::Model) -> StoreResult<i32> {
        let model = markets::ActiveModel {
            name: Set(row.name.clone()),
            symbol_id: Set(row.symbol_id),
            exchanger_id: Set(row.exchanger_id),
            active: Set(row.active),
            info: Set(row.info.clone()),
            precision: Set(row.precision),
            amount_min: Set(row.amount_min),
            amount_max: Set(row.amount_max),
            min_step: Set(row.min_step),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(model.id)
    }

    async fn save_market(&self, row: &markets::Model) -> StoreResult<()> {
        markets::ActiveModel {
            id: Set(row.id),
            name: Set(row.name.clone()),
            symbol_id: Set(row.symbol_id),
            exchanger_id: Set(row.exchanger_id),
            active: Set(row.active),
            info: Set(row.info.clone()),
            precision: Set(row.precision),
            amount_min: Set(row.amount_min),
            amount_max: Set(row.amount_max),
            min_step: Set(row.min_step),
        }
        .update(&self.db)
        .await?;
        Ok(())
    }

    async fn find_price_vol(&self, price: f64, volume: f64) -> StoreResult<Option<price_vols::Model>> {
        Ok(PriceVols::find()
            .filter(price_vols::Column::Price.eq(price))
            .filter(price_vols::Column::Volume.eq(volume))
            .one(&self.db)
            .await?)
    }

    async fn insert_price_vol(&self, price: f64, volume: f64) -> StoreResult<i32> {
        let model = price_vols::ActiveModel {
            price: Set(price),
            volume: Set(volume),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(model.id)
    }

    async fn find_ticker(
        &self,
        market_id: i32,
        time: DateTime<Utc>,
    ) -> StoreResult<Option<tickers::Model>> {
        Ok(Tickers::find()
            .filter(tickers::Column::MarketId.eq(market_id))
            .filter(tickers::Column::Time.eq(time))
            .one(&self.db)
            .await?)
    }

    async fn insert_ticker(&self, row: &tickers::Model) -> StoreResult<i32> {
        let model = tickers::ActiveModel {
            time: Set(row.time),
            market_id: Set(row.market_id),
            high: Set(row.high),
            low: Set(row.low),
            bid: Set(row.bid),
            bid_volume: Set(row.bid_volume),
            ask: Set(row.ask),
            ask_volume: Set(row.ask_volume),
            last: Set(row.last),
            previous_close: Set(row.previous_close),
            change: Set(row.change),
            percentage: Set(row.percentage),
            average: Set(row.average),
            base_volume: Set(row.base_volume),
            quote_volume: Set(row.quote_volume),
            open: Set(row.open),
            close: Set(row.close),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(model.id)
    }

    async fn find_trade(&self, market_id: i32, order_id: &str) -> StoreResult<Option<trades::Model>> {
        Ok(Trades::find()
            .filter(trades::Column::MarketId.eq(market_id))
            .filter(trades::Column::OrderId.eq(order_id))
            .one(&self.db)
            .await?)
    }

    async fn insert_trade(&self, row: &trades::Model) -> StoreResult<i32> {
        let model = trades::ActiveModel {
            time: Set(row.time),
            market_id: Set(row.market_id),
            order_id: Set(row.order_id.clone()),
            trade_type: Set(row.trade_type.clone()),
            side: Set(row.side.clone()),
            price: Set(row.price),
            amount: Set(row.amount),
            total: Set(row.total),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        Ok(model.id)
    }

    async fn find_order_book(
        &self,
        market_id: i32,
        time: DateTime<Utc>,
    ) -> StoreResult<Option<order_books::Model>> {
        Ok(OrderBooks::find()
            .filter(order_books::Column::MarketId.eq(market_id))
            .filter(order_books::Column::Time.eq(time))
            .one(&self.db)
            .await?)
    }

    async fn insert_order_book(
        &self,
        market_id: i32,
        time: DateTime<Utc>,
        bid_ids: &[i32],
        ask_ids: &[i32],
    ) -> StoreResult<i32> {
        let txn = self.db.begin().await?;
        match write_order_book(&txn, market_id, time, bid_ids, ask_ids).await {
            Ok(id) => {
                txn.commit().await?;
                Ok(id)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    warn!(market_id, error = %rollback, "Order book rollback failed");
                }
                Err(e.into())
            }
        }
    }

    async fn order_book_levels(
        &self,
        order_book_id: i32,
    ) -> StoreResult<(Vec<price_vols::Model>, Vec<price_vols::Model>)> {
        let bids = OrderBookBids::find()
            .filter(order_book_bids::Column::OrderBookId.eq(order_book_id))
            .order_by_asc(order_book_bids::Column::Position)
            .find_also_related(PriceVols)
            .all(&self.db)
            .await?
            .into_iter()
            .filter_map(|(_, level)| level)
            .collect();

        let asks = OrderBookAsks::find()
            .filter(order_book_asks::Column::OrderBookId.eq(order_book_id))
            .order_by_asc(order_book_asks::Column::Position)
            .find_also_related(PriceVols)
            .all(&self.db)
            .await?
            .into_iter()
            .filter_map(|(_, level)| level)
            .collect();

        Ok((bids, asks))
    }
}

async fn write_order_book(
    txn: &DatabaseTransaction,
    market_id: i32,
    time: DateTime<Utc>,
    bid_ids: &[i32],
    ask_ids: &[i32],
) -> Result<i32, DbErr> {
    let book = order_books::ActiveModel {
        time: Set(time),
        market_id: Set(market_id),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    if !bid_ids.is_empty() {
        let bids = bid_ids.iter().enumerate().map(|(position, id)| order_book_bids::ActiveModel {
            order_book_id: Set(book.id),
            position: Set(position as i32),
            price_vol_id: Set(*id),
        });
        OrderBookBids::insert_many(bids).exec_without_returning(txn).await?;
    }

    if !ask_ids.is_empty() {
        let asks = ask_ids.iter().enumerate().map(|(position, id)| order_book_asks::ActiveModel {
            order_book_id: Set(book.id),
            position: Set(position as i32),
            price_vol_id: Set(*id),
        });
        OrderBookAsks::insert_many(asks).exec_without_returning(txn).await?;
    }

    Ok(book.id)
}
