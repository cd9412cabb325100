//! Market-Data Recorder
//!
//! Persists decoded snapshots at most once per natural key: (market, time) for
//! tickers and order books, (market, order id) for trades. A repeat
//! observation of the same key leaves the first row untouched.

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::entities::{tickers, trades};
use crate::models::snapshot::{MarketRef, OrderBook, Snapshot, Ticker, Trade};
use crate::services::resolver::{EntityResolver, ResolveError};
use crate::services::store::{Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("unknown market id {0}")]
    UnknownMarket(i32),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new row was written
    Inserted(i32),
    /// A row already existed under the same key and was left as is
    Duplicate(i32),
}

impl RecordOutcome {
    pub fn id(&self) -> i32 {
        match self {
            RecordOutcome::Inserted(id) | RecordOutcome::Duplicate(id) => *id,
        }
    }
}

/// Where a supervisor hands decoded snapshots
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn record(&self, snapshot: Snapshot) -> Result<RecordOutcome, RecordError>;
}

#[derive(Clone)]
pub struct MarketDataRecorder {
    store: Arc<dyn Store>,
    resolver: EntityResolver,
}

impl MarketDataRecorder {
    pub fn new(resolver: EntityResolver) -> Self {
        Self {
            store: resolver.store().clone(),
            resolver,
        }
    }

    pub async fn record_ticker(&self, ticker: Ticker) -> Result<RecordOutcome, RecordError> {
        let market_id = self.market_id(ticker.market).await?;
        let time = ticker.time.trunc_subsecs(6);

        if let Some(existing) = self.store.find_ticker(market_id, time).await? {
            trace!(market_id, %time, "Ticker already recorded");
            return Ok(RecordOutcome::Duplicate(existing.id));
        }

        let v = ticker.values;
        let row = tickers::Model {
            id: 0,
            time,
            market_id,
            high: v.high,
            low: v.low,
            bid: v.bid,
            bid_volume: v.bid_volume,
            ask: v.ask,
            ask_volume: v.ask_volume,
            last: v.last,
            previous_close: v.previous_close,
            change: v.change,
            percentage: v.percentage,
            average: v.average,
            base_volume: v.base_volume,
            quote_volume: v.quote_volume,
            open: v.open,
            close: v.close,
        };

        match self.store.insert_ticker(&row).await {
            Ok(id) => Ok(RecordOutcome::Inserted(id)),
            Err(StoreError::Constraint(msg)) => {
                let existing = self
                    .store
                    .find_ticker(market_id, time)
                    .await?
                    .ok_or(StoreError::Constraint(msg))?;
                Ok(RecordOutcome::Duplicate(existing.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn record_trade(&self, trade: Trade) -> Result<RecordOutcome, RecordError> {
        let market_id = self.market_id(trade.market).await?;

        if let Some(existing) = self.store.find_trade(market_id, &trade.order_id).await? {
            trace!(market_id, order_id = %trade.order_id, "Trade already recorded");
            return Ok(RecordOutcome::Duplicate(existing.id));
        }

        let row = trades::Model {
            id: 0,
            time: trade.time.trunc_subsecs(6),
            market_id,
            order_id: trade.order_id,
            trade_type: trade.trade_type,
            side: trade.side,
            price: trade.price,
            amount: trade.amount,
            total: trade.total,
        };

        match self.store.insert_trade(&row).await {
            Ok(id) => Ok(RecordOutcome::Inserted(id)),
            Err(StoreError::Constraint(msg)) => {
                let existing = self
                    .store
                    .find_trade(market_id, &row.order_id)
                    .await?
                    .ok_or(StoreError::Constraint(msg))?;
                Ok(RecordOutcome::Duplicate(existing.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Every level is resolved to a shared price/volume row, in feed order,
    /// before the book row is written.
    pub async fn record_order_book(&self, book: OrderBook) -> Result<RecordOutcome, RecordError> {
        let market_id = self.market_id(book.market).await?;
        let time = book.time.trunc_subsecs(6);

        if let Some(existing) = self.existing_order_book(market_id, time).await? {
            return Ok(RecordOutcome::Duplicate(existing));
        }

        let mut bid_ids = Vec::with_capacity(book.bids.len());
        for level in book.bids {
            let resolved = self.resolver.resolve_price_vol(level).await?;
            bid_ids.extend(resolved.id);
        }
        let mut ask_ids = Vec::with_capacity(book.asks.len());
        for level in book.asks {
            let resolved = self.resolver.resolve_price_vol(level).await?;
            ask_ids.extend(resolved.id);
        }

        match self
            .store
            .insert_order_book(market_id, time, &bid_ids, &ask_ids)
            .await
        {
            Ok(id) => {
                debug!(market_id, bids = bid_ids.len(), asks = ask_ids.len(), "Recorded order book");
                Ok(RecordOutcome::Inserted(id))
            }
            Err(StoreError::Constraint(msg)) => {
                let existing = self
                    .existing_order_book(market_id, time)
                    .await?
                    .ok_or(StoreError::Constraint(msg))?;
                Ok(RecordOutcome::Duplicate(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn existing_market(&self, id: i32) -> Result<i32, RecordError> {
        match self.store.get_market(id).await? {
            Some(stored) => Ok(stored.id),
            None => Err(RecordError::UnknownMarket(id)),
        }
    }

    async fn existing_order_book(
        &self,
        market_id: i32,
        time: DateTime<Utc>,
    ) -> Result<Option<i32>, StoreError> {
        Ok(self
            .store
            .find_order_book(market_id, time)
            .await?
            .map(|book| book.id))
    }

    /// Any market id, bare or embedded, must name an existing market; an
    /// embedded market without an id is resolved.
    async fn market_id(&self, market: MarketRef) -> Result<i32, RecordError> {
        match market {
            MarketRef::Id(id) => self.existing_market(id).await,
            MarketRef::Market(market) => match market.id {
                Some(id) => self.existing_market(id).await,
                None => {
                    let resolved = self.resolver.resolve_market(*market).await?;
                    resolved.id.ok_or_else(|| {
                        RecordError::Resolve(ResolveError::InvalidEntity(
                            "market was not resolved".to_string(),
                        ))
                    })
                }
            },
        }
    }
}

#[async_trait]
impl SnapshotSink for MarketDataRecorder {
    async fn record(&self, snapshot: Snapshot) -> Result<RecordOutcome, RecordError> {
        match snapshot {
            Snapshot::Ticker(ticker) => self.record_ticker(ticker).await,
            Snapshot::Trade(trade) => self.record_trade(trade).await,
            Snapshot::OrderBook(book) => self.record_order_book(book).await,
        }
    }
}
