//! Timestamped observations from an exchange feed.

use chrono::{DateTime, Utc};

use super::market::Market;

/// How a snapshot names its market: a stored id, or an embedded (possibly
/// unresolved) market object.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketRef {
    Id(i32),
    Market(Box<Market>),
}

impl From<i32> for MarketRef {
    fn from(id: i32) -> Self {
        MarketRef::Id(id)
    }
}

impl From<Market> for MarketRef {
    fn from(market: Market) -> Self {
        MarketRef::Market(Box::new(market))
    }
}

/// One (price, volume) order book level
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PriceVol {
    pub id: Option<i32>,
    pub price: f64,
    pub volume: f64,
}

impl PriceVol {
    pub fn new(price: f64, volume: f64) -> Self {
        Self {
            id: None,
            price,
            volume,
        }
    }
}

/// Ticker values; any field a feed does not report stays zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickerValues {
    pub high: f64,
    pub low: f64,
    pub bid: f64,
    pub bid_volume: f64,
    pub ask: f64,
    pub ask_volume: f64,
    pub last: f64,
    pub previous_close: f64,
    pub change: f64,
    pub percentage: f64,
    pub average: f64,
    pub base_volume: f64,
    pub quote_volume: f64,
    pub open: f64,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub market: MarketRef,
    pub time: DateTime<Utc>,
    pub values: TickerValues,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub market: MarketRef,
    pub time: DateTime<Utc>,
    /// Exchange-assigned, opaque
    pub order_id: String,
    pub side: String,
    pub trade_type: String,
    pub price: f64,
    pub amount: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBook {
    pub market: MarketRef,
    pub time: DateTime<Utc>,
    /// Kept in feed order; sorting is the producer's job
    pub bids: Vec<PriceVol>,
    pub asks: Vec<PriceVol>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Ticker(Ticker),
    Trade(Trade),
    OrderBook(OrderBook),
}

impl Snapshot {
    pub fn kind(&self) -> &'static str {
        match self {
            Snapshot::Ticker(_) => "ticker",
            Snapshot::Trade(_) => "trade",
            Snapshot::OrderBook(_) => "order_book",
        }
    }

    pub fn market(&self) -> &MarketRef {
        match self {
            Snapshot::Ticker(t) => &t.market,
            Snapshot::Trade(t) => &t.market,
            Snapshot::OrderBook(o) => &o.market,
        }
    }
}

impl From<Ticker> for Snapshot {
    fn from(ticker: Ticker) -> Self {
        Snapshot::Ticker(ticker)
    }
}

impl From<Trade> for Snapshot {
    fn from(trade: Trade) -> Self {
        Snapshot::Trade(trade)
    }
}

impl From<OrderBook> for Snapshot {
    fn from(book: OrderBook) -> Self {
        Snapshot::OrderBook(book)
    }
}
