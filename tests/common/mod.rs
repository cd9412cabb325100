#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use exchangedata::entities::{
    currencies, exchangers, markets, order_books, price_vols, symbols, tickers, trades,
};
use exchangedata::models::market::{Currency, Exchanger, Market, Symbol};
use exchangedata::models::snapshot::{MarketRef, Snapshot, Trade};
use exchangedata::services::exchange::{
    ClientError, ExchangeClient, FrameReader, FrameWriter, RawMessage,
};
use exchangedata::services::recorder::{RecordError, RecordOutcome, SnapshotSink};
use exchangedata::services::store::{SeaOrmStore, Store, StoreError, StoreResult};
use exchangedata::services::supervisor::{signaled, SupervisorConfig};

/// Fresh in-memory SQLite database with all migrations applied
pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    // one connection, or every pooled connection gets its own empty database
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn at(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap()
}

/// LTC-BTC on "demo", all entities unresolved
pub fn demo_market() -> Market {
    Market::new(
        "LTC-BTC",
        Symbol::new(
            Currency::new("litecoin", "LTC"),
            Currency::new("bitcoin", "BTC"),
        ),
        Exchanger::new("demo"),
    )
}

/// Supervisor timings scaled down for tests; heartbeats effectively off
pub fn test_config() -> SupervisorConfig {
    SupervisorConfig {
        heartbeat_interval: Duration::from_secs(3600),
        reconnect_base_delay: Duration::from_millis(10),
        reconnect_max_delay: Duration::from_millis(40),
        drain_timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_secs(5),
    }
}

/// Polls `condition` until it holds, failing the test after five seconds
pub async fn eventually<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[derive(Debug, Clone)]
pub enum Read {
    Frame(RawMessage),
    Fail,
}

pub fn frame(text: &str) -> Read {
    Read::Frame(RawMessage::text(text))
}

#[derive(Debug, Clone, Default)]
pub struct Connection {
    pub reads: Vec<Read>,
    /// Every write on this connection fails
    pub fail_writes: bool,
    /// Reader never observes the close frame
    pub ignore_close: bool,
}

impl Connection {
    pub fn reads(reads: Vec<Read>) -> Self {
        Self {
            reads,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub enum Dial {
    Open(Connection),
    Fail,
    /// Dial never completes
    Hang,
}

/// In-process exchange whose connections follow a script.
///
/// Frames decode as: `trade:<order id>` -> one trade on market 1,
/// `noop` -> nothing to record, anything else -> decode error. Once a
/// connection's reads run out, the reader waits for the close frame.
pub struct ScriptedClient {
    name: String,
    dials: Mutex<VecDeque<Dial>>,
    markets: Vec<Market>,
    pub adopted: Mutex<Vec<Market>>,
    pub connects: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub writes: Arc<Mutex<Vec<RawMessage>>>,
}

impl ScriptedClient {
    pub fn new(name: &str, dials: Vec<Dial>) -> Self {
        Self {
            name: name.to_string(),
            dials: Mutex::new(dials.into()),
            markets: Vec::new(),
            adopted: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_markets(mut self, markets: Vec<Market>) -> Self {
        self.markets = markets;
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct ScriptedReader {
    reads: VecDeque<Read>,
    closed: watch::Receiver<bool>,
    ignore_close: bool,
}

#[async_trait]
impl FrameReader for ScriptedReader {
    async fn read_next(&mut self) -> Result<RawMessage, ClientError> {
        match self.reads.pop_front() {
            Some(Read::Frame(frame)) => Ok(frame),
            Some(Read::Fail) => Err(ClientError::Transport("scripted read failure".to_string())),
            None if self.ignore_close => std::future::pending().await,
            None => {
                signaled(&mut self.closed).await;
                Err(ClientError::Closed)
            }
        }
    }
}

pub struct ScriptedWriter {
    closed: watch::Sender<bool>,
    fail_writes: bool,
    closes: Arc<AtomicUsize>,
    writes: Arc<Mutex<Vec<RawMessage>>>,
}

#[async_trait]
impl FrameWriter for ScriptedWriter {
    async fn write_frame(&mut self, frame: RawMessage) -> Result<(), ClientError> {
        if self.fail_writes {
            return Err(ClientError::Transport("scripted write failure".to_string()));
        }
        self.writes.lock().push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.send_replace(true);
        Ok(())
    }
}

#[async_trait]
impl ExchangeClient for ScriptedClient {
    type Reader = ScriptedReader;
    type Writer = ScriptedWriter;

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(ScriptedReader, ScriptedWriter), ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let dial = self.dials.lock().pop_front().unwrap_or(Dial::Hang);
        match dial {
            Dial::Open(connection) => {
                let (tx, rx) = watch::channel(false);
                Ok((
                    ScriptedReader {
                        reads: connection.reads.into(),
                        closed: rx,
                        ignore_close: connection.ignore_close,
                    },
                    ScriptedWriter {
                        closed: tx,
                        fail_writes: connection.fail_writes,
                        closes: self.closes.clone(),
                        writes: self.writes.clone(),
                    },
                ))
            }
            Dial::Fail => Err(ClientError::Connect("scripted dial failure".to_string())),
            Dial::Hang => std::future::pending().await,
        }
    }

    fn keepalive(&self) -> RawMessage {
        RawMessage::text("ping")
    }

    fn decode(&self, frame: &RawMessage) -> Result<Vec<Snapshot>, ClientError> {
        let RawMessage::Text(text) = frame else {
            return Err(ClientError::Decode("binary frame".to_string()));
        };
        if text == "noop" {
            return Ok(Vec::new());
        }
        let Some(order_id) = text.strip_prefix("trade:") else {
            return Err(ClientError::Decode(format!("unexpected frame {text:?}")));
        };
        Ok(vec![Snapshot::Trade(Trade {
            market: MarketRef::Id(1),
            time: at(1_700_000_000_000),
            order_id: order_id.to_string(),
            side: "buy".to_string(),
            trade_type: "limit".to_string(),
            price: 1.0,
            amount: 1.0,
            total: 1.0,
        })])
    }

    async fn markets(&self) -> Result<Vec<Market>, ClientError> {
        Ok(self.markets.clone())
    }

    fn adopt_markets(&self, markets: Vec<Market>) {
        self.adopted.lock().extend(markets);
    }
}

/// Sink that keeps every snapshot it is given
#[derive(Default)]
pub struct CollectingSink {
    pub snapshots: Mutex<Vec<Snapshot>>,
}

impl CollectingSink {
    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn order_ids(&self) -> Vec<String> {
        self.snapshots
            .lock()
            .iter()
            .filter_map(|s| match s {
                Snapshot::Trade(t) => Some(t.order_id.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SnapshotSink for CollectingSink {
    async fn record(&self, snapshot: Snapshot) -> Result<RecordOutcome, RecordError> {
        let mut snapshots = self.snapshots.lock();
        snapshots.push(snapshot);
        Ok(RecordOutcome::Inserted(snapshots.len() as i32))
    }
}

/// Sink whose every write fails
#[derive(Default)]
pub struct FailingSink {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl SnapshotSink for FailingSink {
    async fn record(&self, _snapshot: Snapshot) -> Result<RecordOutcome, RecordError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(RecordError::UnknownMarket(1))
    }
}

/// Which `find_*` lookup a [`StaleReadStore`] should miss next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    Currency,
    Exchanger,
    Symbol,
    Market,
    PriceVol,
    Ticker,
    Trade,
    OrderBook,
}

/// Store whose armed lookups report "not found" once even though the row
/// exists, so the caller's insert collides with the unique index as if
/// another writer had won the race in between.
pub struct StaleReadStore {
    inner: SeaOrmStore,
    stale: Mutex<HashSet<Lookup>>,
    conflicts: AtomicUsize,
}

impl StaleReadStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            inner: SeaOrmStore::new(db),
            stale: Mutex::new(HashSet::new()),
            conflicts: AtomicUsize::new(0),
        }
    }

    pub fn miss_next(&self, lookup: Lookup) {
        self.stale.lock().insert(lookup);
    }

    /// Inserts rejected by a unique index so far
    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }

    fn stale<T>(&self, lookup: Lookup, found: StoreResult<Option<T>>) -> StoreResult<Option<T>> {
        if self.stale.lock().remove(&lookup) {
            return Ok(None);
        }
        found
    }

    fn inserted<T>(&self, result: StoreResult<T>) -> StoreResult<T> {
        if matches!(result, Err(StoreError::Constraint(_))) {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

#[async_trait]
impl Store for StaleReadStore {
    async fn find_currency(&self, name: &str) -> StoreResult<Option<currencies::Model>> {
        let found = self.inner.find_currency(name).await;
        self.stale(Lookup::Currency, found)
    }

    async fn get_currency(&self, id: i32) -> StoreResult<Option<currencies::Model>> {
        self.inner.get_currency(id).await
    }

    async fn insert_currency(&self, row: &currencies::Model) -> StoreResult<i32> {
        let result = self.inner.insert_currency(row).await;
        self.inserted(result)
    }

    async fn update_currency_abbr(&self, id: i32, abbr: &str, finalize: bool) -> StoreResult<bool> {
        self.inner.update_currency_abbr(id, abbr, finalize).await
    }

    async fn find_exchanger(&self, name: &str) -> StoreResult<Option<exchangers::Model>> {
        let found = self.inner.find_exchanger(name).await;
        self.stale(Lookup::Exchanger, found)
    }

    async fn insert_exchanger(&self, row: &exchangers::Model) -> StoreResult<i32> {
        let result = self.inner.insert_exchanger(row).await;
        self.inserted(result)
    }

    async fn link_currency_exchanger(&self, currency_id: i32, exchanger_id: i32) -> StoreResult<()> {
        self.inner.link_currency_exchanger(currency_id, exchanger_id).await
    }

    async fn exchanger_currencies(&self, exchanger_id: i32) -> StoreResult<Vec<currencies::Model>> {
        self.inner.exchanger_currencies(exchanger_id).await
    }

    async fn find_symbol(&self, base_id: i32, quote_id: i32) -> StoreResult<Option<symbols::Model>> {
        let found = self.inner.find_symbol(base_id, quote_id).await;
        self.stale(Lookup::Symbol, found)
    }

    async fn get_symbol(&self, id: i32) -> StoreResult<Option<symbols::Model>> {
        self.inner.get_symbol(id).await
    }

    async fn insert_symbol(&self, base_id: i32, quote_id: i32) -> StoreResult<i32> {
        let result = self.inner.insert_symbol(base_id, quote_id).await;
        self.inserted(result)
    }

    async fn find_market(&self, name: &str, exchanger_id: i32) -> StoreResult<Option<markets::Model>> {
        let found = self.inner.find_market(name, exchanger_id).await;
        self.stale(Lookup::Market, found)
    }

    async fn get_market(&self, id: i32) -> StoreResult<Option<markets::Model>> {
        self.inner.get_market(id).await
    }

    async fn insert_market(&self, row: &markets::Model) -> StoreResult<i32> {
        let result = self.inner.insert_market(row).await;
        self.inserted(result)
    }

    async fn save_market(&self, row: &markets::Model) -> StoreResult<()> {
        self.inner.save_market(row).await
    }

    async fn find_price_vol(&self, price: f64, volume: f64) -> StoreResult<Option<price_vols::Model>> {
        let found = self.inner.find_price_vol(price, volume).await;
        self.stale(Lookup::PriceVol, found)
    }

    async fn insert_price_vol(&self, price: f64, volume: f64) -> StoreResult<i32> {
        let result = self.inner.insert_price_vol(price, volume).await;
        self.inserted(result)
    }

    async fn find_ticker(
        &self,
        market_id: i32,
        time: DateTime<Utc>,
    ) -> StoreResult<Option<tickers::Model>> {
        let found = self.inner.find_ticker(market_id, time).await;
        self.stale(Lookup::Ticker, found)
    }

    async fn insert_ticker(&self, row: &tickers::Model) -> StoreResult<i32> {
        let result = self.inner.insert_ticker(row).await;
        self.inserted(result)
    }

    async fn find_trade(&self, market_id: i32, order_id: &str) -> StoreResult<Option<trades::Model>> {
        let found = self.inner.find_trade(market_id, order_id).await;
        self.stale(Lookup::Trade, found)
    }

    async fn insert_trade(&self, row: &trades::Model) -> StoreResult<i32> {
        let result = self.inner.insert_trade(row).await;
        self.inserted(result)
    }

    async fn find_order_book(
        &self,
        market_id: i32,
        time: DateTime<Utc>,
    ) -> StoreResult<Option<order_books::Model>> {
        let found = self.inner.find_order_book(market_id, time).await;
        self.stale(Lookup::OrderBook, found)
    }

    async fn insert_order_book(
        &self,
        market_id: i32,
        time: DateTime<Utc>,
        bid_ids: &[i32],
        ask_ids: &[i32],
    ) -> StoreResult<i32> {
        let result = self.inner.insert_order_book(market_id, time, bid_ids, ask_ids).await;
        self.inserted(result)
    }

    async fn order_book_levels(
        &self,
        order_book_id: i32,
    ) -> StoreResult<(Vec<price_vols::Model>, Vec<price_vols::Model>)> {
        self.inner.order_book_levels(order_book_id).await
    }
}
