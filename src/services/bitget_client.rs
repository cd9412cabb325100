//! Bitget public spot feed
//!
//! Subscribes to the `ticker`, `trade` and `books15` channels for a fixed set
//! of instruments and decodes pushes into snapshots. Keepalive is the text
//! frame "ping", answered by "pong".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::models::market::{Currency, Exchanger, Limitation, Market, Symbol};
use crate::models::snapshot::{OrderBook, PriceVol, Snapshot, Ticker, TickerValues, Trade};
use crate::services::exchange::{ClientError, ExchangeClient, FrameReader, FrameWriter, RawMessage};

pub const BITGET_WS_URL: &str = "wss://ws.bitget.com/v2/ws/public";
pub const BITGET_REST_URL: &str = "https://api.bitget.com";
const EXCHANGER_NAME: &str = "bitget";
const CHANNELS: [&str; 3] = ["ticker", "trade", "books15"];

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Serialize)]
struct SubscribeMessage {
    op: String,
    args: Vec<SubscribeArg>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeArg {
    inst_type: String,
    channel: String,
    inst_id: String,
}

/// Event acks, errors and channel pushes all share this envelope
#[derive(Debug, Deserialize)]
struct WsFrame {
    event: Option<String>,
    code: Option<serde_json::Value>,
    msg: Option<String>,
    arg: Option<ChannelArg>,
    data: Option<Vec<serde_json::Value>>,
    ts: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelArg {
    channel: String,
    inst_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerData {
    last_pr: String,
    #[serde(default)]
    open24h: Option<String>,
    #[serde(default)]
    high24h: Option<String>,
    #[serde(default)]
    low24h: Option<String>,
    #[serde(default)]
    change24h: Option<String>,
    #[serde(default)]
    bid_pr: Option<String>,
    #[serde(default)]
    ask_pr: Option<String>,
    #[serde(default)]
    bid_sz: Option<String>,
    #[serde(default)]
    ask_sz: Option<String>,
    #[serde(default)]
    base_volume: Option<String>,
    #[serde(default)]
    quote_volume: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeData {
    ts: String,
    price: String,
    size: String,
    side: String,
    trade_id: String,
}

#[derive(Debug, Deserialize)]
struct BookData {
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SymbolsResponse {
    code: String,
    msg: String,
    data: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    base_coin: String,
    quote_coin: String,
    #[serde(default)]
    min_trade_amount: Option<String>,
    #[serde(default)]
    max_trade_amount: Option<String>,
    #[serde(default)]
    price_precision: Option<String>,
    status: String,
}

pub struct BitgetReader {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl FrameReader for BitgetReader {
    async fn read_next(&mut self) -> Result<RawMessage, ClientError> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => return Ok(RawMessage::Text(text)),
                Some(Ok(Message::Binary(bytes))) => return Ok(RawMessage::Binary(bytes)),
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Bitget sent close frame");
                    return Err(ClientError::Closed);
                }
                // tungstenite answers pings itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ClientError::Transport(e.to_string())),
                None => return Err(ClientError::Closed),
            }
        }
    }
}

pub struct BitgetWriter {
    write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameWriter for BitgetWriter {
    async fn write_frame(&mut self, frame: RawMessage) -> Result<(), ClientError> {
        let message = match frame {
            RawMessage::Text(text) => Message::Text(text),
            RawMessage::Binary(bytes) => Message::Binary(bytes),
        };
        self.write
            .send(message)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.write
            .send(Message::Close(None))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}

pub struct BitgetClient {
    ws_url: String,
    rest_url: String,
    http: Client,
    /// instId -> market embedded in every snapshot for that instrument
    markets: RwLock<HashMap<String, Market>>,
}

impl BitgetClient {
    /// `pairs` are the traded pairs to subscribe; the instrument id is the
    /// concatenated abbreviations, e.g. BTC_USDT -> BTCUSDT.
    pub fn new(ws_url: impl Into<String>, rest_url: impl Into<String>, pairs: Vec<Symbol>) -> Self {
        let markets = pairs
            .into_iter()
            .map(|symbol| {
                let inst_id = inst_id(&symbol);
                let market = Market::new(inst_id.clone(), symbol, Exchanger::new(EXCHANGER_NAME));
                (inst_id, market)
            })
            .collect();

        Self {
            ws_url: ws_url.into(),
            rest_url: rest_url.into(),
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            markets: RwLock::new(markets),
        }
    }

    pub fn instruments(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.markets.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn subscribe_message(&self) -> SubscribeMessage {
        let args = self
            .instruments()
            .into_iter()
            .flat_map(|inst| {
                CHANNELS.iter().map(move |channel| SubscribeArg {
                    inst_type: "SPOT".to_string(),
                    channel: channel.to_string(),
                    inst_id: inst.clone(),
                })
            })
            .collect();

        SubscribeMessage {
            op: "subscribe".to_string(),
            args,
        }
    }

    fn market_for(&self, inst_id: &str) -> Result<Market, ClientError> {
        self.markets
            .read()
            .get(inst_id)
            .cloned()
            .ok_or_else(|| ClientError::Decode(format!("unsubscribed instrument {inst_id}")))
    }

    fn decode_text(&self, text: &str) -> Result<Vec<Snapshot>, ClientError> {
        if text.trim() == "pong" {
            return Ok(Vec::new());
        }

        let frame: WsFrame =
            serde_json::from_str(text).map_err(|e| ClientError::Decode(e.to_string()))?;

        if let Some(event) = frame.event.as_deref() {
            if event == "error" {
                return Err(ClientError::Decode(format!(
                    "bitget error {}: {}",
                    frame.code.map(|c| c.to_string()).unwrap_or_default(),
                    frame.msg.unwrap_or_default()
                )));
            }
            debug!(event, "Bitget event");
            return Ok(Vec::new());
        }

        let (Some(arg), Some(data)) = (frame.arg, frame.data) else {
            return Ok(Vec::new());
        };
        let market = self.market_for(&arg.inst_id)?;

        data.into_iter()
            .map(|item| match arg.channel.as_str() {
                "ticker" => decode_ticker(item, &market, frame.ts).map(Some),
                "trade" => decode_trade(item, &market).map(Some),
                "books15" => decode_book(item, &market, frame.ts).map(Some),
                _ => Ok(None),
            })
            .filter_map(Result::transpose)
            .collect()
    }
}

#[async_trait]
impl ExchangeClient for BitgetClient {
    type Reader = BitgetReader;
    type Writer = BitgetWriter;

    fn name(&self) -> &str {
        EXCHANGER_NAME
    }

    async fn connect(&self) -> Result<(BitgetReader, BitgetWriter), ClientError> {
        let (stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        let (mut write, read) = stream.split();

        let subscribe = self.subscribe_message();
        let json =
            serde_json::to_string(&subscribe).map_err(|e| ClientError::Connect(e.to_string()))?;
        write
            .send(Message::Text(json))
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;

        info!(
            url = %self.ws_url,
            channels = subscribe.args.len(),
            "Subscribed to Bitget channels"
        );
        Ok((BitgetReader { read }, BitgetWriter { write }))
    }

    fn keepalive(&self) -> RawMessage {
        RawMessage::text("ping")
    }

    fn decode(&self, frame: &RawMessage) -> Result<Vec<Snapshot>, ClientError> {
        match frame {
            RawMessage::Text(text) => self.decode_text(text),
            RawMessage::Binary(_) => Ok(Vec::new()),
        }
    }

    /// Instrument metadata for the subscribed pairs from the public REST API
    async fn markets(&self) -> Result<Vec<Market>, ClientError> {
        let url = format!("{}/api/v2/spot/public/symbols", self.rest_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClientError::Transport(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body: SymbolsResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        if body.code != "00000" {
            return Err(ClientError::Transport(format!(
                "Bitget API error: {}",
                body.msg
            )));
        }

        let templates = self.markets.read().clone();
        let mut markets: Vec<Market> = body
            .data
            .into_iter()
            .filter_map(|info| {
                let template = templates.get(&info.symbol)?;
                Some(market_from_info(template, info))
            })
            .collect();

        // Pairs the REST listing does not know keep their configured defaults
        for (inst_id, template) in &templates {
            if !markets.iter().any(|m| &m.name == inst_id) {
                warn!(instrument = %inst_id, "Instrument not listed by Bitget REST API");
                markets.push(template.clone());
            }
        }

        info!(markets = markets.len(), "Fetched Bitget market metadata");
        Ok(markets)
    }

    fn adopt_markets(&self, resolved: Vec<Market>) {
        let mut markets = self.markets.write();
        for market in resolved {
            if let Some(slot) = markets.get_mut(&market.name) {
                *slot = market;
            }
        }
    }
}

fn inst_id(symbol: &Symbol) -> String {
    format!("{}{}", symbol.base.abbr, symbol.quote.abbr).to_uppercase()
}

fn market_from_info(template: &Market, info: SymbolInfo) -> Market {
    let precision = parse_opt(info.price_precision.as_deref()).map(|p| p as i32);
    let symbol = if info.base_coin.is_empty() || info.quote_coin.is_empty() {
        template.symbol.clone()
    } else {
        Symbol::new(
            Currency::from_code(&info.base_coin),
            Currency::from_code(&info.quote_coin),
        )
    };

    Market {
        symbol,
        active: info.status == "online",
        precision: precision.unwrap_or(template.precision),
        limitation: Limitation {
            min: parse_opt(info.min_trade_amount.as_deref()).unwrap_or(0.0),
            max: parse_opt(info.max_trade_amount.as_deref()).unwrap_or(0.0),
        },
        min_step: precision.map(|p| 10f64.powi(-p)).unwrap_or(template.min_step),
        ..template.clone()
    }
}

fn parse_opt(value: Option<&str>) -> Option<f64> {
    value.and_then(|v| v.trim().parse::<f64>().ok())
}

fn parse_num(value: &str, field: &str) -> Result<f64, ClientError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ClientError::Decode(format!("bad {field}: {value:?}")))
}

fn parse_time(ts: Option<&str>, fallback: Option<i64>) -> Result<DateTime<Utc>, ClientError> {
    let millis = match ts {
        Some(ts) => ts
            .trim()
            .parse::<i64>()
            .map_err(|_| ClientError::Decode(format!("bad timestamp: {ts:?}")))?,
        None => fallback.ok_or_else(|| ClientError::Decode("missing timestamp".to_string()))?,
    };
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| ClientError::Decode(format!("timestamp out of range: {millis}")))
}

fn decode_ticker(
    item: serde_json::Value,
    market: &Market,
    frame_ts: Option<i64>,
) -> Result<Snapshot, ClientError> {
    let data: TickerData =
        serde_json::from_value(item).map_err(|e| ClientError::Decode(e.to_string()))?;

    let last = parse_num(&data.last_pr, "lastPr")?;
    let open = parse_opt(data.open24h.as_deref()).unwrap_or(0.0);
    let values = TickerValues {
        high: parse_opt(data.high24h.as_deref()).unwrap_or(0.0),
        low: parse_opt(data.low24h.as_deref()).unwrap_or(0.0),
        bid: parse_opt(data.bid_pr.as_deref()).unwrap_or(0.0),
        bid_volume: parse_opt(data.bid_sz.as_deref()).unwrap_or(0.0),
        ask: parse_opt(data.ask_pr.as_deref()).unwrap_or(0.0),
        ask_volume: parse_opt(data.ask_sz.as_deref()).unwrap_or(0.0),
        last,
        change: if open > 0.0 { last - open } else { 0.0 },
        // change24h is a ratio
        percentage: parse_opt(data.change24h.as_deref()).unwrap_or(0.0) * 100.0,
        base_volume: parse_opt(data.base_volume.as_deref()).unwrap_or(0.0),
        quote_volume: parse_opt(data.quote_volume.as_deref()).unwrap_or(0.0),
        open,
        ..Default::default()
    };

    Ok(Ticker {
        market: market.clone().into(),
        time: parse_time(data.ts.as_deref(), frame_ts)?,
        values,
    }
    .into())
}

fn decode_trade(item: serde_json::Value, market: &Market) -> Result<Snapshot, ClientError> {
    let data: TradeData =
        serde_json::from_value(item).map_err(|e| ClientError::Decode(e.to_string()))?;
    let price = parse_num(&data.price, "price")?;
    let amount = parse_num(&data.size, "size")?;

    Ok(Trade {
        market: market.clone().into(),
        time: parse_time(Some(&data.ts), None)?,
        order_id: data.trade_id,
        side: data.side,
        trade_type: "market".to_string(),
        price,
        amount,
        total: price * amount,
    }
    .into())
}

fn decode_book(
    item: serde_json::Value,
    market: &Market,
    frame_ts: Option<i64>,
) -> Result<Snapshot, ClientError> {
    let data: BookData =
        serde_json::from_value(item).map_err(|e| ClientError::Decode(e.to_string()))?;

    Ok(OrderBook {
        market: market.clone().into(),
        time: parse_time(data.ts.as_deref(), frame_ts)?,
        bids: parse_levels(&data.bids)?,
        asks: parse_levels(&data.asks)?,
    }
    .into())
}

fn parse_levels(levels: &[Vec<String>]) -> Result<Vec<PriceVol>, ClientError> {
    levels
        .iter()
        .map(|level| match level.as_slice() {
            [price, volume, ..] => Ok(PriceVol::new(
                parse_num(price, "level price")?,
                parse_num(volume, "level size")?,
            )),
            _ => Err(ClientError::Decode(format!("short book level: {level:?}"))),
        })
        .collect()
}
