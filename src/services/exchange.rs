//! Exchange client port
//!
//! A supervisor drives any exchange through this capability set: dial, read
//! one frame, write one frame, close, and decode a frame into snapshots. The
//! reading and writing halves are split so that a reader task and a
//! heartbeat task can share one connection.

use async_trait::async_trait;

use crate::models::market::Market;
use crate::models::snapshot::Snapshot;

/// One frame as received from, or sent to, an exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl RawMessage {
    pub fn text(s: impl Into<String>) -> Self {
        RawMessage::Text(s.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("connection closed")]
    Closed,
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait FrameReader: Send + 'static {
    /// Next data frame. Transport-level control frames are handled inside.
    async fn read_next(&mut self) -> Result<RawMessage, ClientError>;
}

#[async_trait]
pub trait FrameWriter: Send + 'static {
    async fn write_frame(&mut self, frame: RawMessage) -> Result<(), ClientError>;

    /// Sends the protocol close frame; the peer's acknowledgement arrives on
    /// the reading half.
    async fn close(&mut self) -> Result<(), ClientError>;
}

#[async_trait]
pub trait ExchangeClient: Send + Sync + 'static {
    type Reader: FrameReader;
    type Writer: FrameWriter;

    /// Exchanger name, e.g. "bitget"
    fn name(&self) -> &str;

    /// Dials and performs any subscribe handshake
    async fn connect(&self) -> Result<(Self::Reader, Self::Writer), ClientError>;

    /// Frame sent on every heartbeat tick
    fn keepalive(&self) -> RawMessage;

    /// Snapshots carried by one frame. An empty list means the frame carries
    /// nothing to record (acks, pongs).
    fn decode(&self, frame: &RawMessage) -> Result<Vec<Snapshot>, ClientError>;

    /// Markets this client trades, for registering before the first dial
    async fn markets(&self) -> Result<Vec<Market>, ClientError> {
        Ok(Vec::new())
    }

    /// Receives the resolved markets so decoded snapshots can carry their ids
    fn adopt_markets(&self, _markets: Vec<Market>) {}
}
