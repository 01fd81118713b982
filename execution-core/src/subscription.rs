//! Data subscription service (§6): the network boundary for tick/bar/
//! instrument data, represented only as the request/response + publish
//! contract and wire envelope the spec describes. No transport is
//! implemented here — wire serialization and the network client are out of
//! scope (§1).

use crate::clock::Timestamp;
use crate::ids::Symbol;

/// A request topic (§6 "Request topics").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTopic {
    QuoteTicks(Symbol),
    Bars(String),
    Instruments(Symbol),
}

/// A publish topic (§6 "Publish topics").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishTopic {
    Quote(Symbol),
    Bar(String),
    Instrument(Symbol),
}

impl std::fmt::Display for PublishTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishTopic::Quote(symbol) => write!(f, "Quote:{symbol}"),
            PublishTopic::Bar(bar_type) => write!(f, "Bar:{bar_type}"),
            PublishTopic::Instrument(symbol) => write!(f, "Instrument:{symbol}"),
        }
    }
}

/// The wire envelope every request, response and publish message carries
/// (§6 "Wire envelope"). The payload is opaque bytes: encoding/decoding is
/// the responsibility of the transport, not this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub payload: Vec<u8>,
    pub content_type: String,
    pub encoding: String,
    pub correlation_id: String,
    pub message_id: String,
    pub timestamp: Timestamp,
}

/// Capability for requesting historical data and subscribing to live
/// publishes (§6). An opaque request/response + publish channel: this
/// crate defines the shape, a transport crate implements it.
pub trait DataSubscription: Send {
    fn request(&mut self, topic: RequestTopic) -> Result<Envelope, crate::errors::ExecutionError>;
    fn subscribe(&mut self, topic: PublishTopic) -> Result<(), crate::errors::ExecutionError>;
    fn unsubscribe(&mut self, topic: PublishTopic) -> Result<(), crate::errors::ExecutionError>;
}
