//! Market-data feed - WebSocket transport and subscription plumbing
//!
//! One [`connection::FeedConnection`] at a time owns the outbound stream.
//! Its reader task posts [`FeedEvent`]s into the runtime's single event
//! channel; every event is tagged with the connection it came from so the
//! runtime can discard messages from a replaced connection.

pub mod connection;
pub mod messages;
pub mod subscription;

pub use connection::FeedConnection;
pub use subscription::SubscriptionManager;

use crate::types::Trade;

/// Identifier of one connection attempt cycle, monotonically increasing.
pub type ConnId = u64;

/// Parsed inbound activity from one feed connection.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEventKind {
    /// An aggregate trade for the subscribed symbol.
    Trade(Trade),
    /// Response to the LIST_SUBSCRIPTIONS probe.
    ProbeReply { active_subscriptions: usize },
    /// Transport ping; the runtime answers with a pong.
    Ping(Vec<u8>),
    /// The transport died or the server closed the session. The
    /// connection does not reconnect itself; the watchdog decides.
    Closed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    pub conn: ConnId,
    pub kind: FeedEventKind,
}
