//! Subscription manager - subscribe command and liveness probe
//!
//! On every (re)connect the runtime calls [`SubscriptionManager::subscribe`]
//! for the target symbol. Independently, on a fixed period, it sends a
//! LIST_SUBSCRIPTIONS probe tagged with the reserved correlation id; the
//! probe/response round trip proves the socket is alive even when an
//! illiquid symbol legitimately prints no trades.

use serde_json::json;
use tracing::debug;

use crate::error::FeedError;
use crate::feed::messages::PROBE_ID;
use crate::feed::FeedConnection;

pub struct SubscriptionManager {
    symbol: String,
}

impl SubscriptionManager {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }

    /// Stream name for the trade-execution channel of the symbol.
    pub fn stream_name(&self) -> String {
        format!("{}@aggTrade", self.symbol.to_lowercase())
    }

    pub fn subscribe_payload(&self) -> String {
        json!({
            "method": "SUBSCRIBE",
            "params": [self.stream_name()],
        })
        .to_string()
    }

    pub fn probe_payload(&self) -> String {
        json!({
            "id": PROBE_ID,
            "method": "LIST_SUBSCRIPTIONS",
        })
        .to_string()
    }

    /// Issue the subscribe command on a fresh connection.
    pub async fn subscribe(&self, conn: &mut FeedConnection) -> Result<(), FeedError> {
        debug!(conn = conn.id(), stream = %self.stream_name(), "Subscribing");
        conn.send_text(self.subscribe_payload()).await
    }

    /// Issue the list-subscriptions probe.
    pub async fn probe(&self, conn: &mut FeedConnection) -> Result<(), FeedError> {
        conn.send_text(self.probe_payload()).await
    }
}
