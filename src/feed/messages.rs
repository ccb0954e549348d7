//! Inbound wire format of the trade feed
//!
//! Messages arrive as JSON text frames. Events carry an `e` discriminator;
//! command replies carry the `id` they were sent with. Anything else on
//! the stream is irrelevant to us and skipped without noise.

use serde::Deserialize;
use serde_json::Value;

use crate::error::MessageError;
use crate::types::Trade;

/// Correlation id reserved for the LIST_SUBSCRIPTIONS liveness probe.
pub const PROBE_ID: u64 = 1337;

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Trade(Trade),
    /// Reply to the liveness probe, with the number of active
    /// subscriptions reported by the server.
    ProbeReply { active_subscriptions: usize },
    /// Valid JSON that is not for us (other event types, other ids).
    Ignored,
}

/// Raw aggregate-trade event. Price and quantity come over the wire as
/// strings.
#[derive(Debug, Deserialize)]
struct AggTradeMsg {
    #[serde(rename = "m")]
    is_maker: bool,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "T")]
    trade_time_ms: i64,
}

impl TryFrom<AggTradeMsg> for Trade {
    type Error = MessageError;

    fn try_from(raw: AggTradeMsg) -> Result<Self, Self::Error> {
        Ok(Trade {
            is_maker: raw.is_maker,
            price: raw.price.parse().map_err(|_| MessageError::Number("p"))?,
            quantity: raw
                .quantity
                .parse()
                .map_err(|_| MessageError::Number("q"))?,
            trade_time_ms: raw.trade_time_ms,
        })
    }
}

/// Decode one text frame from the feed.
pub fn parse_inbound(text: &str) -> Result<Inbound, MessageError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(MessageError::NotAnObject);
    }

    let event_type = value.get("e").and_then(Value::as_str).map(str::to_owned);
    match event_type.as_deref() {
        Some("aggTrade") => {
            let raw: AggTradeMsg = serde_json::from_value(value)?;
            Ok(Inbound::Trade(raw.try_into()?))
        }
        Some(_) => Ok(Inbound::Ignored),
        None if value.get("id").and_then(Value::as_u64) == Some(PROBE_ID) => {
            let active_subscriptions = value
                .get("result")
                .and_then(Value::as_array)
                .map(|list| list.len())
                .unwrap_or(0);
            Ok(Inbound::ProbeReply {
                active_subscriptions,
            })
        }
        None => Ok(Inbound::Ignored),
    }
}
