//! End-to-end aggregation flow over the public API: wire messages in,
//! candles, history series and alerts out.

use tapecandle::engine::{AlertEvaluator, BucketEngine, RollingHistory};
use tapecandle::feed::messages::{parse_inbound, Inbound};
use tapecandle::types::{Candle, Trade};
use tapecandle::ui::format_candle_line;

fn wire_trade(price: &str, quantity: &str, time_ms: i64, is_maker: bool) -> String {
    format!(
        r#"{{"e":"aggTrade","E":{time_ms},"s":"BTCUSDT","a":1,"p":"{price}","q":"{quantity}","f":1,"l":1,"T":{time_ms},"m":{is_maker}}}"#
    )
}

fn decode(text: &str) -> Trade {
    match parse_inbound(text).expect("wire message must parse") {
        Inbound::Trade(trade) => trade,
        other => panic!("expected a trade, got {other:?}"),
    }
}

#[test]
fn wire_to_candle_to_series() {
    let mut engine = BucketEngine::new(60_000);
    let mut history = RollingHistory::new(100);

    // First bucket: three trades, mixed sides.
    let messages = [
        wire_trade("29000.0", "0.5", 0, false),
        wire_trade("29050.0", "1.0", 20_000, true),
        wire_trade("29010.0", "0.2", 59_000, false),
    ];
    let mut candles: Vec<Candle> = Vec::new();
    for text in &messages {
        if let Some(candle) = engine.apply(decode(text)) {
            candles.push(candle);
        }
    }
    assert!(candles.is_empty());

    // A trade in the next bucket closes the first one.
    if let Some(candle) = engine.apply(decode(&wire_trade("29020.0", "0.1", 61_000, true))) {
        candles.push(candle);
    }
    assert_eq!(candles.len(), 1);

    let candle = &candles[0];
    assert_eq!(candle.bucket_id, 0);
    assert_eq!(candle.time_ms, 0);
    assert_eq!(candle.tick_buy, 2);
    assert_eq!(candle.tick_sell, 1);
    assert!((candle.volume_buy - 0.7).abs() < 1e-12);
    assert!((candle.volume_sell - 1.0).abs() < 1e-12);
    assert_eq!(candle.price, 29010.0);
    assert!((candle.range - 50.0).abs() < 1e-9);
    assert!((0.0..=1.0).contains(&candle.price_close));

    history.push(candle.ticks() as f64);
    let (x, y) = history.series();
    assert_eq!(x, vec![0]);
    assert_eq!(y, vec![0.0]);

    let line = format_candle_line(candle);
    assert!(line.contains("$29010.00"));
}

#[test]
fn long_session_respects_history_bound() {
    let mut engine = BucketEngine::new(60_000);
    let mut history = RollingHistory::new(5);

    // 50 buckets, two trades each; every rollover finalizes one candle.
    for bucket in 0..50i64 {
        let base = bucket * 60_000;
        for offset in [0, 30_000] {
            let trade = decode(&wire_trade("100.0", "1.0", base + offset, false));
            let emitted = engine.apply(trade);
            if offset == 0 && bucket > 0 {
                let candle = emitted.expect("each new bucket closes the previous one");
                assert_eq!(candle.bucket_id, bucket - 1);
                history.push(candle.ticks() as f64);
            } else {
                assert!(emitted.is_none());
            }
        }
        assert!(history.len() <= 5);
    }

    let (_, y) = history.series();
    assert_eq!(y.len(), 5);
    assert_eq!(y.iter().copied().fold(f64::INFINITY, f64::min), 0.0);
}

#[test]
fn alert_fires_once_across_a_trade_sequence() {
    let mut alert = AlertEvaluator::new();
    let prices = [99.0, 99.5, 100.5, 101.0, 99.0, 100.5];
    alert.arm(100.0);

    let mut fired = 0;
    let mut prev: Option<f64> = None;
    for price in prices {
        if alert.on_trade(prev, price).is_some() {
            fired += 1;
        }
        prev = Some(price);
    }

    // Crosses the threshold twice, but the alert disarms after the first.
    assert_eq!(fired, 1);
    assert_eq!(alert.threshold(), None);
}

#[test]
fn probe_reply_discrimination_matches_wire_contract() {
    let live = r#"{"result":["btcusdt@aggTrade"],"id":1337}"#;
    let empty = r#"{"result":[],"id":1337}"#;
    let foreign = r#"{"result":["btcusdt@aggTrade"],"id":9}"#;

    assert_eq!(
        parse_inbound(live).unwrap(),
        Inbound::ProbeReply {
            active_subscriptions: 1
        }
    );
    assert_eq!(
        parse_inbound(empty).unwrap(),
        Inbound::ProbeReply {
            active_subscriptions: 0
        }
    );
    assert_eq!(parse_inbound(foreign).unwrap(), Inbound::Ignored);
}
