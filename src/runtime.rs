//! Runtime - the single serialized event loop
//!
//! One task owns every piece of mutable state. Feed messages, UI commands
//! and the three timers (probe, watchdog deadline, redraw) all become
//! [`Event`]s consumed by [`RuntimeState::apply`], so no two mutations can
//! ever interleave. Reconnection runs inline in the same loop: while a
//! replacement connection is being opened, nothing else touches the state,
//! and events queued by the replaced connection are discarded afterwards
//! by their connection tag.

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::engine::{AlertEvaluator, AlertFired, BucketEngine, RollingHistory};
use crate::feed::{ConnId, FeedConnection, FeedEvent, FeedEventKind, SubscriptionManager};
use crate::types::{PriceDirection, Trade};
use crate::ui::{format_candle_line, ChartSeries, EventLog, LogKind, UiSnapshot};
use crate::watchdog::Watchdog;

/// Input from the excluded key-handling layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UiCommand {
    /// Arm the price alert; non-positive values clear it instead.
    SetAlert(f64),
    ClearAlert,
    Quit,
}

/// Channel ends handed to the excluded presentation layer.
pub struct PresentationHandles {
    /// Latest read-only projection, refreshed on the redraw period.
    pub snapshot: watch::Receiver<UiSnapshot>,
    /// One-shot alert firings for the notification layer.
    pub alerts: mpsc::Receiver<AlertFired>,
    /// Command channel from the input layer.
    pub commands: mpsc::Sender<UiCommand>,
}

/// Everything the serialized handler reacts to. Timers post synthetic
/// events here instead of mutating state from their own contexts.
enum Event {
    Feed(FeedEvent),
    Command(UiCommand),
    ProbeTick,
    WatchdogDeadline,
    RedrawTick,
}

enum Flow {
    Continue,
    /// A replacement connection was installed; the probe timer restarts.
    Reconnected,
    Quit,
}

pub struct Runtime {
    state: RuntimeState,
    feed_rx: mpsc::Receiver<FeedEvent>,
    command_rx: mpsc::Receiver<UiCommand>,
    command_tx: mpsc::Sender<UiCommand>,
}

struct RuntimeState {
    cfg: AppConfig,
    engine: BucketEngine,
    history: RollingHistory,
    alert: AlertEvaluator,
    watchdog: Watchdog,
    subscription: SubscriptionManager,
    log: EventLog,
    conn: Option<FeedConnection>,
    /// Tag of the installed connection; events from any other are stale.
    active_conn: Option<ConnId>,
    next_conn: ConnId,
    last_trade: Option<Trade>,
    direction: PriceDirection,
    feed_tx: mpsc::Sender<FeedEvent>,
    snapshot_tx: watch::Sender<UiSnapshot>,
    alert_tx: mpsc::Sender<AlertFired>,
}

impl Runtime {
    pub fn new(cfg: AppConfig) -> (Self, PresentationHandles) {
        let (feed_tx, feed_rx) = mpsc::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (alert_tx, alert_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(UiSnapshot {
            symbol: cfg.feed.symbol.clone(),
            ..UiSnapshot::default()
        });

        let state = RuntimeState::new(cfg, feed_tx, snapshot_tx, alert_tx);
        let runtime = Runtime {
            state,
            feed_rx,
            command_rx,
            command_tx: command_tx.clone(),
        };
        let handles = PresentationHandles {
            snapshot: snapshot_rx,
            alerts: alert_rx,
            commands: command_tx,
        };
        (runtime, handles)
    }

    /// Drive the event loop until quit or interrupt.
    pub async fn run(self) -> Result<()> {
        let Runtime {
            mut state,
            mut feed_rx,
            mut command_rx,
            // Held so the command channel stays open even if the
            // presentation layer drops its sender.
            command_tx: _command_tx,
        } = self;

        state.log.push(
            LogKind::Info,
            format!(
                "watching {} with {}s candles",
                state.cfg.feed.symbol, state.cfg.candle.size_secs
            ),
        );
        state.reconnect().await;
        state.watchdog.rearm();

        let probe_period = state.cfg.feed.probe_interval();
        let mut probe = interval_at(Instant::now() + probe_period, probe_period);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut redraw = tokio::time::interval(state.cfg.ui.redraw_interval());
        redraw.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            let event = tokio::select! {
                maybe = feed_rx.recv() => match maybe {
                    Some(ev) => Event::Feed(ev),
                    None => continue,
                },
                maybe = command_rx.recv() => match maybe {
                    Some(cmd) => Event::Command(cmd),
                    None => continue,
                },
                _ = probe.tick() => Event::ProbeTick,
                _ = tokio::time::sleep_until(state.watchdog.deadline()) => Event::WatchdogDeadline,
                _ = redraw.tick() => Event::RedrawTick,
                _ = &mut ctrl_c => Event::Command(UiCommand::Quit),
            };

            match state.apply(event).await {
                Flow::Continue => {}
                Flow::Reconnected => probe.reset(),
                Flow::Quit => break,
            }
        }

        if let Some(mut conn) = state.conn.take() {
            conn.close();
        }
        info!("Shutting down");
        Ok(())
    }
}

impl RuntimeState {
    fn new(
        cfg: AppConfig,
        feed_tx: mpsc::Sender<FeedEvent>,
        snapshot_tx: watch::Sender<UiSnapshot>,
        alert_tx: mpsc::Sender<AlertFired>,
    ) -> Self {
        Self {
            engine: BucketEngine::new(cfg.candle.size_ms()),
            history: RollingHistory::new(cfg.candle.history_len),
            alert: AlertEvaluator::new(),
            watchdog: Watchdog::new(cfg.feed.watchdog_timeout()),
            subscription: SubscriptionManager::new(cfg.feed.symbol.clone()),
            log: EventLog::new(cfg.ui.log_capacity),
            conn: None,
            active_conn: None,
            next_conn: 0,
            last_trade: None,
            direction: PriceDirection::default(),
            feed_tx,
            snapshot_tx,
            alert_tx,
            cfg,
        }
    }

    async fn apply(&mut self, event: Event) -> Flow {
        match event {
            Event::Feed(ev) => {
                self.on_feed_event(ev).await;
                Flow::Continue
            }
            Event::Command(cmd) => self.on_command(cmd),
            Event::ProbeTick => {
                self.send_probe().await;
                Flow::Continue
            }
            Event::WatchdogDeadline => {
                self.watchdog.fire();
                warn!(
                    timeout_ms = self.cfg.feed.watchdog_timeout_ms,
                    "No liveness signal before the deadline; replacing feed connection"
                );
                self.log
                    .push(LogKind::Warning, "disconnected, attempting to reconnect...");
                self.reconnect().await;
                self.watchdog.rearm();
                Flow::Reconnected
            }
            Event::RedrawTick => {
                self.publish_snapshot();
                Flow::Continue
            }
        }
    }

    async fn on_feed_event(&mut self, event: FeedEvent) {
        if self.active_conn != Some(event.conn) {
            debug!(conn = event.conn, "Dropping event from replaced connection");
            return;
        }
        match event.kind {
            FeedEventKind::Trade(trade) => self.on_trade(trade),
            FeedEventKind::ProbeReply {
                active_subscriptions,
            } => {
                if active_subscriptions == 1 {
                    self.watchdog.record_liveness();
                } else {
                    warn!(
                        active_subscriptions,
                        "Probe reply with unexpected subscription count"
                    );
                }
            }
            FeedEventKind::Ping(payload) => {
                if let Some(conn) = self.conn.as_mut() {
                    if let Err(e) = conn.send_pong(payload).await {
                        warn!(error = %e, "Failed to answer feed ping");
                    }
                }
            }
            FeedEventKind::Closed { reason } => {
                warn!(conn = event.conn, reason = %reason, "Feed connection closed");
                self.log
                    .push(LogKind::Warning, format!("socket closed: {reason}"));
            }
        }
    }

    fn on_trade(&mut self, trade: Trade) {
        let prev_price = self.last_trade.map(|t| t.price);

        if let Some(fired) = self.alert.on_trade(prev_price, trade.price) {
            self.log.push(
                LogKind::Warning,
                format!("alert: price crossed {:.2}", fired.threshold),
            );
            let _ = self.alert_tx.try_send(fired);
        }

        if let Some(candle) = self.engine.apply(trade) {
            self.history.push(candle.ticks() as f64);
            self.log.push(LogKind::Info, format_candle_line(&candle));
        }

        self.direction = self.direction.advance(prev_price, trade.price);
        self.last_trade = Some(trade);
    }

    fn on_command(&mut self, cmd: UiCommand) -> Flow {
        match cmd {
            UiCommand::SetAlert(price) => {
                // No reference price yet means nothing to straddle; the
                // original input layer refuses to arm before a trade.
                if self.last_trade.is_some() {
                    self.alert.arm(price);
                    match self.alert.threshold() {
                        Some(t) => self
                            .log
                            .push(LogKind::Info, format!("alert armed at {t:.2}")),
                        None => self.log.push(LogKind::Info, "alert cleared"),
                    }
                }
                Flow::Continue
            }
            UiCommand::ClearAlert => {
                self.alert.disarm();
                self.log.push(LogKind::Info, "alert cleared");
                Flow::Continue
            }
            UiCommand::Quit => Flow::Quit,
        }
    }

    async fn send_probe(&mut self) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        if let Err(e) = self.subscription.probe(conn).await {
            // A dead socket also stops probe replies, so the watchdog
            // deadline handles it from here.
            warn!(error = %e, "Probe send failed");
        }
    }

    /// Open a replacement connection, retrying until one is installed and
    /// subscribed. No backoff and no retry cap: with a dead feed the
    /// process has nothing better to do.
    async fn reconnect(&mut self) {
        let mut attempt = 0u64;
        loop {
            attempt += 1;
            let id = self.next_conn;
            self.next_conn += 1;

            match FeedConnection::open(&self.cfg.feed.endpoint, id, self.feed_tx.clone()).await {
                Ok(mut fresh) => {
                    if let Some(mut old) = self.conn.take() {
                        old.close();
                    }
                    self.active_conn = Some(fresh.id());
                    let subscribed = self.subscription.subscribe(&mut fresh).await;
                    self.conn = Some(fresh);
                    match subscribed {
                        Ok(()) => {
                            info!(conn = id, attempt, "Feed connected and subscribed");
                            self.log.push(LogKind::Success, "socket connected");
                            return;
                        }
                        Err(e) => {
                            warn!(conn = id, error = %e, "Subscribe on fresh connection failed");
                        }
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Feed connection attempt failed");
                }
            }
        }
    }

    fn publish_snapshot(&self) {
        let (x, y) = self.history.series();
        let _ = self.snapshot_tx.send(UiSnapshot {
            symbol: self.cfg.feed.symbol.clone(),
            last_price: self.last_trade.map(|t| t.price),
            direction: self.direction,
            alert: self.alert.threshold(),
            log: self.log.render_lines(),
            chart: ChartSeries { x, y },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CandleConfig, FeedConfig, UiConfig};
    use std::time::Duration;

    fn test_cfg() -> AppConfig {
        AppConfig {
            feed: FeedConfig {
                endpoint: "wss://example.invalid/ws".to_string(),
                symbol: "btcusdt".to_string(),
                probe_interval_ms: 25_000,
                watchdog_timeout_ms: 60_000,
            },
            candle: CandleConfig {
                size_secs: 60,
                history_len: 10,
            },
            ui: UiConfig {
                redraw_interval_ms: 50,
                log_capacity: 20,
            },
        }
    }

    fn test_state_for(
        endpoint: String,
    ) -> (
        RuntimeState,
        watch::Receiver<UiSnapshot>,
        mpsc::Receiver<AlertFired>,
    ) {
        let mut cfg = test_cfg();
        cfg.feed.endpoint = endpoint;
        let (feed_tx, _feed_rx) = mpsc::channel(16);
        let (alert_tx, alert_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(UiSnapshot::default());
        let state = RuntimeState::new(cfg, feed_tx, snapshot_tx, alert_tx);
        (state, snapshot_rx, alert_rx)
    }

    fn test_state() -> (
        RuntimeState,
        watch::Receiver<UiSnapshot>,
        mpsc::Receiver<AlertFired>,
    ) {
        let (mut state, snapshot_rx, alert_rx) =
            test_state_for("wss://example.invalid/ws".to_string());
        state.active_conn = Some(7);
        (state, snapshot_rx, alert_rx)
    }

    fn trade_event(conn: ConnId, time_ms: i64, price: f64) -> FeedEvent {
        FeedEvent {
            conn,
            kind: FeedEventKind::Trade(Trade {
                is_maker: false,
                price,
                quantity: 1.0,
                trade_time_ms: time_ms,
            }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stale_connection_events_have_no_effect() {
        let (mut state, _snap, _alerts) = test_state();
        let deadline = state.watchdog.deadline();

        state.on_feed_event(trade_event(3, 1_000, 100.0)).await;
        state
            .on_feed_event(FeedEvent {
                conn: 3,
                kind: FeedEventKind::ProbeReply {
                    active_subscriptions: 1,
                },
            })
            .await;

        assert!(state.last_trade.is_none());
        assert_eq!(state.engine.current_bucket(), None);
        assert_eq!(state.watchdog.deadline(), deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_reply_with_one_subscription_rearms_watchdog() {
        let (mut state, _snap, _alerts) = test_state();
        let deadline = state.watchdog.deadline();

        tokio::time::advance(Duration::from_secs(10)).await;
        state
            .on_feed_event(FeedEvent {
                conn: 7,
                kind: FeedEventKind::ProbeReply {
                    active_subscriptions: 1,
                },
            })
            .await;

        assert!(state.watchdog.deadline() > deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_reply_with_other_counts_is_not_liveness() {
        let (mut state, _snap, _alerts) = test_state();
        let deadline = state.watchdog.deadline();

        tokio::time::advance(Duration::from_secs(10)).await;
        for count in [0usize, 2] {
            state
                .on_feed_event(FeedEvent {
                    conn: 7,
                    kind: FeedEventKind::ProbeReply {
                        active_subscriptions: count,
                    },
                })
                .await;
        }

        assert_eq!(state.watchdog.deadline(), deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn trades_are_not_liveness_signals() {
        let (mut state, _snap, _alerts) = test_state();
        let deadline = state.watchdog.deadline();

        tokio::time::advance(Duration::from_secs(10)).await;
        state.on_feed_event(trade_event(7, 1_000, 100.0)).await;

        assert_eq!(state.watchdog.deadline(), deadline);
        assert_eq!(state.last_trade.map(|t| t.price), Some(100.0));
    }

    #[tokio::test(start_paused = true)]
    async fn trade_flow_builds_candles_and_snapshot() {
        let (mut state, snap, _alerts) = test_state();

        state.on_feed_event(trade_event(7, 0, 100.0)).await;
        state.on_feed_event(trade_event(7, 10_000, 104.0)).await;
        state.on_feed_event(trade_event(7, 70_000, 102.0)).await;

        assert_eq!(state.history.len(), 1);
        assert_eq!(state.engine.current_bucket(), Some(1));

        state.publish_snapshot();
        let published = snap.borrow();
        assert_eq!(published.last_price, Some(102.0));
        assert_eq!(published.direction, PriceDirection::Down);
        assert_eq!(published.chart.y.len(), 1);
        assert!(published.log.iter().any(|line| line.contains("$104.00")));
    }

    #[tokio::test(start_paused = true)]
    async fn alert_fires_once_through_the_runtime() {
        let (mut state, _snap, mut alerts) = test_state();

        state.on_feed_event(trade_event(7, 0, 99.0)).await;
        state.on_command(UiCommand::SetAlert(100.0));
        assert_eq!(state.alert.threshold(), Some(100.0));

        state.on_feed_event(trade_event(7, 1_000, 101.0)).await;

        let fired = alerts.try_recv().expect("alert must fire on crossing");
        assert_eq!(fired.threshold, 100.0);
        assert_eq!(state.alert.threshold(), None);

        // Auto-disarmed: crossing back fires nothing.
        state.on_feed_event(trade_event(7, 2_000, 99.0)).await;
        assert!(alerts.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn alert_cannot_arm_before_first_trade() {
        let (mut state, _snap, _alerts) = test_state();
        state.on_command(UiCommand::SetAlert(100.0));
        assert_eq!(state.alert.threshold(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn quit_command_stops_the_loop() {
        let (mut state, _snap, _alerts) = test_state();
        assert!(matches!(
            state.apply(Event::Command(UiCommand::Quit)).await,
            Flow::Quit
        ));
    }

    #[tokio::test]
    async fn reconnect_installs_and_subscribes_a_fresh_connection() {
        use futures_util::StreamExt;
        use tokio::net::TcpListener;
        use tokio_tungstenite::accept_async;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (mut state, _snap, _alerts) = test_state_for(format!("ws://{addr}"));

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let msg = ws.next().await.unwrap().unwrap();
            assert!(msg.to_text().unwrap().contains("SUBSCRIBE"));
        });

        state.reconnect().await;

        assert!(state.conn.is_some());
        assert_eq!(state.active_conn, Some(0));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn reconnect_retries_until_the_feed_returns() {
        use futures_util::StreamExt;
        use tokio::net::TcpListener;
        use tokio_tungstenite::accept_async;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // feed is down; the first attempts must fail

        let (mut state, _snap, _alerts) = test_state_for(format!("ws://{addr}"));

        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let listener = TcpListener::bind(addr).await.unwrap();
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let msg = ws.next().await.unwrap().unwrap();
            assert!(msg.to_text().unwrap().contains("SUBSCRIBE"));
        });

        state.reconnect().await;

        assert!(state.conn.is_some());
        assert!(
            state.next_conn > 1,
            "at least one attempt should have failed before the feed returned"
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn reconnect_swap_closes_and_supersedes_the_old_connection() {
        use futures_util::StreamExt;
        use tokio::net::TcpListener;
        use tokio_tungstenite::accept_async;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (mut state, _snap, _alerts) = test_state_for(format!("ws://{addr}"));

        let server = tokio::spawn(async move {
            for _ in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();
                let msg = ws.next().await.unwrap().unwrap();
                assert!(msg.to_text().unwrap().contains("SUBSCRIBE"));
            }
        });

        state.reconnect().await;
        let old_conn = state.active_conn.unwrap();

        state.reconnect().await;
        let new_conn = state.active_conn.unwrap();
        assert_ne!(old_conn, new_conn);

        // Anything still queued from the replaced connection is inert.
        let deadline = state.watchdog.deadline();
        state
            .on_feed_event(FeedEvent {
                conn: old_conn,
                kind: FeedEventKind::ProbeReply {
                    active_subscriptions: 1,
                },
            })
            .await;
        state.on_feed_event(trade_event(old_conn, 1_000, 42.0)).await;
        assert_eq!(state.watchdog.deadline(), deadline);
        assert!(state.last_trade.is_none());

        server.await.unwrap();
    }
}
