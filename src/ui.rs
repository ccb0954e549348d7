//! Presentation projections - read-only views for the excluded renderer
//!
//! The runtime publishes a [`UiSnapshot`] on a fixed redraw period through
//! a `tokio::sync::watch` channel. Rendering, sound playback and key input
//! live outside this crate; they only ever see these projections.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::types::{Candle, PriceDirection};

/// Severity marker of one event-log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Info,
    Success,
    Warning,
    Error,
}

impl LogKind {
    fn mark(self) -> char {
        match self {
            LogKind::Info => '•',
            LogKind::Success => '✔',
            LogKind::Warning => '⚠',
            LogKind::Error => '✖',
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub kind: LogKind,
    pub text: String,
}

impl LogLine {
    pub fn render(&self) -> String {
        format!(
            "{} {} {}",
            self.kind.mark(),
            self.at.format("%a %d/%m %H:%M:%S"),
            self.text
        )
    }
}

/// Bounded scrolling log of human-readable events, newest first.
pub struct EventLog {
    capacity: usize,
    lines: VecDeque<LogLine>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lines: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, kind: LogKind, text: impl Into<String>) {
        self.lines.push_front(LogLine {
            at: Utc::now(),
            kind,
            text: text.into(),
        });
        while self.lines.len() > self.capacity {
            self.lines.pop_back();
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Rendered lines, newest first.
    pub fn render_lines(&self) -> Vec<String> {
        self.lines.iter().map(LogLine::render).collect()
    }
}

/// Chart-ready series from the rolling history window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartSeries {
    pub x: Vec<u64>,
    pub y: Vec<f64>,
}

/// Read-only projection of the runtime state for one redraw.
#[derive(Debug, Clone, Default)]
pub struct UiSnapshot {
    pub symbol: String,
    pub last_price: Option<f64>,
    pub direction: PriceDirection,
    /// Armed alert threshold, if any.
    pub alert: Option<f64>,
    /// Rendered event-log lines, newest first.
    pub log: Vec<String>,
    pub chart: ChartSeries,
}

/// Human-readable summary of one finalized candle.
///
/// Ratios with a zero denominator and an undefined close position render
/// as `-` instead of dividing.
pub fn format_candle_line(candle: &Candle) -> String {
    let close = if candle.price_close < 0.0 {
        "-".to_string()
    } else {
        format!("{:.2}", candle.price_close)
    };
    let vpt_buy = match candle.volume_per_tick_buy() {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    };
    let vpt_sell = match candle.volume_per_tick_sell() {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    };
    let polarized = match candle.polarized_volume() {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    };

    format!(
        "${:.2} [{}|{:.1}] [{:.2}/{}={}] [{:.2}/{}={}] {}",
        candle.price,
        close,
        candle.range,
        candle.volume_buy,
        candle.tick_buy,
        vpt_buy,
        candle.volume_sell,
        candle.tick_sell,
        vpt_sell,
        polarized
    )
}
