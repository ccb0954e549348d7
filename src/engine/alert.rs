//! Price alert - one-shot threshold crossing detector

/// Fired when consecutive trade prices straddle the armed threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertFired {
    pub threshold: f64,
    pub price: f64,
}

/// Holds at most one armed threshold; firing auto-disarms, so an alert
/// fires at most once per arm.
#[derive(Debug, Default)]
pub struct AlertEvaluator {
    threshold: Option<f64>,
}

impl AlertEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm at `price`. Non-positive values clear the alert instead.
    pub fn arm(&mut self, price: f64) {
        if price > 0.0 {
            self.threshold = Some(price);
        } else {
            self.threshold = None;
        }
    }

    pub fn disarm(&mut self) {
        self.threshold = None;
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    /// Evaluate one trade against the previous trade's price.
    ///
    /// Fires when the prices straddle the threshold: strictly below then
    /// at-or-above, or strictly above then at-or-below. Without a previous
    /// trade there is nothing to straddle.
    pub fn on_trade(&mut self, prev_price: Option<f64>, price: f64) -> Option<AlertFired> {
        let threshold = self.threshold?;
        let prev = prev_price?;

        let crossed_up = prev < threshold && price >= threshold;
        let crossed_down = prev > threshold && price <= threshold;
        if crossed_up || crossed_down {
            self.threshold = None;
            Some(AlertFired { threshold, price })
        } else {
            None
        }
    }
}
