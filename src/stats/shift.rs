//! Distribution shift detection over predictor output streams
//!
//! Compares each predictor's recent prediction window against the
//! immediately preceding window with a two-sample Kolmogorov-Smirnov test.
//! On detection the predictor's EMA adaptation rate is boosted for a fixed
//! number of updates so its statistics converge onto the new distribution.

use crate::config::ShiftConfig;
use crate::stats::tracker::StatisticsTracker;
use crate::types::predictor::PredictorId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Direction of a detected shift, derived from the window means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftType {
    /// Recent predictions trend higher.
    Upward,
    /// Recent predictions trend lower.
    Downward,
    /// Distribution changed without a clear mean shift.
    VarianceOnly,
    /// No shift detected (including insufficient history).
    None,
}

/// One detected shift, retained in a bounded per-predictor log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftEvent {
    pub timestamp: DateTime<Utc>,
    pub shift_type: ShiftType,
    pub test_statistic: f64,
    pub p_value_threshold: f64,
}

/// Outcome of a single shift check.
#[derive(Debug, Clone, Copy)]
pub struct ShiftOutcome {
    pub shifted: bool,
    pub statistic: f64,
    pub p_value: f64,
    pub shift_type: ShiftType,
}

impl ShiftOutcome {
    fn none() -> Self {
        Self {
            shifted: false,
            statistic: 0.0,
            p_value: 1.0,
            shift_type: ShiftType::None,
        }
    }
}

struct ShiftState {
    events: HashMap<PredictorId, Vec<ShiftEvent>>,
    /// Predictors with a temporarily boosted adaptation rate, mapped to
    /// the remaining countdown.
    boosted: HashMap<PredictorId, u32>,
}

/// Detects distribution shifts in base predictor outputs.
pub struct ShiftDetector {
    tracker: Arc<StatisticsTracker>,
    config: ShiftConfig,
    state: RwLock<ShiftState>,
}

impl ShiftDetector {
    pub fn new(tracker: Arc<StatisticsTracker>, config: ShiftConfig) -> Self {
        Self {
            tracker,
            config,
            state: RwLock::new(ShiftState {
                events: HashMap::new(),
                boosted: HashMap::new(),
            }),
        }
    }

    /// Test whether a predictor's recent output distribution differs from
    /// the preceding window. Requires `recent_window + comparison_window`
    /// samples of history; anything less is reported as no shift.
    pub fn detect_shift(&self, id: PredictorId) -> ShiftOutcome {
        let needed = self.config.recent_window + self.config.comparison_window;
        let history = self.tracker.get_history(id, Some(needed));
        if history.len() < needed {
            return ShiftOutcome::none();
        }

        let split = history.len() - self.config.recent_window;
        let older = &history[..split];
        let recent = &history[split..];

        let (statistic, p_value) = ks_2samp(recent, older);
        let shifted = p_value < self.config.p_value_threshold;

        let shift_type = if shifted {
            let recent_mean = mean(recent);
            let older_mean = mean(older);
            if recent_mean > older_mean + self.config.mean_shift_delta {
                ShiftType::Upward
            } else if recent_mean < older_mean - self.config.mean_shift_delta {
                ShiftType::Downward
            } else {
                ShiftType::VarianceOnly
            }
        } else {
            ShiftType::None
        };

        ShiftOutcome {
            shifted,
            statistic,
            p_value,
            shift_type,
        }
    }

    /// Record a detected shift and boost the predictor's adaptation rate
    /// for the configured number of updates.
    pub fn handle_shift(&self, id: PredictorId, outcome: ShiftOutcome) {
        let mut state = self.state.write().unwrap();
        let events = state.events.entry(id).or_default();
        events.push(ShiftEvent {
            timestamp: Utc::now(),
            shift_type: outcome.shift_type,
            test_statistic: outcome.statistic,
            p_value_threshold: self.config.p_value_threshold,
        });
        let max_events = self.config.max_shift_events;
        if events.len() > max_events {
            let excess = events.len() - max_events;
            events.drain(..excess);
        }

        state
            .boosted
            .insert(id, self.config.adaptation_boost_duration);
        drop(state);

        self.tracker.increase_adaptation_rate(
            id,
            self.config.adaptation_boost_factor,
            self.config.max_adaptation_rate,
        );

        info!(
            predictor = %id,
            shift_type = ?outcome.shift_type,
            ks_statistic = outcome.statistic,
            p_value = outcome.p_value,
            "Distribution shift detected"
        );
    }

    /// Run shift detection for every predictor, handle detections, and
    /// advance the boost countdowns. Called once per scoring cycle.
    pub fn check_and_handle_shifts(&self) -> HashMap<PredictorId, bool> {
        let mut status = HashMap::new();

        for id in PredictorId::ALL {
            let outcome = self.detect_shift(id);
            status.insert(id, outcome.shifted);
            if outcome.shifted {
                self.handle_shift(id, outcome);
            }
            self.tick_boost_countdown(id);
        }

        status
    }

    fn tick_boost_countdown(&self, id: PredictorId) {
        let mut state = self.state.write().unwrap();
        if let Some(countdown) = state.boosted.get_mut(&id) {
            *countdown = countdown.saturating_sub(1);
            if *countdown == 0 {
                state.boosted.remove(&id);
                drop(state);
                self.tracker.reset_adaptation_rate(id);
                debug!(predictor = %id, "Adaptation boost expired");
            }
        }
    }

    /// The most recent `n` shift events for a predictor (all when `None`).
    pub fn shift_history(&self, id: PredictorId, n: Option<usize>) -> Vec<ShiftEvent> {
        let state = self.state.read().unwrap();
        let events = match state.events.get(&id) {
            Some(e) => e,
            None => return Vec::new(),
        };
        match n {
            Some(n) if n < events.len() => events[events.len() - n..].to_vec(),
            _ => events.clone(),
        }
    }

    /// Predictors currently running with a boosted adaptation rate.
    pub fn boosted_predictors(&self) -> HashMap<PredictorId, u32> {
        self.state.read().unwrap().boosted.clone()
    }

    /// Clear the shift log (one predictor, or all when `None`).
    pub fn reset_history(&self, id: Option<PredictorId>) {
        let mut state = self.state.write().unwrap();
        match id {
            Some(id) => {
                state.events.remove(&id);
                state.boosted.remove(&id);
            }
            None => {
                state.events.clear();
                state.boosted.clear();
            }
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Two-sample Kolmogorov-Smirnov test.
///
/// Returns the supremum distance between the empirical CDFs and the
/// asymptotic p-value. O(n log n) in the combined window size.
pub fn ks_2samp(a: &[f64], b: &[f64]) -> (f64, f64) {
    if a.is_empty() || b.is_empty() {
        return (0.0, 1.0);
    }

    let mut xs = a.to_vec();
    let mut ys = b.to_vec();
    xs.sort_by(|p, q| p.partial_cmp(q).unwrap());
    ys.sort_by(|p, q| p.partial_cmp(q).unwrap());

    let n1 = xs.len() as f64;
    let n2 = ys.len() as f64;
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;

    while i < xs.len() && j < ys.len() {
        let x = xs[i];
        let y = ys[j];
        if x <= y {
            i += 1;
        }
        if y <= x {
            j += 1;
        }
        let diff = (i as f64 / n1 - j as f64 / n2).abs();
        if diff > d {
            d = diff;
        }
    }

    let ne = n1 * n2 / (n1 + n2);
    let lambda = (ne.sqrt() + 0.12 + 0.11 / ne.sqrt()) * d;
    (d, ks_survival(lambda))
}

/// Asymptotic KS survival function Q(lambda) = 2 * sum (-1)^{k-1} e^{-2 k^2 lambda^2}.
fn ks_survival(lambda: f64) -> f64 {
    if lambda < 1e-9 {
        return 1.0;
    }
    let mut sum = 0.0;
    let mut sign = 1.0;
    for k in 1..=100 {
        let term = (-2.0 * (k as f64 * lambda).powi(2)).exp();
        sum += sign * term;
        sign = -sign;
        if term < 1e-12 {
            break;
        }
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ShiftConfig, TrackerConfig};

    fn detector_with_tracker() -> (ShiftDetector, Arc<StatisticsTracker>) {
        let tracker = Arc::new(StatisticsTracker::new(TrackerConfig::default()));
        let detector = ShiftDetector::new(tracker.clone(), ShiftConfig::default());
        (detector, tracker)
    }

    fn feed(tracker: &StatisticsTracker, id: PredictorId, values: impl Iterator<Item = f64>) {
        for v in values {
            let mut predictions = HashMap::new();
            predictions.insert(id, v);
            tracker.update(&predictions);
        }
    }

    #[test]
    fn test_ks_identical_samples_no_shift() {
        let a: Vec<f64> = (0..100).map(|i| i as f64 / 100.0).collect();
        let (d, p) = ks_2samp(&a, &a);
        assert!(d < 1e-9);
        assert!(p > 0.99);
    }

    #[test]
    fn test_ks_disjoint_samples_strong_shift() {
        let a: Vec<f64> = (0..100).map(|i| 0.1 + i as f64 * 1e-4).collect();
        let b: Vec<f64> = (0..100).map(|i| 0.8 + i as f64 * 1e-4).collect();
        let (d, p) = ks_2samp(&a, &b);
        assert!((d - 1.0).abs() < 1e-9);
        assert!(p < 1e-6);
    }

    #[test]
    fn test_insufficient_history_reports_no_shift() {
        let (detector, tracker) = detector_with_tracker();
        // Bootstrap leaves 100 samples; the test needs 300.
        feed(&tracker, PredictorId::Xgboost, (0..50).map(|_| 0.2));

        let outcome = detector.detect_shift(PredictorId::Xgboost);
        assert!(!outcome.shifted);
        assert_eq!(outcome.shift_type, ShiftType::None);
    }

    #[test]
    fn test_step_change_detected_as_upward_shift() {
        let (detector, tracker) = detector_with_tracker();
        // 200 samples near 0.2, then 100 near 0.6. Small deterministic
        // jitter keeps the ECDFs well-formed.
        feed(
            &tracker,
            PredictorId::Xgboost,
            (0..200).map(|i| 0.2 + (i % 10) as f64 * 1e-3),
        );
        feed(
            &tracker,
            PredictorId::Xgboost,
            (0..100).map(|i| 0.6 + (i % 10) as f64 * 1e-3),
        );

        let outcome = detector.detect_shift(PredictorId::Xgboost);
        assert!(outcome.shifted);
        assert_eq!(outcome.shift_type, ShiftType::Upward);
        assert!(outcome.statistic > 0.5);
    }

    #[test]
    fn test_handle_shift_boosts_adaptation_and_logs_event() {
        let (detector, tracker) = detector_with_tracker();
        let outcome = ShiftOutcome {
            shifted: true,
            statistic: 0.8,
            p_value: 0.001,
            shift_type: ShiftType::Upward,
        };
        detector.handle_shift(PredictorId::Lstm, outcome);

        assert!((tracker.adaptation_rate(PredictorId::Lstm) - 0.05).abs() < 1e-12);
        let events = detector.shift_history(PredictorId::Lstm, None);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].shift_type, ShiftType::Upward);
        assert_eq!(detector.boosted_predictors().get(&PredictorId::Lstm), Some(&100));
    }

    #[test]
    fn test_boost_countdown_resets_rate() {
        let tracker = Arc::new(StatisticsTracker::new(TrackerConfig::default()));
        let config = ShiftConfig {
            adaptation_boost_duration: 3,
            ..ShiftConfig::default()
        };
        let detector = ShiftDetector::new(tracker.clone(), config);

        let outcome = ShiftOutcome {
            shifted: true,
            statistic: 0.5,
            p_value: 0.01,
            shift_type: ShiftType::VarianceOnly,
        };
        detector.handle_shift(PredictorId::Cnn, outcome);
        assert!(tracker.adaptation_rate(PredictorId::Cnn) > 0.01);

        for _ in 0..3 {
            detector.tick_boost_countdown(PredictorId::Cnn);
        }
        assert!((tracker.adaptation_rate(PredictorId::Cnn) - 0.01).abs() < 1e-12);
        assert!(detector.boosted_predictors().is_empty());
    }

    #[test]
    fn test_shift_event_log_is_bounded() {
        let (detector, _tracker) = detector_with_tracker();
        let outcome = ShiftOutcome {
            shifted: true,
            statistic: 0.4,
            p_value: 0.01,
            shift_type: ShiftType::Downward,
        };
        for _ in 0..60 {
            detector.handle_shift(PredictorId::Fnn, outcome);
        }
        assert_eq!(detector.shift_history(PredictorId::Fnn, None).len(), 50);
    }
}
