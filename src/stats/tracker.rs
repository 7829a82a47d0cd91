//! Per-predictor online statistics tracking
//!
//! Maintains a bounded rolling history and EMA summary statistics for each
//! base predictor. On first run the tracker seeds itself with synthetic
//! samples drawn from each predictor's training distribution so that
//! normalization is usable from the very first real prediction.

use crate::config::TrackerConfig;
use crate::types::predictor::PredictorId;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Minimum variance kept in the EMA update; the std never reaches zero.
const MIN_VARIANCE: f64 = 1e-6;

/// Live summary statistics for one predictor's output stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub count: u64,
    pub last_updated: DateTime<Utc>,
}

impl PredictorStats {
    fn from_baseline(id: PredictorId) -> Self {
        let baseline = id.baseline();
        Self {
            mean: baseline.mean,
            std: baseline.std,
            min: baseline.min,
            max: baseline.max,
            count: 0,
            last_updated: Utc::now(),
        }
    }
}

/// Serializable snapshot of the tracker state.
///
/// Histories are not persisted; after a restart shift detection waits for
/// fresh traffic while normalization keeps working off the summary stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub statistics: HashMap<PredictorId, PredictorStats>,
    pub alpha: HashMap<PredictorId, f64>,
    pub update_count: u64,
    pub window_size: usize,
}

struct TrackerState {
    stats: HashMap<PredictorId, PredictorStats>,
    history: HashMap<PredictorId, VecDeque<f64>>,
    alpha: HashMap<PredictorId, f64>,
    update_count: u64,
}

/// Tracks prediction statistics for every base predictor.
///
/// Shared across concurrent scoring calls; the EMA update holds a write
/// lock only for the short critical section, reads take lock-protected
/// snapshots.
pub struct StatisticsTracker {
    state: RwLock<TrackerState>,
    config: TrackerConfig,
}

impl StatisticsTracker {
    /// Create a tracker bootstrapped from the training distributions.
    pub fn new(config: TrackerConfig) -> Self {
        let tracker = Self {
            state: RwLock::new(TrackerState {
                stats: HashMap::new(),
                history: HashMap::new(),
                alpha: HashMap::new(),
                update_count: 0,
            }),
            config,
        };
        tracker.bootstrap();
        tracker
    }

    /// Restore a tracker from a persisted snapshot, or bootstrap when the
    /// snapshot is missing or unreadable. Never fails: losing a snapshot
    /// is acceptable, losing availability is not.
    pub fn load_or_bootstrap(config: TrackerConfig) -> Self {
        if let Some(path) = config.stats_path.clone() {
            if path.exists() {
                match Self::load_snapshot(&path) {
                    Ok(snapshot) => {
                        info!(
                            path = %path.display(),
                            updates = snapshot.update_count,
                            "Restored prediction statistics"
                        );
                        return Self::from_snapshot(snapshot, config);
                    }
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to load statistics snapshot, bootstrapping"
                        );
                    }
                }
            }
        }
        Self::new(config)
    }

    /// Build a tracker from a snapshot. Predictors missing from the
    /// snapshot fall back to their training baseline with a zero count.
    pub fn from_snapshot(snapshot: TrackerSnapshot, config: TrackerConfig) -> Self {
        let mut stats = snapshot.statistics;
        let mut alpha = snapshot.alpha;
        let mut history = HashMap::new();
        for id in PredictorId::ALL {
            stats
                .entry(id)
                .or_insert_with(|| PredictorStats::from_baseline(id));
            alpha.entry(id).or_insert(config.ema_alpha);
            history.insert(id, VecDeque::with_capacity(config.window_size));
        }

        Self {
            state: RwLock::new(TrackerState {
                stats,
                history,
                alpha,
                update_count: snapshot.update_count,
            }),
            config,
        }
    }

    fn load_snapshot(path: &Path) -> Result<TrackerSnapshot> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Seed every predictor with synthetic Gaussian samples matching its
    /// training distribution, clipped to the baseline range.
    fn bootstrap(&self) {
        let n = self.config.bootstrap_samples;
        let mut rng = rand::thread_rng();
        let mut state = self.state.write().unwrap();

        for id in PredictorId::ALL {
            let baseline = id.baseline();
            let normal = match Normal::new(baseline.mean, baseline.std) {
                Ok(d) => d,
                Err(_) => {
                    state.stats.insert(id, PredictorStats::from_baseline(id));
                    state
                        .history
                        .insert(id, VecDeque::with_capacity(self.config.window_size));
                    state.alpha.insert(id, self.config.ema_alpha);
                    continue;
                }
            };

            let samples: Vec<f64> = (0..n)
                .map(|_| normal.sample(&mut rng).clamp(baseline.min, baseline.max))
                .collect();

            let mean = samples.iter().sum::<f64>() / samples.len().max(1) as f64;
            let variance = samples
                .iter()
                .map(|s| (s - mean).powi(2))
                .sum::<f64>()
                / samples.len().max(1) as f64;
            let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
            let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            state.stats.insert(
                id,
                PredictorStats {
                    mean,
                    std: variance.max(MIN_VARIANCE).sqrt(),
                    min,
                    max,
                    count: samples.len() as u64,
                    last_updated: Utc::now(),
                },
            );

            let mut window = VecDeque::with_capacity(self.config.window_size);
            window.extend(samples);
            state.history.insert(id, window);
            state.alpha.insert(id, self.config.ema_alpha);
        }

        info!(
            samples_per_predictor = n,
            "Bootstrapped statistics from training distributions"
        );
    }

    /// Record one round of predictions and update the EMA statistics.
    ///
    /// Values outside [0, 1] or non-finite are skipped for that predictor;
    /// the rest of the batch still lands. Returns the total update count.
    pub fn update(&self, predictions: &HashMap<PredictorId, f64>) -> u64 {
        let mut state = self.state.write().unwrap();

        for (&id, &prediction) in predictions {
            if !prediction.is_finite() || !(0.0..=1.0).contains(&prediction) {
                debug!(predictor = %id, value = prediction, "Skipping invalid prediction");
                continue;
            }

            let window = state
                .history
                .entry(id)
                .or_insert_with(|| VecDeque::with_capacity(self.config.window_size));
            if window.len() == self.config.window_size {
                window.pop_front();
            }
            window.push_back(prediction);

            let alpha = state.alpha.get(&id).copied().unwrap_or(self.config.ema_alpha);
            let entry = state
                .stats
                .entry(id)
                .or_insert_with(|| PredictorStats::from_baseline(id));

            let new_mean = alpha * prediction + (1.0 - alpha) * entry.mean;
            let variance = entry.std * entry.std;
            let new_variance =
                alpha * (prediction - new_mean).powi(2) + (1.0 - alpha) * variance;

            entry.mean = new_mean;
            entry.std = new_variance.max(MIN_VARIANCE).sqrt();
            entry.min = entry.min.min(prediction);
            entry.max = entry.max.max(prediction);
            entry.count += 1;
            entry.last_updated = Utc::now();
        }

        state.update_count += 1;
        state.update_count
    }

    /// Current statistics for a predictor.
    pub fn get_statistics(&self, id: PredictorId) -> PredictorStats {
        let state = self.state.read().unwrap();
        state
            .stats
            .get(&id)
            .cloned()
            .unwrap_or_else(|| PredictorStats::from_baseline(id))
    }

    /// Statistics for all predictors.
    pub fn get_all_statistics(&self) -> HashMap<PredictorId, PredictorStats> {
        self.state.read().unwrap().stats.clone()
    }

    /// The most recent `n` predictions for a predictor (all when `None`).
    pub fn get_history(&self, id: PredictorId, n: Option<usize>) -> Vec<f64> {
        let state = self.state.read().unwrap();
        let window = match state.history.get(&id) {
            Some(w) => w,
            None => return Vec::new(),
        };
        match n {
            Some(n) if n < window.len() => window.iter().skip(window.len() - n).copied().collect(),
            _ => window.iter().copied().collect(),
        }
    }

    /// History length for a predictor.
    pub fn history_len(&self, id: PredictorId) -> usize {
        let state = self.state.read().unwrap();
        state.history.get(&id).map(|w| w.len()).unwrap_or(0)
    }

    /// Reset one predictor back to its training baseline, clearing history.
    pub fn reset(&self, id: PredictorId) {
        let mut state = self.state.write().unwrap();
        state.stats.insert(id, PredictorStats::from_baseline(id));
        if let Some(window) = state.history.get_mut(&id) {
            window.clear();
        }
        state.alpha.insert(id, self.config.ema_alpha);
        info!(predictor = %id, "Reset statistics to training baseline");
    }

    /// Reset every predictor.
    pub fn reset_all(&self) {
        for id in PredictorId::ALL {
            self.reset(id);
        }
    }

    /// Current EMA decay rate for a predictor.
    pub fn adaptation_rate(&self, id: PredictorId) -> f64 {
        let state = self.state.read().unwrap();
        state.alpha.get(&id).copied().unwrap_or(self.config.ema_alpha)
    }

    /// Multiply a predictor's adaptation rate, capped at `max_rate`.
    /// Used by the shift detector to adapt faster after a shift.
    pub fn increase_adaptation_rate(&self, id: PredictorId, factor: f64, max_rate: f64) {
        let mut state = self.state.write().unwrap();
        let current = state.alpha.get(&id).copied().unwrap_or(self.config.ema_alpha);
        let boosted = (current * factor).min(max_rate);
        state.alpha.insert(id, boosted);
        info!(predictor = %id, alpha = boosted, "Increased adaptation rate");
    }

    /// Restore a predictor's adaptation rate to the configured baseline.
    pub fn reset_adaptation_rate(&self, id: PredictorId) {
        let mut state = self.state.write().unwrap();
        state.alpha.insert(id, self.config.ema_alpha);
        debug!(predictor = %id, alpha = self.config.ema_alpha, "Adaptation rate normalized");
    }

    /// Total number of `update` calls across the tracker's lifetime.
    pub fn update_count(&self) -> u64 {
        self.state.read().unwrap().update_count
    }

    /// Serializable snapshot of the current statistics.
    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.state.read().unwrap();
        TrackerSnapshot {
            statistics: state.stats.clone(),
            alpha: state.alpha.clone(),
            update_count: state.update_count,
            window_size: self.config.window_size,
        }
    }

    /// Persist the current snapshot as JSON.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let snapshot = self.snapshot();
        save_snapshot(&snapshot, path.as_ref())
    }
}

/// Write a snapshot to disk. Split out so the service can persist a
/// cloned snapshot off the hot path.
pub fn save_snapshot(snapshot: &TrackerSnapshot, path: &Path) -> Result<()> {
    let data = serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;
    std::fs::write(path, data)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(path = %path.display(), updates = snapshot.update_count, "Saved statistics snapshot");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;

    fn tracker() -> StatisticsTracker {
        StatisticsTracker::new(TrackerConfig::default())
    }

    #[test]
    fn test_bootstrap_seeds_every_predictor() {
        let tracker = tracker();
        for id in PredictorId::ALL {
            let stats = tracker.get_statistics(id);
            assert_eq!(stats.count, 100);
            assert!(stats.std > 0.0);
            assert_eq!(tracker.history_len(id), 100);
            // Seeded samples stay inside the baseline range.
            let baseline = id.baseline();
            for v in tracker.get_history(id, None) {
                assert!(v >= baseline.min && v <= baseline.max);
            }
        }
    }

    #[test]
    fn test_update_applies_ema() {
        let tracker = tracker();
        let before = tracker.get_statistics(PredictorId::Xgboost);

        let mut predictions = HashMap::new();
        predictions.insert(PredictorId::Xgboost, 0.9);
        tracker.update(&predictions);

        let after = tracker.get_statistics(PredictorId::Xgboost);
        assert_eq!(after.count, before.count + 1);
        assert!(after.mean > before.mean);
        assert!(after.max >= 0.9);
        let expected_mean = 0.01 * 0.9 + 0.99 * before.mean;
        assert!((after.mean - expected_mean).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_predictions_are_skipped() {
        let tracker = tracker();
        let before = tracker.get_statistics(PredictorId::Cnn);

        let mut predictions = HashMap::new();
        predictions.insert(PredictorId::Cnn, 1.5);
        predictions.insert(PredictorId::Lstm, f64::NAN);
        tracker.update(&predictions);

        assert_eq!(tracker.get_statistics(PredictorId::Cnn).count, before.count);
        assert_eq!(tracker.get_statistics(PredictorId::Lstm).count, 100);
    }

    #[test]
    fn test_history_is_bounded() {
        let config = TrackerConfig {
            window_size: 150,
            ..TrackerConfig::default()
        };
        let tracker = StatisticsTracker::new(config);

        let mut predictions = HashMap::new();
        for i in 0..200 {
            predictions.insert(PredictorId::Catboost, (i % 100) as f64 / 100.0);
            tracker.update(&predictions);
        }

        assert_eq!(tracker.history_len(PredictorId::Catboost), 150);
        // Oldest entries evicted first: the tail matches the last pushes.
        let history = tracker.get_history(PredictorId::Catboost, Some(1));
        assert!((history[0] - 0.99).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_round_trip_is_idempotent() {
        let tracker = tracker();
        let mut predictions = HashMap::new();
        for i in 0..20 {
            predictions.insert(PredictorId::Lightgbm, i as f64 / 20.0);
            tracker.update(&predictions);
        }

        let snapshot = tracker.snapshot();
        let restored = StatisticsTracker::from_snapshot(snapshot.clone(), TrackerConfig::default());

        for id in PredictorId::ALL {
            let a = tracker.get_statistics(id);
            let b = restored.get_statistics(id);
            assert!((a.mean - b.mean).abs() < 1e-12);
            assert!((a.std - b.std).abs() < 1e-12);
            assert_eq!(a.count, b.count);
        }
        assert_eq!(restored.update_count(), tracker.update_count());

        // A second snapshot with no intervening updates is identical.
        let again = restored.snapshot();
        assert_eq!(
            serde_json::to_string(&snapshot.statistics).unwrap().len(),
            serde_json::to_string(&again.statistics).unwrap().len()
        );
    }

    #[test]
    fn test_save_and_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prediction_stats.json");

        let tracker = tracker();
        let mut predictions = HashMap::new();
        predictions.insert(PredictorId::Fnn, 0.4);
        tracker.update(&predictions);
        tracker.save_to_path(&path).unwrap();

        let config = TrackerConfig {
            stats_path: Some(path),
            ..TrackerConfig::default()
        };
        let restored = StatisticsTracker::load_or_bootstrap(config);
        assert_eq!(restored.update_count(), 1);
        assert_eq!(restored.get_statistics(PredictorId::Fnn).count, 101);
    }

    #[test]
    fn test_corrupt_snapshot_falls_back_to_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prediction_stats.json");
        std::fs::write(&path, "not json at all").unwrap();

        let config = TrackerConfig {
            stats_path: Some(path),
            ..TrackerConfig::default()
        };
        let tracker = StatisticsTracker::load_or_bootstrap(config);
        assert_eq!(tracker.update_count(), 0);
        assert_eq!(tracker.get_statistics(PredictorId::Xgboost).count, 100);
    }

    #[test]
    fn test_adaptation_rate_boost_is_capped() {
        let tracker = tracker();
        tracker.increase_adaptation_rate(PredictorId::Bilstm, 5.0, 0.1);
        assert!((tracker.adaptation_rate(PredictorId::Bilstm) - 0.05).abs() < 1e-12);
        tracker.increase_adaptation_rate(PredictorId::Bilstm, 5.0, 0.1);
        assert!((tracker.adaptation_rate(PredictorId::Bilstm) - 0.1).abs() < 1e-12);
        tracker.reset_adaptation_rate(PredictorId::Bilstm);
        assert!((tracker.adaptation_rate(PredictorId::Bilstm) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_reset_restores_baseline() {
        let tracker = tracker();
        let mut predictions = HashMap::new();
        predictions.insert(PredictorId::HybridDl, 0.95);
        tracker.update(&predictions);

        tracker.reset(PredictorId::HybridDl);
        let stats = tracker.get_statistics(PredictorId::HybridDl);
        let baseline = PredictorId::HybridDl.baseline();
        assert_eq!(stats.count, 0);
        assert!((stats.mean - baseline.mean).abs() < 1e-12);
        assert_eq!(tracker.history_len(PredictorId::HybridDl), 0);
    }
}
