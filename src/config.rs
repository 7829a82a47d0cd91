//! Configuration for the scoring core
//!
//! Every heuristic constant the boost and classification layers consume
//! lives here, so tuning never touches control flow. All sections have
//! defaults matching production calibration; a TOML file can override any
//! subset.

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Strategy used to combine base predictions into one score.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CombinerStrategy {
    /// Fixed reliability-weight ensemble (production default).
    #[default]
    WeightedEnsemble,
    /// Trained meta-learner over the normalized prediction vector.
    MetaLearner,
}

/// Top-level scoring configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScoringConfig {
    #[serde(default)]
    pub combiner: CombinerStrategy,
    /// Blend live predictions toward the training distribution before
    /// combining. Off by default: the weighted ensemble path consumes raw
    /// predictions, matching its calibration.
    #[serde(default)]
    pub adaptive_normalization: bool,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub shift: ShiftConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub boost: BoostConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// Online statistics tracking configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Rolling prediction history kept per predictor.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Baseline EMA decay rate.
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,
    /// Synthetic samples seeded per predictor on first run.
    #[serde(default = "default_bootstrap_samples")]
    pub bootstrap_samples: usize,
    /// Persist a snapshot every this many updates.
    #[serde(default = "default_auto_save_interval")]
    pub auto_save_interval: u64,
    /// Snapshot file path. Persistence is disabled when unset.
    #[serde(default)]
    pub stats_path: Option<PathBuf>,
}

fn default_window_size() -> usize {
    1000
}

fn default_ema_alpha() -> f64 {
    0.01
}

fn default_bootstrap_samples() -> usize {
    100
}

fn default_auto_save_interval() -> u64 {
    100
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            ema_alpha: default_ema_alpha(),
            bootstrap_samples: default_bootstrap_samples(),
            auto_save_interval: default_auto_save_interval(),
            stats_path: None,
        }
    }
}

/// Distribution shift detection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ShiftConfig {
    /// Significance level for the two-sample KS test.
    #[serde(default = "default_p_value_threshold")]
    pub p_value_threshold: f64,
    /// Size of the recent window.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    /// Size of the immediately preceding comparison window.
    #[serde(default = "default_comparison_window")]
    pub comparison_window: usize,
    /// Mean delta separating upward/downward shifts from variance-only.
    #[serde(default = "default_mean_shift_delta")]
    pub mean_shift_delta: f64,
    /// Adaptation-rate multiplier applied on detection.
    #[serde(default = "default_adaptation_boost_factor")]
    pub adaptation_boost_factor: f64,
    /// Hard cap on the boosted adaptation rate.
    #[serde(default = "default_max_adaptation_rate")]
    pub max_adaptation_rate: f64,
    /// Updates until the boosted rate resets to baseline.
    #[serde(default = "default_adaptation_boost_duration")]
    pub adaptation_boost_duration: u32,
    /// Shift events retained per predictor.
    #[serde(default = "default_max_shift_events")]
    pub max_shift_events: usize,
}

fn default_p_value_threshold() -> f64 {
    0.05
}

fn default_recent_window() -> usize {
    100
}

fn default_comparison_window() -> usize {
    200
}

fn default_mean_shift_delta() -> f64 {
    0.1
}

fn default_adaptation_boost_factor() -> f64 {
    5.0
}

fn default_max_adaptation_rate() -> f64 {
    0.1
}

fn default_adaptation_boost_duration() -> u32 {
    100
}

fn default_max_shift_events() -> usize {
    50
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            p_value_threshold: default_p_value_threshold(),
            recent_window: default_recent_window(),
            comparison_window: default_comparison_window(),
            mean_shift_delta: default_mean_shift_delta(),
            adaptation_boost_factor: default_adaptation_boost_factor(),
            max_adaptation_rate: default_max_adaptation_rate(),
            adaptation_boost_duration: default_adaptation_boost_duration(),
            max_shift_events: default_max_shift_events(),
        }
    }
}

/// Adaptive normalization configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NormalizerConfig {
    /// Live samples required before normalization is trusted at all.
    #[serde(default = "default_min_samples")]
    pub min_samples: u64,
    /// Sample count at which sample confidence saturates near 1.
    #[serde(default = "default_confidence_saturation")]
    pub confidence_saturation: u64,
    /// Z-scores are clipped to this magnitude before rescaling.
    #[serde(default = "default_z_clip")]
    pub z_clip: f64,
}

fn default_min_samples() -> u64 {
    50
}

fn default_confidence_saturation() -> u64 {
    500
}

fn default_z_clip() -> f64 {
    3.0
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            confidence_saturation: default_confidence_saturation(),
            z_clip: default_z_clip(),
        }
    }
}

/// One tier of an amount- or rate-keyed boost table. Tiers are evaluated
/// in order; the first whose threshold is exceeded wins.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BoostTier {
    pub threshold: f64,
    pub boost: f64,
}

/// Contextual risk boosting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BoostConfig {
    /// Foreign-origin boosts, keyed by amount. Descending thresholds.
    #[serde(default = "default_foreign_tiers")]
    pub foreign_tiers: Vec<BoostTier>,
    /// Velocity boosts, keyed by transactions/hour. Descending thresholds.
    #[serde(default = "default_velocity_tiers")]
    pub velocity_tiers: Vec<BoostTier>,
    /// Amount-spike boosts, keyed by ratio to the account's historical
    /// average. Descending thresholds.
    #[serde(default = "default_spike_tiers")]
    pub spike_tiers: Vec<BoostTier>,
    /// Off-hours window start, inclusive.
    #[serde(default = "default_unusual_hour_start")]
    pub unusual_hour_start: u8,
    /// Off-hours window end, inclusive.
    #[serde(default = "default_unusual_hour_end")]
    pub unusual_hour_end: u8,
    /// Minimum amount for the off-hours boost to fire.
    #[serde(default = "default_unusual_hour_min_amount")]
    pub unusual_hour_min_amount: f64,
    /// Off-hours boost size.
    #[serde(default = "default_unusual_hour_boost")]
    pub unusual_hour_boost: f64,
    /// Account-novelty boosts.
    #[serde(default)]
    pub new_account: NewAccountBoostConfig,
    /// Boosted scores never exceed this cap.
    #[serde(default = "default_score_cap")]
    pub score_cap: f64,
}

/// Account-novelty boost bands. Unlike the other factors these are
/// absolute boosts, not headroom-scaled, so a legitimate small first
/// purchase stays under the safe threshold.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccountBoostConfig {
    /// History length at or below which the account counts as new.
    #[serde(default = "default_new_account_max_events")]
    pub max_events: usize,
    /// Amount-keyed boosts for an account's first transaction.
    /// Descending thresholds.
    #[serde(default = "default_first_purchase_tiers")]
    pub first_purchase_tiers: Vec<BoostTier>,
    /// Base score above which the elevated boost applies instead of the
    /// floor boost.
    #[serde(default = "default_elevated_base_score")]
    pub elevated_base_score: f64,
    /// First-transaction boost when the base score is elevated but the
    /// amount misses every tier.
    #[serde(default = "default_first_purchase_elevated_boost")]
    pub first_purchase_elevated_boost: f64,
    /// First-transaction floor boost.
    #[serde(default = "default_first_purchase_floor_boost")]
    pub first_purchase_floor_boost: f64,
    /// Amount-keyed boosts while the history is still short.
    /// Descending thresholds.
    #[serde(default = "default_early_account_tiers")]
    pub early_account_tiers: Vec<BoostTier>,
    /// Short-history boost when the base score is elevated but the
    /// amount misses every tier.
    #[serde(default = "default_early_account_elevated_boost")]
    pub early_account_elevated_boost: f64,
    /// Short-history floor boost.
    #[serde(default = "default_early_account_floor_boost")]
    pub early_account_floor_boost: f64,
}

fn default_first_purchase_tiers() -> Vec<BoostTier> {
    vec![
        BoostTier { threshold: 500.0, boost: 0.15 },
        BoostTier { threshold: 150.0, boost: 0.08 },
    ]
}

fn default_elevated_base_score() -> f64 {
    0.2
}

fn default_first_purchase_elevated_boost() -> f64 {
    0.05
}

fn default_first_purchase_floor_boost() -> f64 {
    0.02
}

fn default_early_account_tiers() -> Vec<BoostTier> {
    vec![BoostTier { threshold: 300.0, boost: 0.05 }]
}

fn default_early_account_elevated_boost() -> f64 {
    0.03
}

fn default_early_account_floor_boost() -> f64 {
    0.01
}

impl Default for NewAccountBoostConfig {
    fn default() -> Self {
        Self {
            max_events: default_new_account_max_events(),
            first_purchase_tiers: default_first_purchase_tiers(),
            elevated_base_score: default_elevated_base_score(),
            first_purchase_elevated_boost: default_first_purchase_elevated_boost(),
            first_purchase_floor_boost: default_first_purchase_floor_boost(),
            early_account_tiers: default_early_account_tiers(),
            early_account_elevated_boost: default_early_account_elevated_boost(),
            early_account_floor_boost: default_early_account_floor_boost(),
        }
    }
}

fn default_foreign_tiers() -> Vec<BoostTier> {
    vec![
        BoostTier { threshold: 5000.0, boost: 0.35 },
        BoostTier { threshold: 1000.0, boost: 0.25 },
        BoostTier { threshold: 0.0, boost: 0.15 },
    ]
}

fn default_velocity_tiers() -> Vec<BoostTier> {
    vec![
        BoostTier { threshold: 2.0, boost: 0.50 },
        BoostTier { threshold: 1.5, boost: 0.40 },
        BoostTier { threshold: 1.0, boost: 0.30 },
        BoostTier { threshold: 0.5, boost: 0.15 },
    ]
}

fn default_spike_tiers() -> Vec<BoostTier> {
    vec![
        BoostTier { threshold: 50.0, boost: 0.30 },
        BoostTier { threshold: 20.0, boost: 0.20 },
        BoostTier { threshold: 10.0, boost: 0.10 },
        BoostTier { threshold: 8.0, boost: 0.08 },
    ]
}

fn default_unusual_hour_start() -> u8 {
    2
}

fn default_unusual_hour_end() -> u8 {
    5
}

fn default_unusual_hour_min_amount() -> f64 {
    500.0
}

fn default_unusual_hour_boost() -> f64 {
    0.15
}

fn default_new_account_max_events() -> usize {
    3
}

fn default_score_cap() -> f64 {
    0.99
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            foreign_tiers: default_foreign_tiers(),
            velocity_tiers: default_velocity_tiers(),
            spike_tiers: default_spike_tiers(),
            unusual_hour_start: default_unusual_hour_start(),
            unusual_hour_end: default_unusual_hour_end(),
            unusual_hour_min_amount: default_unusual_hour_min_amount(),
            unusual_hour_boost: default_unusual_hour_boost(),
            new_account: NewAccountBoostConfig::default(),
            score_cap: default_score_cap(),
        }
    }
}

/// Three-tier classification configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Scores below this are safe.
    #[serde(default = "default_safe_threshold")]
    pub safe_threshold: f64,
    /// Scores at or above this are fraud.
    #[serde(default = "default_fraud_threshold")]
    pub fraud_threshold: f64,
    /// Trusted-merchant override applies below this amount.
    #[serde(default = "default_trusted_merchant_max_amount")]
    pub trusted_merchant_max_amount: f64,
    /// Low-amount fast path applies below this amount.
    #[serde(default = "default_low_amount_max")]
    pub low_amount_max: f64,
    /// Upper bound of the mid-amount suspicious band.
    #[serde(default = "default_suspicious_amount_max")]
    pub suspicious_amount_max: f64,
    /// Amounts above this are fraud regardless of score.
    #[serde(default = "default_fraud_amount_threshold")]
    pub fraud_amount_threshold: f64,
}

fn default_safe_threshold() -> f64 {
    0.3
}

fn default_fraud_threshold() -> f64 {
    0.7
}

fn default_trusted_merchant_max_amount() -> f64 {
    100.0
}

fn default_low_amount_max() -> f64 {
    150.0
}

fn default_suspicious_amount_max() -> f64 {
    2000.0
}

fn default_fraud_amount_threshold() -> f64 {
    3000.0
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            safe_threshold: default_safe_threshold(),
            fraud_threshold: default_fraud_threshold(),
            trusted_merchant_max_amount: default_trusted_merchant_max_amount(),
            low_amount_max: default_low_amount_max(),
            suspicious_amount_max: default_suspicious_amount_max(),
            fraud_amount_threshold: default_fraud_amount_threshold(),
        }
    }
}

impl ScoringConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any missing section.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScoringConfig::default();
        assert_eq!(config.combiner, CombinerStrategy::WeightedEnsemble);
        assert!(!config.adaptive_normalization);
        assert_eq!(config.tracker.window_size, 1000);
        assert_eq!(config.shift.recent_window, 100);
        assert_eq!(config.shift.comparison_window, 200);
        assert_eq!(config.normalizer.min_samples, 50);
        assert_eq!(config.boost.velocity_tiers.len(), 4);
        assert_eq!(config.boost.new_account.max_events, 3);
        assert_eq!(config.boost.new_account.first_purchase_tiers.len(), 2);
        assert_eq!(config.classifier.fraud_amount_threshold, 3000.0);
    }

    #[test]
    fn test_boost_tiers_are_descending() {
        let config = BoostConfig::default();
        for tiers in [
            &config.foreign_tiers,
            &config.velocity_tiers,
            &config.spike_tiers,
            &config.new_account.first_purchase_tiers,
        ] {
            for pair in tiers.windows(2) {
                assert!(pair[0].threshold > pair[1].threshold);
            }
        }
    }
}
