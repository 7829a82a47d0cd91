//! Adaptive normalization of live predictions
//!
//! Base predictors were calibrated against their training distribution,
//! but live traffic drifts. Once enough live evidence accumulates, each
//! raw prediction is standardized against the predictor's current
//! statistics and rescaled into its training-time baseline, then blended
//! with the raw value by a confidence score so that thin evidence defaults
//! to the training-calibrated behavior.

use crate::config::NormalizerConfig;
use crate::stats::tracker::StatisticsTracker;
use crate::types::predictor::PredictorId;
use std::collections::HashMap;
use std::sync::Arc;

/// Floor for the live std used in standardization.
const MIN_STD: f64 = 0.01;

/// Diagnostic record of one normalization step.
#[derive(Debug, Clone)]
pub struct NormalizationInfo {
    pub predictor: PredictorId,
    pub raw: f64,
    pub z_score: f64,
    pub normalized: f64,
    pub blended: f64,
    pub confidence: f64,
    pub sample_count: u64,
}

/// Rescales live predictions toward each predictor's training baseline.
pub struct AdaptiveNormalizer {
    tracker: Arc<StatisticsTracker>,
    config: NormalizerConfig,
}

impl AdaptiveNormalizer {
    pub fn new(tracker: Arc<StatisticsTracker>, config: NormalizerConfig) -> Self {
        Self { tracker, config }
    }

    /// Map each raw prediction from the predictor's current distribution
    /// into its training baseline. Predictors with fewer than
    /// `min_samples` live samples pass through unchanged.
    pub fn normalize(&self, raw: &HashMap<PredictorId, f64>) -> HashMap<PredictorId, f64> {
        raw.iter()
            .map(|(&id, &value)| (id, self.normalize_one(id, value)))
            .collect()
    }

    fn normalize_one(&self, id: PredictorId, raw: f64) -> f64 {
        if !(0.0..=1.0).contains(&raw) {
            return raw.clamp(0.0, 1.0);
        }

        let stats = self.tracker.get_statistics(id);
        if stats.count < self.config.min_samples {
            return raw;
        }

        let baseline = id.baseline();
        let z = (raw - stats.mean) / stats.std.max(MIN_STD);
        let z = z.clamp(-self.config.z_clip, self.config.z_clip);
        (z * baseline.std + baseline.mean).clamp(0.0, 1.0)
    }

    /// Confidence in the normalization for a predictor, in [0, 1].
    ///
    /// Combines a sigmoid of the live sample count (weight 0.7) with a
    /// stability term comparing the recent window's std to the overall
    /// std (weight 0.3).
    pub fn calculate_confidence(&self, id: PredictorId) -> f64 {
        let stats = self.tracker.get_statistics(id);

        let midpoint = self.config.confidence_saturation as f64 / 2.0;
        let sample_confidence = 1.0 / (1.0 + (-(stats.count as f64 - midpoint) / 100.0).exp());

        let recent = self.tracker.get_history(id, Some(100));
        let stability = if recent.len() > 10 {
            let recent_mean = recent.iter().sum::<f64>() / recent.len() as f64;
            let recent_var = recent
                .iter()
                .map(|v| (v - recent_mean).powi(2))
                .sum::<f64>()
                / recent.len() as f64;
            let recent_std = recent_var.sqrt();
            let diff = (recent_std - stats.std).abs() / (stats.std + 0.01);
            1.0 / (1.0 + diff * 5.0)
        } else {
            0.5
        };

        (0.7 * sample_confidence + 0.3 * stability).clamp(0.0, 1.0)
    }

    /// Blend raw and normalized predictions by per-predictor confidence.
    ///
    /// Returns the blended predictions and the confidence scores used.
    pub fn adaptive_normalize(
        &self,
        raw: &HashMap<PredictorId, f64>,
    ) -> (HashMap<PredictorId, f64>, HashMap<PredictorId, f64>) {
        let normalized = self.normalize(raw);

        let mut blended = HashMap::with_capacity(raw.len());
        let mut confidences = HashMap::with_capacity(raw.len());

        for (&id, &raw_value) in raw {
            let confidence = self.calculate_confidence(id);
            let norm_value = normalized.get(&id).copied().unwrap_or(raw_value);
            blended.insert(id, confidence * norm_value + (1.0 - confidence) * raw_value);
            confidences.insert(id, confidence);
        }

        (blended, confidences)
    }

    /// Whether normalization applies for a predictor yet.
    pub fn should_normalize(&self, id: PredictorId) -> bool {
        self.tracker.get_statistics(id).count >= self.config.min_samples
    }

    /// Detailed breakdown of one normalization, for logging and tests.
    pub fn normalization_info(&self, id: PredictorId, raw: f64) -> NormalizationInfo {
        let stats = self.tracker.get_statistics(id);
        let baseline = id.baseline();

        let (z, normalized) = if stats.count >= self.config.min_samples {
            let z = ((raw - stats.mean) / stats.std.max(MIN_STD))
                .clamp(-self.config.z_clip, self.config.z_clip);
            (z, (z * baseline.std + baseline.mean).clamp(0.0, 1.0))
        } else {
            (0.0, raw)
        };

        let confidence = self.calculate_confidence(id);
        NormalizationInfo {
            predictor: id,
            raw,
            z_score: z,
            normalized,
            blended: confidence * normalized + (1.0 - confidence) * raw,
            confidence,
            sample_count: stats.count,
        }
    }
}
