//! Score combination strategies
//!
//! Two interchangeable combiners share one contract: the fixed
//! reliability-weight ensemble (production default) and a trained
//! meta-learner over the same prediction vector. Missing predictors are
//! substituted with a neutral 0.5 rather than dropped, so predictor
//! unavailability never lowers the risk estimate for free.

use crate::types::predictor::PredictorId;
use std::collections::HashMap;
use tracing::debug;

/// One probability per base predictor, as handed in by the inference layer.
pub type BaseModelPredictions = HashMap<PredictorId, f64>;

/// Substitute for a predictor that produced no output.
const NEUTRAL_PREDICTION: f64 = 0.5;

/// Result of combining base predictions into one score.
#[derive(Debug, Clone)]
pub struct CombinedScore {
    /// Combined risk score in [0, 1].
    pub score: f64,
    /// Per-predictor weighted contribution, retained for explainability.
    pub contributions: HashMap<PredictorId, f64>,
}

/// Shared contract for ensemble combination strategies.
pub trait ScoreCombiner: Send + Sync {
    /// Combine the prediction vector into one score with per-predictor
    /// contribution accounting. Must never fail; degraded inputs degrade
    /// to a best-effort score.
    fn combine(&self, predictions: &BaseModelPredictions) -> CombinedScore;

    fn name(&self) -> &'static str;
}

/// Fixed reliability-weight ensemble.
pub struct WeightedEnsemble {
    weights: HashMap<PredictorId, f64>,
}

impl WeightedEnsemble {
    /// Ensemble using the calibrated reliability-weight table.
    pub fn new() -> Self {
        let weights = PredictorId::ALL
            .iter()
            .map(|&id| (id, id.reliability_weight()))
            .collect();
        Self { weights }
    }

    /// Ensemble with custom weights, for tuning experiments.
    pub fn with_weights(weights: HashMap<PredictorId, f64>) -> Self {
        Self { weights }
    }
}

impl Default for WeightedEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreCombiner for WeightedEnsemble {
    fn combine(&self, predictions: &BaseModelPredictions) -> CombinedScore {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        let mut contributions = HashMap::with_capacity(PredictorId::ALL.len());

        for id in PredictorId::ALL {
            let weight = self.weights.get(&id).copied().unwrap_or(0.0);
            let prediction = predictions
                .get(&id)
                .copied()
                .unwrap_or(NEUTRAL_PREDICTION)
                .clamp(0.0, 1.0);

            let contribution = weight * prediction;
            weighted_sum += contribution;
            total_weight += weight;
            contributions.insert(id, contribution);
        }

        let score = if total_weight > 0.0 {
            (weighted_sum / total_weight).clamp(0.0, 1.0)
        } else {
            // Degenerate weight table: fall back to the unweighted average.
            debug!("Weight table sums to zero, using fallback average");
            fallback_average(predictions)
        };

        CombinedScore {
            score,
            contributions,
        }
    }

    fn name(&self) -> &'static str {
        "weighted_ensemble"
    }
}

/// Logistic meta-learner over the prediction vector in canonical order.
///
/// Coefficients come from offline training; training itself is out of
/// scope here. Honors the same contract as the weighted ensemble.
pub struct MetaLearner {
    /// One coefficient per predictor, in `PredictorId::ALL` order.
    coefficients: [f64; PredictorId::ALL.len()],
    intercept: f64,
}

impl MetaLearner {
    pub fn new(coefficients: [f64; PredictorId::ALL.len()], intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
        }
    }
}

impl ScoreCombiner for MetaLearner {
    fn combine(&self, predictions: &BaseModelPredictions) -> CombinedScore {
        let mut linear = self.intercept;
        let mut contributions = HashMap::with_capacity(PredictorId::ALL.len());

        for (idx, id) in PredictorId::ALL.iter().enumerate() {
            let prediction = predictions
                .get(id)
                .copied()
                .unwrap_or(NEUTRAL_PREDICTION)
                .clamp(0.0, 1.0);
            let term = self.coefficients[idx] * prediction;
            linear += term;
            contributions.insert(*id, term);
        }

        let score = 1.0 / (1.0 + (-linear).exp());

        CombinedScore {
            score: score.clamp(0.0, 1.0),
            contributions,
        }
    }

    fn name(&self) -> &'static str {
        "meta_learner"
    }
}

/// Degraded-path combiner: unweighted mean of the valid predictions,
/// neutral 0.5 when nothing valid remains.
pub fn fallback_average(predictions: &BaseModelPredictions) -> f64 {
    let valid: Vec<f64> = predictions
        .values()
        .copied()
        .filter(|p| p.is_finite() && (0.0..=1.0).contains(p))
        .collect();
    if valid.is_empty() {
        return NEUTRAL_PREDICTION;
    }
    valid.iter().sum::<f64>() / valid.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_at(value: f64) -> BaseModelPredictions {
        PredictorId::ALL.iter().map(|&id| (id, value)).collect()
    }

    #[test]
    fn test_uniform_predictions_combine_to_same_value() {
        let ensemble = WeightedEnsemble::new();
        let combined = ensemble.combine(&all_at(0.6));
        assert!((combined.score - 0.6).abs() < 1e-9);
        assert_eq!(combined.contributions.len(), 11);
    }

    #[test]
    fn test_weighted_combination() {
        let ensemble = WeightedEnsemble::new();
        let mut predictions = all_at(0.1);
        // Heavy predictors high, the rest low.
        predictions.insert(PredictorId::Xgboost, 0.9);
        predictions.insert(PredictorId::Catboost, 0.9);
        predictions.insert(PredictorId::Lightgbm, 0.9);
        predictions.insert(PredictorId::LogisticRegression, 0.9);

        let combined = ensemble.combine(&predictions);
        // 0.90 of the weight sits on the boosted predictors.
        let expected = 0.9 * 0.9 + 0.1 * 0.1;
        assert!((combined.score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_missing_predictors_default_to_neutral() {
        let ensemble = WeightedEnsemble::new();
        let mut predictions = HashMap::new();
        predictions.insert(PredictorId::Xgboost, 0.9);

        let combined = ensemble.combine(&predictions);
        // Every absent predictor contributes at 0.5, pulling the score
        // well below the lone high prediction.
        assert!(combined.score < 0.9);
        assert!(combined.score > 0.5);
        assert_eq!(combined.contributions.len(), 11);
    }

    #[test]
    fn test_empty_predictions_are_neutral() {
        let ensemble = WeightedEnsemble::new();
        let combined = ensemble.combine(&HashMap::new());
        assert!((combined.score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_weight_table_uses_fallback() {
        let ensemble = WeightedEnsemble::with_weights(HashMap::new());
        let mut predictions = HashMap::new();
        predictions.insert(PredictorId::Xgboost, 0.8);
        predictions.insert(PredictorId::Catboost, 0.4);
        let combined = ensemble.combine(&predictions);
        assert!((combined.score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_meta_learner_honors_shared_contract() {
        let learner = MetaLearner::new([0.5; 11], -2.75);
        let combined = learner.combine(&all_at(0.5));
        assert!((0.0..=1.0).contains(&combined.score));
        assert_eq!(combined.contributions.len(), 11);
        // Symmetric coefficients at the neutral point: 0.5 * 0.5 * 11 = 2.75.
        assert!((combined.score - 0.5).abs() < 1e-9);

        // Higher inputs move the score up under both strategies.
        let ensemble = WeightedEnsemble::new();
        let low = all_at(0.2);
        let high = all_at(0.8);
        assert!(learner.combine(&high).score > learner.combine(&low).score);
        assert!(ensemble.combine(&high).score > ensemble.combine(&low).score);
    }

    #[test]
    fn test_fallback_average_filters_invalid() {
        let mut predictions = HashMap::new();
        predictions.insert(PredictorId::Xgboost, 0.8);
        predictions.insert(PredictorId::Cnn, f64::NAN);
        predictions.insert(PredictorId::Lstm, 0.2);
        assert!((fallback_average(&predictions) - 0.5).abs() < 1e-9);
        assert!((fallback_average(&HashMap::new()) - 0.5).abs() < 1e-9);
    }
}
