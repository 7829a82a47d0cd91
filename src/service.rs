//! Transaction scoring service
//!
//! Owns the statistics tracker, shift detector, normalizer, combiner,
//! booster, and classifier, and runs one transaction through the full
//! pipeline. Scoring never fails: degraded inputs degrade the score, not
//! the availability of a decision.

use crate::config::{CombinerStrategy, ScoringConfig};
use crate::scoring::booster::RiskBooster;
use crate::scoring::classifier::RiskClassifier;
use crate::scoring::combiner::{
    BaseModelPredictions, MetaLearner, ScoreCombiner, WeightedEnsemble,
};
use crate::stats::normalizer::AdaptiveNormalizer;
use crate::stats::shift::{ShiftDetector, ShiftEvent};
use crate::stats::tracker::{save_snapshot, StatisticsTracker};
use crate::types::context::TransactionContext;
use crate::types::predictor::PredictorId;
use crate::types::result::ScoringResult;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// End-to-end fraud scoring pipeline for a single decision point.
///
/// Cheap to share behind an `Arc`; all interior state is synchronized.
pub struct ScoringService {
    config: ScoringConfig,
    tracker: Arc<StatisticsTracker>,
    shift_detector: ShiftDetector,
    normalizer: AdaptiveNormalizer,
    combiner: Box<dyn ScoreCombiner>,
    booster: RiskBooster,
    classifier: RiskClassifier,
}

impl ScoringService {
    /// Build the pipeline from configuration, restoring persisted
    /// statistics when a snapshot path is configured.
    pub fn new(config: ScoringConfig) -> Self {
        let tracker = Arc::new(StatisticsTracker::load_or_bootstrap(config.tracker.clone()));
        let shift_detector = ShiftDetector::new(tracker.clone(), config.shift.clone());
        let normalizer = AdaptiveNormalizer::new(tracker.clone(), config.normalizer.clone());

        let combiner: Box<dyn ScoreCombiner> = match config.combiner {
            CombinerStrategy::WeightedEnsemble => Box::new(WeightedEnsemble::new()),
            CombinerStrategy::MetaLearner => {
                // Neutral coefficients until a trained set is loaded; keeps
                // the strategy selectable without shipping weights.
                Box::new(MetaLearner::new([0.5; PredictorId::ALL.len()], -2.75))
            }
        };

        let booster = RiskBooster::new(config.boost.clone());
        let classifier = RiskClassifier::new(config.classifier.clone());

        info!(
            combiner = combiner.name(),
            adaptive_normalization = config.adaptive_normalization,
            "Scoring service initialized"
        );

        Self {
            config,
            tracker,
            shift_detector,
            normalizer,
            combiner,
            booster,
            classifier,
        }
    }

    /// Replace the combiner, keeping the rest of the pipeline. Used to
    /// swap in a trained meta-learner at runtime.
    pub fn with_combiner(mut self, combiner: Box<dyn ScoreCombiner>) -> Self {
        info!(combiner = combiner.name(), "Combiner replaced");
        self.combiner = combiner;
        self
    }

    /// Score one transaction.
    ///
    /// Runs sanitization, statistics update, shift detection, optional
    /// adaptive normalization, ensemble combination, contextual boosting,
    /// and classification. Always produces a decision.
    pub fn score_transaction(
        &self,
        predictions: &BaseModelPredictions,
        context: &TransactionContext,
    ) -> ScoringResult {
        let sanitized = sanitize(predictions);
        if sanitized.len() < predictions.len() {
            warn!(
                received = predictions.len(),
                usable = sanitized.len(),
                "Dropped invalid predictions"
            );
        }

        let update_count = self.tracker.update(&sanitized);
        let shifts = self.shift_detector.check_and_handle_shifts();
        if shifts.values().any(|&s| s) {
            let shifted: Vec<&str> = shifts
                .iter()
                .filter(|(_, &s)| s)
                .map(|(id, _)| id.as_str())
                .collect();
            info!(predictors = ?shifted, "Scoring under distribution shift");
        }

        let (inputs, confidences) = if self.config.adaptive_normalization {
            self.normalizer.adaptive_normalize(&sanitized)
        } else {
            (sanitized.clone(), HashMap::new())
        };

        let combined = self.combiner.combine(&inputs);
        let boost = self.booster.boost(combined.score, context);
        let tier = self.classifier.classify(boost.final_score, context);

        let factors = self.classifier.risk_factors(boost.final_score, context);
        let explanation = self.classifier.generate_explanation(
            tier,
            &factors,
            context.amount,
            context.merchant_name.as_deref(),
        );

        self.maybe_persist(update_count);

        debug!(
            score = boost.final_score,
            tier = ?tier,
            boost = boost.total_boost,
            "Transaction scored"
        );

        ScoringResult {
            result_id: Uuid::new_v4().to_string(),
            final_risk_score: boost.final_score,
            tier,
            contributions: combined.contributions,
            confidences,
            boost,
            explanation,
            timestamp: Utc::now(),
        }
    }

    /// Persist the tracker snapshot at the configured interval. Runs on a
    /// background task when inside a tokio runtime, synchronously
    /// otherwise. Failures are logged and scoring continues.
    fn maybe_persist(&self, update_count: u64) {
        let Some(path) = self.config.tracker.stats_path.clone() else {
            return;
        };
        let interval = self.config.tracker.auto_save_interval;
        if interval == 0 || update_count % interval != 0 {
            return;
        }

        let snapshot = self.tracker.snapshot();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || {
                    if let Err(e) = save_snapshot(&snapshot, &path) {
                        error!(path = %path.display(), error = %e, "Failed to persist statistics");
                    }
                });
            }
            Err(_) => {
                if let Err(e) = save_snapshot(&snapshot, &path) {
                    error!(path = %path.display(), error = %e, "Failed to persist statistics");
                }
            }
        }
    }

    /// Shared statistics tracker, for monitoring endpoints.
    pub fn tracker(&self) -> &Arc<StatisticsTracker> {
        &self.tracker
    }

    /// Recent shift events for a predictor.
    pub fn shift_history(&self, id: PredictorId, n: Option<usize>) -> Vec<ShiftEvent> {
        self.shift_detector.shift_history(id, n)
    }

    /// Predictors currently adapting faster after a detected shift.
    pub fn adapting_predictors(&self) -> HashMap<PredictorId, u32> {
        self.shift_detector.boosted_predictors()
    }
}

/// Drop non-finite and out-of-range predictions before they reach the
/// tracker or the combiner. The combiner substitutes a neutral 0.5 for
/// whatever gets dropped.
fn sanitize(predictions: &BaseModelPredictions) -> BaseModelPredictions {
    predictions
        .iter()
        .filter(|(_, &v)| v.is_finite() && (0.0..=1.0).contains(&v))
        .map(|(&id, &v)| (id, v))
        .collect()
}
