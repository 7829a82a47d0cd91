//! Scoring output types consumed by the transaction workflow

use crate::types::predictor::PredictorId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Final three-tier decision category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    /// Auto-approve.
    Safe,
    /// Hold for user confirmation.
    Suspicious,
    /// Auto-block.
    Fraud,
}

/// Record of the contextual boosts applied on top of the ensemble score.
///
/// Created fresh per transaction and returned inside [`ScoringResult`];
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostDecision {
    /// Boost amount per factor name (only factors that fired).
    pub factors: HashMap<String, f64>,
    /// Sum of all boosts applied.
    pub total_boost: f64,
    /// Joined human-readable explanation of the applied boosts.
    pub reason: String,
    /// Ensemble score before boosting.
    pub base_score: f64,
    /// Boosted score, capped at 0.99.
    pub final_score: f64,
}

impl BoostDecision {
    pub fn applied(&self) -> bool {
        self.final_score > self.base_score
    }
}

/// Complete scoring decision for one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResult {
    /// Unique identifier for this decision.
    pub result_id: String,
    /// Final risk score in [0, 1].
    pub final_risk_score: f64,
    /// Three-tier classification.
    pub tier: RiskTier,
    /// Weighted contribution of each predictor to the ensemble score.
    pub contributions: HashMap<PredictorId, f64>,
    /// Normalization confidence per predictor (empty when adaptive
    /// normalization is disabled).
    pub confidences: HashMap<PredictorId, f64>,
    /// Contextual boost accounting.
    pub boost: BoostDecision,
    /// Human-readable justification of the decision.
    pub explanation: String,
    /// Decision timestamp.
    pub timestamp: DateTime<Utc>,
}
