//! Base predictor identifiers and their training-time reference data
//!
//! The set of base predictors is closed: every predictor the platform
//! ships is enumerated here, together with the output distribution it
//! exhibited on its training set and the reliability weight it earned
//! in offline evaluation. Unknown identifiers coming in over the wire
//! fail deserialization instead of silently entering the ensemble.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier for one of the independently trained base predictors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PredictorId {
    #[serde(rename = "ml_catboost")]
    Catboost,
    #[serde(rename = "ml_lightgbm")]
    Lightgbm,
    #[serde(rename = "ml_logistic_regression")]
    LogisticRegression,
    #[serde(rename = "ml_random_forest")]
    RandomForest,
    #[serde(rename = "ml_xgboost")]
    Xgboost,
    #[serde(rename = "dl_autoencoder")]
    Autoencoder,
    #[serde(rename = "dl_bilstm")]
    Bilstm,
    #[serde(rename = "dl_cnn")]
    Cnn,
    #[serde(rename = "dl_fnn")]
    Fnn,
    #[serde(rename = "dl_hybrid_dl")]
    HybridDl,
    #[serde(rename = "dl_lstm")]
    Lstm,
}

impl PredictorId {
    /// All known predictors, in the canonical feature order used by the
    /// meta-learner combiner.
    pub const ALL: [PredictorId; 11] = [
        PredictorId::Catboost,
        PredictorId::Lightgbm,
        PredictorId::LogisticRegression,
        PredictorId::RandomForest,
        PredictorId::Xgboost,
        PredictorId::Autoencoder,
        PredictorId::Bilstm,
        PredictorId::Cnn,
        PredictorId::Fnn,
        PredictorId::HybridDl,
        PredictorId::Lstm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PredictorId::Catboost => "ml_catboost",
            PredictorId::Lightgbm => "ml_lightgbm",
            PredictorId::LogisticRegression => "ml_logistic_regression",
            PredictorId::RandomForest => "ml_random_forest",
            PredictorId::Xgboost => "ml_xgboost",
            PredictorId::Autoencoder => "dl_autoencoder",
            PredictorId::Bilstm => "dl_bilstm",
            PredictorId::Cnn => "dl_cnn",
            PredictorId::Fnn => "dl_fnn",
            PredictorId::HybridDl => "dl_hybrid_dl",
            PredictorId::Lstm => "dl_lstm",
        }
    }

    /// Output distribution this predictor exhibited on its training set.
    pub fn baseline(&self) -> BaselineStatistics {
        match self {
            PredictorId::Catboost => BaselineStatistics::new(0.18, 0.22, 0.0, 0.95),
            PredictorId::Lightgbm => BaselineStatistics::new(0.20, 0.24, 0.0, 0.98),
            PredictorId::LogisticRegression => BaselineStatistics::new(0.25, 0.30, 0.0, 1.0),
            PredictorId::RandomForest => BaselineStatistics::new(0.22, 0.26, 0.0, 1.0),
            PredictorId::Xgboost => BaselineStatistics::new(0.19, 0.23, 0.0, 0.97),
            PredictorId::Autoencoder => BaselineStatistics::new(0.24, 0.28, 0.0, 0.99),
            PredictorId::Bilstm => BaselineStatistics::new(0.26, 0.31, 0.0, 1.0),
            PredictorId::Cnn => BaselineStatistics::new(0.25, 0.29, 0.0, 1.0),
            PredictorId::Fnn => BaselineStatistics::new(0.23, 0.27, 0.0, 0.99),
            PredictorId::HybridDl => BaselineStatistics::new(0.22, 0.26, 0.0, 0.98),
            PredictorId::Lstm => BaselineStatistics::new(0.25, 0.28, 0.0, 1.0),
        }
    }

    /// Reliability weight for the fixed-weight ensemble.
    ///
    /// Calibrated in offline evaluation: the gradient-boosted tree
    /// family proved conservative on legitimate traffic and carries most
    /// of the weight, random forest over-flagged and is disabled, and
    /// the deep models are kept at near-zero weight. Sums to 1.0 across
    /// `ALL`, checked in tests.
    pub fn reliability_weight(&self) -> f64 {
        match self {
            PredictorId::Catboost => 0.20,
            PredictorId::Lightgbm => 0.20,
            PredictorId::LogisticRegression => 0.25,
            PredictorId::RandomForest => 0.00,
            PredictorId::Xgboost => 0.25,
            PredictorId::Autoencoder => 0.01,
            PredictorId::Bilstm => 0.02,
            PredictorId::Cnn => 0.01,
            PredictorId::Fnn => 0.02,
            PredictorId::HybridDl => 0.02,
            PredictorId::Lstm => 0.02,
        }
    }
}

impl fmt::Display for PredictorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictorId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PredictorId::ALL
            .iter()
            .find(|id| id.as_str() == s)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("unknown predictor id: {}", s))
    }
}

/// Fixed reference distribution a predictor exhibited at training time.
///
/// Immutable once shipped; the adaptive normalizer maps live predictions
/// back into this distribution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BaselineStatistics {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl BaselineStatistics {
    const fn new(mean: f64, std: f64, min: f64, max: f64) -> Self {
        Self { mean, std, min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reliability_weights_sum_to_one() {
        let total: f64 = PredictorId::ALL.iter().map(|id| id.reliability_weight()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_predictor_id_round_trip() {
        for id in PredictorId::ALL {
            let parsed: PredictorId = id.as_str().parse().unwrap();
            assert_eq!(parsed, id);
        }
        assert!("ml_unknown".parse::<PredictorId>().is_err());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&PredictorId::Xgboost).unwrap();
        assert_eq!(json, "\"ml_xgboost\"");
        let back: PredictorId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PredictorId::Xgboost);
    }

    #[test]
    fn test_baseline_std_is_positive() {
        for id in PredictorId::ALL {
            assert!(id.baseline().std > 0.0);
        }
    }
}
