//! Adaptive Ensemble Fraud Scoring Core
//!
//! Combines the outputs of independently trained fraud classifiers into a
//! single calibrated three-tier decision. The layer tracks per-predictor
//! output statistics online, detects distribution shift against recent
//! history, renormalizes live predictions back toward the training-time
//! baseline once enough evidence has accumulated, and amplifies the
//! ensemble score with transaction-level behavioral signals before
//! classifying.

pub mod config;
pub mod scoring;
pub mod service;
pub mod stats;
pub mod types;

pub use config::ScoringConfig;
pub use scoring::booster::RiskBooster;
pub use scoring::classifier::RiskClassifier;
pub use scoring::combiner::{BaseModelPredictions, ScoreCombiner, WeightedEnsemble};
pub use service::ScoringService;
pub use stats::normalizer::AdaptiveNormalizer;
pub use stats::shift::ShiftDetector;
pub use stats::tracker::StatisticsTracker;
pub use types::context::{AccountEvent, TransactionContext, TransactionStatus};
pub use types::predictor::PredictorId;
pub use types::result::{BoostDecision, RiskTier, ScoringResult};
