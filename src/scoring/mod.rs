//! Ensemble combination, contextual boosting, and tier classification

pub mod booster;
pub mod classifier;
pub mod combiner;
