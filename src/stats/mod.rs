//! Online statistics, shift detection, and adaptive normalization

pub mod normalizer;
pub mod shift;
pub mod tracker;
