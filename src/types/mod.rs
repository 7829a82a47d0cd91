//! Shared data types for the scoring core

pub mod context;
pub mod predictor;
pub mod result;
