//! # RelayCore Cost
//!
//! Pre-flight cost estimation (with a per-model EMA of actual costs) and
//! the pure model-substitution logic the pipeline uses to trade quality
//! for budget headroom.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model_table;
pub mod optimizer;
pub mod predictor;

pub use model_table::ModelProfile;
pub use optimizer::{optimize_model_selection, OptimizedSelection};
pub use predictor::{estimate_tokens, CostPrediction, CostPredictor};
