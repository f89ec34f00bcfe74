//! ML model inference components

pub mod aggregator;
pub mod inference;
pub mod loader;

pub use aggregator::{mean_scores, run_ensemble};
pub use inference::Predictor;
pub use loader::{LoadedModel, ModelLoader};
