//! Chest X-ray Opacity Detection Library
//!
//! Batch inference over a directory of scans with two ONNX model
//! families and an averaging ensemble, plus saliency heatmap rendering.

pub mod cli;
pub mod config;
pub mod heatmap;
pub mod metrics;
pub mod models;
pub mod preprocess;
pub mod scan;
pub mod types;
pub mod visualizer;

pub use config::AppConfig;
pub use metrics::RunMetrics;
pub use models::inference::Predictor;
pub use models::loader::ModelLoader;
pub use preprocess::{ModelFamily, Preprocessor};
pub use types::{BatchReport, FileVerdict, Label, LabelCounts, RunReport};
