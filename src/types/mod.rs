//! Type definitions for the opacity detector

pub mod prediction;

pub use prediction::{BatchReport, FileVerdict, Label, LabelCounts, RunReport};
