//! Command line interface and interactive prompts
//!
//! Every run parameter can be given as a flag; whatever is missing is
//! asked for interactively unless --no-input turns prompting off.

use crate::preprocess::ModelFamily;
use anyhow::{Context, Result};
use clap::Parser;
use inquire::{Confirm, Text};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "opacity-detector",
    version,
    about = "Batch opacity detection on chest X-ray images with ONNX models"
)]
pub struct Args {
    /// Path to the configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory containing the images to classify
    #[arg(long)]
    pub images_dir: Option<PathBuf>,

    /// Model to use: resnet (1), custom (2) or ensemble (3)
    #[arg(long)]
    pub model: Option<String>,

    /// Print a verdict line for every image
    #[arg(long)]
    pub verbose: bool,

    /// Render heatmap overlays after prediction
    #[arg(long)]
    pub visualize: bool,

    /// Model output to read activations from for the heatmaps
    #[arg(long)]
    pub layer: Option<String>,

    /// Write a JSON run report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Directory for heatmap overlays (defaults to the configured one)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Never prompt; missing required values are errors
    #[arg(long)]
    pub no_input: bool,
}

/// Model selection, by menu number or name fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChoice {
    Resnet,
    Custom,
    Ensemble,
}

impl ModelChoice {
    /// Parse a raw selection. Accepts the menu numbers as well as any
    /// input containing a model name, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.to_lowercase();
        if normalized.contains("resnet") || normalized.contains('1') {
            Some(ModelChoice::Resnet)
        } else if normalized.contains("custom") || normalized.contains('2') {
            Some(ModelChoice::Custom)
        } else if normalized.contains("ensemble") || normalized.contains('3') {
            Some(ModelChoice::Ensemble)
        } else {
            None
        }
    }

    /// The single family this choice runs, None for the ensemble.
    pub fn family(&self) -> Option<ModelFamily> {
        match self {
            ModelChoice::Resnet => Some(ModelFamily::Resnet),
            ModelChoice::Custom => Some(ModelFamily::Custom),
            ModelChoice::Ensemble => None,
        }
    }
}

pub fn prompt_images_dir() -> Result<PathBuf> {
    let raw = Text::new("Enter path to the directory which contains the images:")
        .prompt()
        .context("Failed to read image directory")?;
    Ok(PathBuf::from(raw.trim()))
}

pub fn prompt_model_choice() -> Result<String> {
    Text::new("Which model to use?")
        .with_help_message("1. COVID-ResNet  2. Custom (recommended)  3. Ensemble (slower, usually more accurate)")
        .prompt()
        .context("Failed to read model selection")
}

pub fn prompt_confirm(question: &str, default: bool) -> Result<bool> {
    Confirm::new(question)
        .with_default(default)
        .prompt()
        .with_context(|| format!("Failed to read answer to '{}'", question))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_menu_numbers() {
        assert_eq!(ModelChoice::parse("1"), Some(ModelChoice::Resnet));
        assert_eq!(ModelChoice::parse("2"), Some(ModelChoice::Custom));
        assert_eq!(ModelChoice::parse("3"), Some(ModelChoice::Ensemble));
    }

    #[test]
    fn test_parse_names_any_case() {
        assert_eq!(ModelChoice::parse("COVID-ResNet"), Some(ModelChoice::Resnet));
        assert_eq!(ModelChoice::parse("custom"), Some(ModelChoice::Custom));
        assert_eq!(ModelChoice::parse("Ensemble"), Some(ModelChoice::Ensemble));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(ModelChoice::parse("banana"), None);
        assert_eq!(ModelChoice::parse(""), None);
        assert_eq!(ModelChoice::parse("4"), None);
    }

    #[test]
    fn test_choice_families() {
        assert_eq!(ModelChoice::Resnet.family(), Some(ModelFamily::Resnet));
        assert_eq!(ModelChoice::Custom.family(), Some(ModelFamily::Custom));
        assert_eq!(ModelChoice::Ensemble.family(), None);
    }
}
