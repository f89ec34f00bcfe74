//! Prediction data structures for opacity detection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Binary classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    Positive,
    Negative,
}

impl Label {
    /// Derive the label from a raw score. The threshold boundary itself is
    /// Positive: a score of exactly `threshold` counts as a finding.
    pub fn from_score(score: f32, threshold: f32) -> Self {
        if score >= threshold {
            Label::Positive
        } else {
            Label::Negative
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Positive => write!(f, "Positive"),
            Label::Negative => write!(f, "Negative"),
        }
    }
}

/// Verdict for a single image file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileVerdict {
    /// Source image path
    pub path: PathBuf,

    /// Raw model output in [0, 1], the pseudo-probability of a positive finding
    pub score: f32,

    /// Label derived from the score via the detection threshold
    pub label: Label,
}

impl FileVerdict {
    pub fn new(path: PathBuf, score: f32, threshold: f32) -> Self {
        Self {
            path,
            score,
            label: Label::from_score(score, threshold),
        }
    }
}

/// Frequency counter over verdict labels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounts {
    pub positive: u64,
    pub negative: u64,
}

impl LabelCounts {
    pub fn record(&mut self, label: Label) {
        match label {
            Label::Positive => self.positive += 1,
            Label::Negative => self.negative += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.positive + self.negative
    }
}

impl FromIterator<Label> for LabelCounts {
    fn from_iter<I: IntoIterator<Item = Label>>(iter: I) -> Self {
        let mut counts = Self::default();
        for label in iter {
            counts.record(label);
        }
        counts
    }
}

impl fmt::Display for LabelCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Positive: {}, Negative: {}",
            self.positive, self.negative
        )
    }
}

/// Ordered prediction results for one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// One verdict per accepted image, in scan order
    pub verdicts: Vec<FileVerdict>,

    /// Files rejected by the extension filter
    pub skipped: u64,
}

impl BatchReport {
    pub fn new(verdicts: Vec<FileVerdict>, skipped: u64) -> Self {
        Self { verdicts, skipped }
    }

    /// Partition the verdicts into label tallies.
    pub fn counts(&self) -> LabelCounts {
        self.verdicts.iter().map(|v| v.label).collect()
    }
}

/// Serializable artifact describing a complete run, written on request
/// as a JSON report next to the console output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run identifier
    pub run_id: String,

    /// Report generation timestamp
    pub generated_at: DateTime<Utc>,

    /// Names of the models that produced the scores
    pub models: Vec<String>,

    /// Detection threshold in effect
    pub threshold: f32,

    /// Label tallies over all verdicts
    pub counts: LabelCounts,

    /// Files rejected by the extension filter
    pub skipped: u64,

    /// Per-file verdicts, in scan order
    pub verdicts: Vec<FileVerdict>,
}

impl RunReport {
    /// Build a report from a finished batch.
    pub fn new(models: Vec<String>, threshold: f32, batch: &BatchReport) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            models,
            threshold,
            counts: batch.counts(),
            skipped: batch.skipped,
            verdicts: batch.verdicts.clone(),
        }
    }

    /// Serialize the report as pretty JSON to `path`.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write run report to {}", path.display()))
    }
}
