//! Score aggregation for the two-model ensemble

use crate::metrics::RunMetrics;
use crate::models::inference::Predictor;
use crate::types::FileVerdict;
use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing::debug;

/// Average two aligned score series elementwise.
///
/// The inputs must come from the same ordered file list; a length
/// mismatch means the series diverged and the result would pair scores
/// of different images, so it is an error rather than a truncation.
pub fn mean_scores(first: &[f32], second: &[f32]) -> Result<Vec<f32>> {
    if first.len() != second.len() {
        bail!(
            "Score series length mismatch: {} vs {}",
            first.len(),
            second.len()
        );
    }

    Ok(first
        .iter()
        .zip(second.iter())
        .map(|(a, b)| (a + b) / 2.0)
        .collect())
}

/// Run both models over the same file list and label the mean scores.
///
/// The constituent passes run non-verbose; per-image output for the
/// ensemble is the caller's concern since only the averaged scores are
/// meaningful to report.
pub fn run_ensemble(
    resnet: &mut Predictor,
    custom: &mut Predictor,
    files: &[PathBuf],
    metrics: &RunMetrics,
) -> Result<Vec<FileVerdict>> {
    let threshold = resnet.threshold();

    let first = resnet.predict_batch(files, false, metrics)?;
    let second = custom.predict_batch(files, false, metrics)?;

    let first_scores: Vec<f32> = first.iter().map(|v| v.score).collect();
    let second_scores: Vec<f32> = second.iter().map(|v| v.score).collect();
    let mean = mean_scores(&first_scores, &second_scores)?;

    debug!(files = files.len(), "Ensemble scores averaged");

    Ok(files
        .iter()
        .zip(mean)
        .map(|(path, score)| FileVerdict::new(path.clone(), score, threshold))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Label;

    #[test]
    fn test_mean_is_elementwise() {
        let mean = mean_scores(&[0.2, 0.8, 1.0], &[0.4, 0.6, 0.0]).unwrap();
        assert!((mean[0] - 0.3).abs() < 1e-6);
        assert!((mean[1] - 0.7).abs() < 1e-6);
        assert!((mean[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_series() {
        let mean = mean_scores(&[], &[]).unwrap();
        assert!(mean.is_empty());
    }

    #[test]
    fn test_length_mismatch_is_an_error() {
        assert!(mean_scores(&[0.1, 0.2], &[0.1]).is_err());
    }

    #[test]
    fn test_mean_can_flip_a_label() {
        // One confident model should not decide alone: 0.5 and 0.05
        // average to 0.275, below a 0.3 threshold.
        let mean = mean_scores(&[0.5], &[0.05]).unwrap();
        assert_eq!(Label::from_score(mean[0], 0.3), Label::Negative);

        // 0.55 and 0.05 average to 0.3, exactly on the boundary.
        let mean = mean_scores(&[0.55], &[0.05]).unwrap();
        assert_eq!(Label::from_score(mean[0], 0.3), Label::Positive);
    }
}
