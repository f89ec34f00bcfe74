//! Single-model scoring over image batches

use crate::metrics::RunMetrics;
use crate::models::loader::LoadedModel;
use crate::preprocess::{ModelFamily, Preprocessor};
use crate::types::{FileVerdict, LabelCounts};
use anyhow::{Context, Result};
use console::style;
use indicatif::ProgressBar;
use ndarray::Array4;
use ort::value::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// Scores images with one loaded model.
///
/// Owns the ONNX session together with the preprocessor matching the
/// model family, so a caller only ever hands over file paths.
pub struct Predictor {
    model: LoadedModel,
    preprocessor: Preprocessor,
    threshold: f32,
}

impl Predictor {
    pub fn new(model: LoadedModel, threshold: f32) -> Self {
        let preprocessor = Preprocessor::for_family(model.family);
        Self {
            model,
            preprocessor,
            threshold,
        }
    }

    pub fn family(&self) -> ModelFamily {
        self.model.family
    }

    pub fn model_name(&self) -> &str {
        &self.model.name
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// True if the underlying graph exposes an output with this name.
    pub fn has_output(&self, name: &str) -> bool {
        self.model.has_output(name)
    }

    pub(crate) fn model_mut(&mut self) -> &mut LoadedModel {
        &mut self.model
    }

    /// Run the model on a prepared input tensor and return the opacity score.
    pub fn score_tensor(&mut self, input: Array4<f32>) -> Result<f32> {
        let input_tensor = Value::from_array(input).context("Failed to create input tensor")?;

        let outputs = self
            .model
            .session
            .run(ort::inputs![&self.model.input_name => input_tensor])?;

        extract_score(&outputs, &self.model.output_name, &self.model.name)
    }

    /// Decode, preprocess and score a single image file.
    pub fn score_image(&mut self, path: &Path) -> Result<f32> {
        let input = self.preprocessor.tensor(path)?;
        self.score_tensor(input)
            .with_context(|| format!("Inference failed for {}", path.display()))
    }

    /// Score every file in order, printing a per-image verdict line when
    /// verbose is on and a label tally for this model at the end.
    pub fn predict_batch(
        &mut self,
        files: &[PathBuf],
        verbose: bool,
        metrics: &RunMetrics,
    ) -> Result<Vec<FileVerdict>> {
        let mut verdicts = Vec::with_capacity(files.len());
        let pb = ProgressBar::new(files.len() as u64);

        for path in files {
            let started = Instant::now();
            let score = self.score_image(path)?;
            metrics.record_inference(&self.model.name, started.elapsed());
            metrics.record_score(score);

            let verdict = FileVerdict::new(path.clone(), score, self.threshold);
            if verbose {
                pb.println(format!(
                    "{} --> {} ({:.4})",
                    path.display(),
                    verdict.label,
                    verdict.score
                ));
            }
            verdicts.push(verdict);
            pb.inc(1);
        }
        pb.finish_and_clear();

        let counts: LabelCounts = verdicts.iter().map(|v| v.label).collect();
        println!(
            "{}: {}",
            style(self.family().display_name()).cyan().bold(),
            counts
        );

        Ok(verdicts)
    }
}

/// Extract the opacity score from model outputs, preferring the probed
/// output name and falling back to the first float tensor.
fn extract_score(
    outputs: &ort::session::SessionOutputs,
    output_name: &str,
    model_name: &str,
) -> Result<f32> {
    if let Some(output) = outputs.get(output_name) {
        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let score = positive_score(&shape, data);
            debug!(model = %model_name, score = score, "Extracted score");
            return Ok(score);
        }
    }

    // Fallback: iterate all outputs and take the first float tensor
    for (name, output) in outputs.iter() {
        if name.contains("label") {
            continue;
        }

        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let score = positive_score(&shape, data);
            debug!(model = %model_name, output = %name, score = score, "Extracted score (fallback)");
            return Ok(score);
        }
    }

    warn!(model = %model_name, "Could not extract score, using neutral 0.5");
    Ok(0.5)
}

fn positive_score(shape: &ort::tensor::Shape, data: &[f32]) -> f32 {
    let dims: Vec<i64> = shape.iter().copied().collect();
    positive_score_from_dims(&dims, data)
}

/// Pick the positive-class component out of a score tensor.
/// Handles [1, 1] and [1] sigmoid heads as well as [1, 2] softmax heads.
fn positive_score_from_dims(dims: &[i64], data: &[f32]) -> f32 {
    if dims.len() == 2 {
        let classes = dims[1] as usize;
        if classes >= 2 {
            return data[1];
        } else if classes == 1 {
            return data[0];
        }
    } else if dims.len() == 1 {
        let classes = dims[0] as usize;
        if classes >= 2 {
            return data[1];
        } else if classes == 1 {
            return data[0];
        }
    }

    // Fallback: last value
    data.last().copied().unwrap_or(0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_head_shapes() {
        assert_eq!(positive_score_from_dims(&[1, 1], &[0.87]), 0.87);
        assert_eq!(positive_score_from_dims(&[1], &[0.12]), 0.12);
    }

    #[test]
    fn test_softmax_head_takes_positive_class() {
        assert_eq!(positive_score_from_dims(&[1, 2], &[0.9, 0.1]), 0.1);
    }

    #[test]
    fn test_unexpected_shape_falls_back_to_last() {
        assert_eq!(positive_score_from_dims(&[1, 1, 1], &[0.2, 0.3, 0.4]), 0.4);
        assert_eq!(positive_score_from_dims(&[0], &[]), 0.5);
    }
}
