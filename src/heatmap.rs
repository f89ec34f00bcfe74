//! Saliency heatmap providers
//!
//! The visualizer asks a [`HeatmapProvider`] for a coarse saliency map
//! and does all rendering itself, so the map source stays swappable.
//! Two providers are bundled: occlusion sensitivity, which works on any
//! model by measuring how much each masked region drops the score, and
//! an activation readout for graphs exported with a spatial feature map
//! as an extra output.

use crate::models::inference::Predictor;
use crate::models::loader::LoadedModel;
use anyhow::{Context, Result};
use ndarray::{s, Array2, Array4};
use ort::value::Value;
use tracing::{debug, warn};

/// Source of saliency maps for the visualizer
pub trait HeatmapProvider {
    /// Produce a saliency map for one prepared input tensor. Values are
    /// normalized to [0, 1]; the map may be coarser than the input.
    fn compute(&mut self, input: &Array4<f32>) -> Result<Array2<f32>>;
}

/// Occlusion sensitivity: slide a zero patch over the input and record
/// the score drop per grid cell.
pub struct OcclusionMap<'a> {
    predictor: &'a mut Predictor,
    grid: usize,
}

impl<'a> OcclusionMap<'a> {
    pub fn new(predictor: &'a mut Predictor, grid: usize) -> Self {
        Self {
            predictor,
            grid: grid.max(1),
        }
    }
}

impl HeatmapProvider for OcclusionMap<'_> {
    fn compute(&mut self, input: &Array4<f32>) -> Result<Array2<f32>> {
        let baseline = self.predictor.score_tensor(input.clone())?;
        let height = input.shape()[1];
        let width = input.shape()[2];
        let grid = self.grid.min(height).min(width).max(1);

        let cell_h = height / grid;
        let cell_w = width / grid;
        let mut map = Array2::zeros((grid, grid));

        for gy in 0..grid {
            for gx in 0..grid {
                let y0 = gy * cell_h;
                let y1 = if gy == grid - 1 { height } else { y0 + cell_h };
                let x0 = gx * cell_w;
                let x1 = if gx == grid - 1 { width } else { x0 + cell_w };

                let mut occluded = input.clone();
                occluded.slice_mut(s![.., y0..y1, x0..x1, ..]).fill(0.0);

                let score = self.predictor.score_tensor(occluded)?;
                // Regions whose removal lowers the score support the finding
                map[[gy, gx]] = (baseline - score).max(0.0);
            }
        }

        debug!(baseline = baseline, grid = grid, "Occlusion map computed");
        Ok(normalize(map))
    }
}

/// Channel-mean readout of a named spatial activation output.
pub struct ActivationCam<'a> {
    model: &'a mut LoadedModel,
    layer: String,
}

impl<'a> ActivationCam<'a> {
    pub fn new(model: &'a mut LoadedModel, layer: &str) -> Self {
        Self {
            model,
            layer: layer.to_string(),
        }
    }
}

impl HeatmapProvider for ActivationCam<'_> {
    fn compute(&mut self, input: &Array4<f32>) -> Result<Array2<f32>> {
        let input_tensor =
            Value::from_array(input.clone()).context("Failed to create input tensor")?;

        let outputs = self
            .model
            .session
            .run(ort::inputs![&self.model.input_name => input_tensor])?;

        let output = outputs
            .get(&self.layer)
            .ok_or_else(|| anyhow::anyhow!("Model output {} not found", self.layer))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .with_context(|| format!("Output {} is not a float tensor", self.layer))?;
        let dims: Vec<i64> = shape.iter().copied().collect();

        let map = channel_mean(&dims, data)?;
        debug!(layer = %self.layer, dims = ?dims, "Activation map extracted");
        Ok(normalize(map))
    }
}

/// Select the heatmap provider for a run. A requested activation layer is
/// honored only when the loaded graph actually exposes it; otherwise
/// occlusion sensitivity is used, which needs nothing beyond the score.
pub fn provider_for<'a>(
    predictor: &'a mut Predictor,
    layer: Option<&str>,
    grid: usize,
) -> Box<dyn HeatmapProvider + 'a> {
    if let Some(layer) = layer {
        if predictor.has_output(layer) {
            return Box::new(ActivationCam::new(predictor.model_mut(), layer));
        }
        warn!(
            layer = %layer,
            "Activation layer not found on the model, falling back to occlusion saliency"
        );
    }
    Box::new(OcclusionMap::new(predictor, grid))
}

/// Collapse a spatial activation tensor to one value per location.
/// Accepts [1, H, W, C], [1, H, W] and [H, W] layouts; negative
/// activations are clipped before averaging.
fn channel_mean(dims: &[i64], data: &[f32]) -> Result<Array2<f32>> {
    match dims {
        [1, h, w, c] if *c > 0 => {
            let (h, w, c) = (*h as usize, *w as usize, *c as usize);
            let mut map = Array2::zeros((h, w));
            for y in 0..h {
                for x in 0..w {
                    let base = (y * w + x) * c;
                    let sum: f32 = data[base..base + c].iter().map(|v| v.max(0.0)).sum();
                    map[[y, x]] = sum / c as f32;
                }
            }
            Ok(map)
        }
        [1, h, w] | [h, w] => {
            let (h, w) = (*h as usize, *w as usize);
            Array2::from_shape_vec((h, w), data.iter().map(|v| v.max(0.0)).collect())
                .context("Activation shape does not match its data")
        }
        _ => anyhow::bail!("Unsupported activation shape {:?}", dims),
    }
}

/// Scale a map into [0, 1]; a flat map becomes all zeros.
fn normalize(map: Array2<f32>) -> Array2<f32> {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in map.iter() {
        min = min.min(v);
        max = max.max(v);
    }

    if !max.is_finite() || max - min <= f32::EPSILON {
        return Array2::zeros(map.raw_dim());
    }

    map.mapv(|v| (v - min) / (max - min))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_normalize_spans_unit_range() {
        let map = normalize(array![[1.0, 2.0], [3.0, 5.0]]);
        assert!((map[[0, 0]] - 0.0).abs() < 1e-6);
        assert!((map[[1, 1]] - 1.0).abs() < 1e-6);
        assert!((map[[0, 1]] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_flat_map_is_zero() {
        let map = normalize(array![[0.7, 0.7], [0.7, 0.7]]);
        assert!(map.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_channel_mean_nhwc() {
        // 1x2x2x2: each location averages its two channels after clipping
        let data = [1.0, 3.0, -2.0, 4.0, 0.0, 0.0, 5.0, 5.0];
        let map = channel_mean(&[1, 2, 2, 2], &data).unwrap();
        assert!((map[[0, 0]] - 2.0).abs() < 1e-6);
        assert!((map[[0, 1]] - 2.0).abs() < 1e-6); // -2 clips to 0
        assert!((map[[1, 0]] - 0.0).abs() < 1e-6);
        assert!((map[[1, 1]] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_channel_mean_plain_2d() {
        let map = channel_mean(&[2, 2], &[0.1, -0.5, 0.2, 0.3]).unwrap();
        assert!((map[[0, 1]] - 0.0).abs() < 1e-6);
        assert!((map[[1, 1]] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_channel_mean_rejects_odd_shapes() {
        assert!(channel_mean(&[1, 2, 2, 2, 2], &[0.0; 16]).is_err());
        assert!(channel_mean(&[4], &[0.0; 4]).is_err());
    }
}
