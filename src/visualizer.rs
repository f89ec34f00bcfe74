//! Heatmap overlay rendering
//!
//! Composites each image with its jet-colored saliency map, the original
//! stacked above the overlay, and writes the result as a PNG. In an
//! interactive session rendering pauses for a key press between images.

use crate::config::DisplayConfig;
use crate::heatmap::{provider_for, HeatmapProvider};
use crate::models::inference::Predictor;
use crate::preprocess::{ModelFamily, Preprocessor};
use anyhow::{Context, Result};
use console::{style, Term};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Rgb, RgbImage};
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Renders saliency overlays to the output directory
pub struct Visualizer {
    alpha: f32,
    display_height: u32,
    output_dir: PathBuf,
}

impl Visualizer {
    pub fn new(display: &DisplayConfig) -> Self {
        Self {
            alpha: display.alpha,
            display_height: display.display_height,
            output_dir: PathBuf::from(&display.output_dir),
        }
    }

    pub fn with_output_dir(mut self, output_dir: PathBuf) -> Self {
        self.output_dir = output_dir;
        self
    }

    /// Render the composite for one image and return the written path.
    pub fn render<P: HeatmapProvider + ?Sized>(
        &self,
        path: &Path,
        family: ModelFamily,
        provider: &mut P,
    ) -> Result<PathBuf> {
        let preprocessor = Preprocessor::for_family(family);
        let input = preprocessor.tensor(path)?;
        let base = preprocessor.display_image(path)?;

        let map = provider.compute(&input)?;
        let heat = colorize(&map, base.width(), base.height());
        let overlay = blend(&base, &heat, self.alpha);
        let composite = stack_vertical(&base, &overlay);
        let framed = resize_to_height(&composite, self.display_height);

        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory {}", self.output_dir.display())
        })?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");
        let out = self.output_dir.join(format!("{}_heatmap.png", stem));
        framed
            .save(&out)
            .with_context(|| format!("Failed to save overlay to {}", out.display()))?;

        Ok(out)
    }

    /// Render overlays for every file, pacing on key presses when the run
    /// is interactive and stdout is a terminal.
    pub fn render_all(
        &self,
        files: &[PathBuf],
        predictor: &mut Predictor,
        layer: Option<&str>,
        grid: usize,
        interactive: bool,
    ) -> Result<()> {
        if files.is_empty() {
            info!("No images to visualize");
            return Ok(());
        }

        let term = Term::stdout();
        let pace = interactive && term.is_term();
        if pace {
            println!("{}", style("Press any key to view the next image").dim());
        }

        let family = predictor.family();
        for path in files {
            let mut provider = provider_for(predictor, layer, grid);
            let out = self.render(path, family, provider.as_mut())?;
            drop(provider);

            println!("{} -> {}", path.display(), out.display());
            if pace {
                term.read_key()?;
            }
        }

        info!(
            count = files.len(),
            output_dir = %self.output_dir.display(),
            "Saved heatmap overlays"
        );
        Ok(())
    }
}

/// Piecewise jet colormap over [0, 1], low values blue, high values red.
fn jet_color(v: f32) -> Rgb<u8> {
    let v = v.clamp(0.0, 1.0);
    let r = (1.5 - (4.0 * v - 3.0).abs()).clamp(0.0, 1.0);
    let g = (1.5 - (4.0 * v - 2.0).abs()).clamp(0.0, 1.0);
    let b = (1.5 - (4.0 * v - 1.0).abs()).clamp(0.0, 1.0);
    Rgb([(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8])
}

/// Upsample a coarse saliency map to the target size and color it.
fn colorize(map: &Array2<f32>, width: u32, height: u32) -> RgbImage {
    if map.nrows() == 0 || map.ncols() == 0 {
        return RgbImage::from_pixel(width, height, jet_color(0.0));
    }

    let gray: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(map.ncols() as u32, map.nrows() as u32, |x, y| {
            Luma([map[[y as usize, x as usize]]])
        });
    let resized = imageops::resize(&gray, width, height, FilterType::Triangle);

    RgbImage::from_fn(width, height, |x, y| jet_color(resized.get_pixel(x, y)[0]))
}

/// Weighted blend of the original and its colored heatmap.
fn blend(base: &RgbImage, heat: &RgbImage, alpha: f32) -> RgbImage {
    let alpha = alpha.clamp(0.0, 1.0);
    RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let b = base.get_pixel(x, y);
        let h = heat.get_pixel(x, y);
        let mut out = [0u8; 3];
        for i in 0..3 {
            out[i] = ((1.0 - alpha) * b[i] as f32 + alpha * h[i] as f32).round() as u8;
        }
        Rgb(out)
    })
}

/// Stack two images vertically on a shared canvas.
fn stack_vertical(top: &RgbImage, bottom: &RgbImage) -> RgbImage {
    let width = top.width().max(bottom.width());
    let mut canvas = RgbImage::new(width, top.height() + bottom.height());
    imageops::replace(&mut canvas, top, 0, 0);
    imageops::replace(&mut canvas, bottom, 0, top.height() as i64);
    canvas
}

/// Scale to a fixed height, preserving aspect ratio.
fn resize_to_height(img: &RgbImage, target: u32) -> RgbImage {
    if img.height() == 0 || img.height() == target {
        return img.clone();
    }
    let width = ((img.width() as u64 * target as u64) / img.height() as u64).max(1) as u32;
    imageops::resize(img, width, target, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplayConfig;
    use image::DynamicImage;
    use ndarray::Array4;
    use std::env;

    #[test]
    fn test_jet_endpoints() {
        assert_eq!(jet_color(0.0), Rgb([0, 0, 127]));
        assert_eq!(jet_color(1.0), Rgb([127, 0, 0]));
        assert_eq!(jet_color(0.5).0[1], 255);
        // Out-of-range values clamp instead of wrapping
        assert_eq!(jet_color(-1.0), jet_color(0.0));
        assert_eq!(jet_color(2.0), jet_color(1.0));
    }

    #[test]
    fn test_blend_midpoint() {
        let base = RgbImage::from_pixel(2, 2, Rgb([100, 100, 100]));
        let heat = RgbImage::from_pixel(2, 2, Rgb([200, 50, 0]));
        let out = blend(&base, &heat, 0.5);
        assert_eq!(out.get_pixel(0, 0), &Rgb([150, 75, 50]));
    }

    #[test]
    fn test_blend_zero_alpha_keeps_base() {
        let base = RgbImage::from_pixel(1, 1, Rgb([12, 34, 56]));
        let heat = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
        let out = blend(&base, &heat, 0.0);
        assert_eq!(out.get_pixel(0, 0), &Rgb([12, 34, 56]));
    }

    #[test]
    fn test_stack_adds_heights() {
        let top = RgbImage::from_pixel(2, 3, Rgb([1, 1, 1]));
        let bottom = RgbImage::from_pixel(2, 5, Rgb([2, 2, 2]));
        let stacked = stack_vertical(&top, &bottom);
        assert_eq!((stacked.width(), stacked.height()), (2, 8));
        assert_eq!(stacked.get_pixel(0, 0), &Rgb([1, 1, 1]));
        assert_eq!(stacked.get_pixel(0, 4), &Rgb([2, 2, 2]));
    }

    #[test]
    fn test_resize_to_height_keeps_aspect() {
        let img = RgbImage::from_pixel(100, 50, Rgb([0, 0, 0]));
        let out = resize_to_height(&img, 700);
        assert_eq!((out.width(), out.height()), (1400, 700));
    }

    struct FlatMap;

    impl HeatmapProvider for FlatMap {
        fn compute(&mut self, _input: &Array4<f32>) -> Result<Array2<f32>> {
            Ok(Array2::from_elem((4, 4), 0.5))
        }
    }

    #[test]
    fn test_render_writes_composite_at_display_height() {
        let dir = env::temp_dir().join(format!("viz_{}", uuid::Uuid::new_v4()));
        let src = env::temp_dir().join(format!("viz_src_{}.png", uuid::Uuid::new_v4()));
        DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([80, 80, 80])))
            .save(&src)
            .unwrap();

        let visualizer = Visualizer::new(&DisplayConfig::default()).with_output_dir(dir.clone());
        let out = visualizer
            .render(&src, ModelFamily::Resnet, &mut FlatMap)
            .unwrap();

        assert!(out.ends_with(format!(
            "{}_heatmap.png",
            src.file_stem().unwrap().to_str().unwrap()
        )));
        let written = image::open(&out).unwrap();
        // 200x200 base over 200x200 overlay, resized to height 700
        assert_eq!(written.height(), 700);
        assert_eq!(written.width(), 350);

        fs::remove_file(&src).unwrap();
        fs::remove_dir_all(&dir).unwrap();
    }
}
