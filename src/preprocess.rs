//! Image decoding and input tensor preparation
//!
//! Both model families consume NHWC float tensors scaled to [0, 1]. The
//! ResNet family expects 200x200 RGB input, the custom model 400x400
//! grayscale. Resizing is bilinear, so a tensor produced here matches
//! what the models saw during training.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};
use ndarray::Array4;
use std::path::Path;

/// Model family, which fixes the expected input geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// COVID-ResNet transfer-learning model
    Resnet,
    /// Purpose-built convolutional model
    Custom,
}

impl ModelFamily {
    pub fn input_spec(&self) -> InputSpec {
        match self {
            ModelFamily::Resnet => InputSpec {
                width: 200,
                height: 200,
                channels: 3,
            },
            ModelFamily::Custom => InputSpec {
                width: 400,
                height: 400,
                channels: 1,
            },
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelFamily::Resnet => "COVID-ResNet",
            ModelFamily::Custom => "Custom model",
        }
    }
}

/// Input geometry of a model family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

/// Decode an image file, sniffing the real format from the content.
///
/// Extension-based detection alone would reject `.jfif` files even though
/// they are plain JPEG streams.
pub fn decode_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .with_context(|| format!("Failed to open image {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("Failed to probe image format of {}", path.display()))?
        .decode()
        .with_context(|| format!("Failed to decode image {}", path.display()))
}

/// Converts images into model input tensors for one family
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    spec: InputSpec,
}

impl Preprocessor {
    pub fn for_family(family: ModelFamily) -> Self {
        Self {
            spec: family.input_spec(),
        }
    }

    pub fn spec(&self) -> InputSpec {
        self.spec
    }

    /// Decode `path` and produce the model input tensor.
    pub fn tensor(&self, path: &Path) -> Result<Array4<f32>> {
        let img = decode_image(path)?;
        self.tensor_from_image(&img)
    }

    /// Resize, convert and scale an already decoded image into an
    /// NHWC tensor of shape [1, height, width, channels].
    pub fn tensor_from_image(&self, img: &DynamicImage) -> Result<Array4<f32>> {
        let spec = self.spec;
        let resized = img.resize_exact(spec.width, spec.height, FilterType::Triangle);

        let data: Vec<f32> = if spec.channels == 1 {
            resized
                .to_luma8()
                .into_raw()
                .iter()
                .map(|&v| v as f32 / 255.0)
                .collect()
        } else {
            resized
                .to_rgb8()
                .into_raw()
                .iter()
                .map(|&v| v as f32 / 255.0)
                .collect()
        };

        Array4::from_shape_vec(
            (
                1,
                spec.height as usize,
                spec.width as usize,
                spec.channels as usize,
            ),
            data,
        )
        .context("Failed to shape input tensor")
    }

    /// Decode `path` at the model input size, as RGB for display.
    pub fn display_image(&self, path: &Path) -> Result<RgbImage> {
        let img = decode_image(path)?;
        Ok(img
            .resize_exact(self.spec.width, self.spec.height, FilterType::Triangle)
            .to_rgb8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::env;
    use std::fs;
    use std::io::Cursor;

    #[test]
    fn test_family_input_specs() {
        let resnet = ModelFamily::Resnet.input_spec();
        assert_eq!((resnet.width, resnet.height, resnet.channels), (200, 200, 3));

        let custom = ModelFamily::Custom.input_spec();
        assert_eq!((custom.width, custom.height, custom.channels), (400, 400, 1));
    }

    #[test]
    fn test_rgb_tensor_shape_and_scale() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([255, 0, 128])));
        let tensor = Preprocessor::for_family(ModelFamily::Resnet)
            .tensor_from_image(&img)
            .unwrap();

        assert_eq!(tensor.shape(), &[1, 200, 200, 3]);
        // Uniform source image survives resizing unchanged per channel
        assert!((tensor[[0, 100, 100, 0]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 100, 100, 1]].abs() < 1e-6);
        assert!((tensor[[0, 100, 100, 2]] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_grayscale_tensor_shape_and_range() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([90, 90, 90])));
        let tensor = Preprocessor::for_family(ModelFamily::Custom)
            .tensor_from_image(&img)
            .unwrap();

        assert_eq!(tensor.shape(), &[1, 400, 400, 1]);
        for &v in tensor.iter() {
            assert!((0.0..=1.0).contains(&v));
        }
        assert!((tensor[[0, 200, 200, 0]] - 90.0 / 255.0).abs() < 0.01);
    }

    #[test]
    fn test_decode_jfif_by_content() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([10, 20, 30])));
        let mut jpeg = Vec::new();
        img.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .unwrap();

        let path = env::temp_dir().join(format!("decode_{}.jfif", uuid::Uuid::new_v4()));
        fs::write(&path, &jpeg).unwrap();

        let decoded = decode_image(&path).unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 16);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_display_image_matches_spec_dims() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([0, 0, 0])));
        let path = env::temp_dir().join(format!("display_{}.png", uuid::Uuid::new_v4()));
        img.save(&path).unwrap();

        let display = Preprocessor::for_family(ModelFamily::Resnet)
            .display_image(&path)
            .unwrap();
        assert_eq!((display.width(), display.height()), (200, 200));

        fs::remove_file(&path).unwrap();
    }
}
