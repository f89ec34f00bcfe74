//! Synthetic Sample Generator
//!
//! Writes synthetic chest-scan images for exercising the detector
//! without real patient data.

use anyhow::Result;
use clap::Parser;
use image::{GrayImage, Luma};
use rand::Rng;
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gen_samples", about = "Generate synthetic chest-scan images")]
struct Args {
    /// Output directory for the generated images
    #[arg(long, default_value = "samples")]
    out_dir: PathBuf,

    /// Number of images to generate
    #[arg(long, default_value_t = 16)]
    count: u32,

    /// Image edge length in pixels
    #[arg(long, default_value_t = 400)]
    size: u32,

    /// Fraction of images given a synthetic opacity
    #[arg(long, default_value_t = 0.5)]
    opacity_rate: f64,

    /// Also write files the extension filter should skip
    #[arg(long)]
    with_decoys: bool,
}

/// Scan generator with shared noise state
struct SampleGenerator {
    rng: rand::rngs::ThreadRng,
    size: u32,
}

impl SampleGenerator {
    fn new(size: u32) -> Self {
        Self {
            rng: rand::thread_rng(),
            size,
        }
    }

    /// Lung-field backdrop: vertical gradient with per-pixel noise.
    fn base_scan(&mut self) -> GrayImage {
        let size = self.size;
        let rng = &mut self.rng;
        GrayImage::from_fn(size, size, |_, y| {
            let gradient = 40.0 + 120.0 * (y as f32 / size as f32);
            let noise: f32 = rng.gen_range(-18.0..18.0);
            Luma([(gradient + noise).clamp(0.0, 255.0) as u8])
        })
    }

    /// A clear scan is just the noisy backdrop.
    fn generate_clear(&mut self) -> GrayImage {
        self.base_scan()
    }

    /// An opacity scan gets one or two soft bright patches.
    fn generate_opacity(&mut self) -> GrayImage {
        let mut img = self.base_scan();
        let patches = self.rng.gen_range(1..=2);
        for _ in 0..patches {
            let cx = self.rng.gen_range(0.2f32..0.8f32) * self.size as f32;
            let cy = self.rng.gen_range(0.2f32..0.8f32) * self.size as f32;
            let radius = self.rng.gen_range(0.08f32..0.18f32) * self.size as f32;
            stamp_patch(&mut img, cx, cy, radius);
        }
        img
    }
}

/// Additive radial patch with a smooth falloff.
fn stamp_patch(img: &mut GrayImage, cx: f32, cy: f32, radius: f32) {
    let (w, h) = img.dimensions();
    for y in 0..h {
        for x in 0..w {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist < radius {
                let falloff = 1.0 - dist / radius;
                let pixel = img.get_pixel_mut(x, y);
                let v = pixel[0] as f32 + 90.0 * falloff;
                pixel[0] = v.clamp(0.0, 255.0) as u8;
            }
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!(
        out_dir = %args.out_dir.display(),
        count = args.count,
        size = args.size,
        opacity_rate = args.opacity_rate,
        "Generating synthetic scans"
    );

    fs::create_dir_all(&args.out_dir)?;

    let mut generator = SampleGenerator::new(args.size.max(16));
    let mut rng = rand::thread_rng();

    let mut clear_count = 0u32;
    let mut opacity_count = 0u32;

    for i in 0..args.count {
        let (img, kind) = if rng.gen_bool(args.opacity_rate.clamp(0.0, 1.0)) {
            opacity_count += 1;
            (generator.generate_opacity(), "opacity")
        } else {
            clear_count += 1;
            (generator.generate_clear(), "clear")
        };

        let path = args.out_dir.join(format!("scan_{:04}_{}.png", i, kind));
        img.save(&path)?;

        if (i + 1) % 10 == 0 {
            info!(
                "Generated {}/{} images ({} clear, {} opacity)",
                i + 1,
                args.count,
                clear_count,
                opacity_count
            );
        }
    }

    if args.with_decoys {
        fs::write(args.out_dir.join("notes.txt"), "not an image\n")?;
        fs::write(args.out_dir.join("scan_raw.tiff"), b"decoy")?;
        info!("Wrote 2 decoy files for the format filter");
    }

    info!(
        "Completed! Wrote {} images ({} clear, {} opacity) to {}",
        args.count,
        clear_count,
        opacity_count,
        args.out_dir.display()
    );

    Ok(())
}
