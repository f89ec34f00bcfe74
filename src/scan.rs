//! Image directory scanning and format filtering

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// File extensions accepted for prediction, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["jpeg", "jpg", "png", "jfif"];

/// Result of scanning an image directory
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Accepted image paths in lexicographic order
    pub accepted: Vec<PathBuf>,
    /// Count of files rejected by the extension filter
    pub skipped: u64,
}

/// Collect the supported image files directly under `dir`.
///
/// Subdirectories are not descended into. Files with an unsupported
/// extension are counted and logged but do not fail the scan; a missing
/// or unreadable directory does. The accepted list is sorted so that
/// every pass over the batch sees the same ordering.
pub fn scan_directory(dir: &Path) -> Result<ScanOutcome> {
    if !dir.is_dir() {
        bail!("Image directory not found: {}", dir.display());
    }

    let mut accepted = Vec::new();
    let mut skipped = 0u64;

    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read image directory {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| {
            format!("Failed to read directory entry under {}", dir.display())
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        if has_supported_extension(&path) {
            accepted.push(path);
        } else {
            warn!(
                path = %path.display(),
                "Unsupported file format, skipping (supported: jpeg, jpg, png, jfif)"
            );
            skipped += 1;
        }
    }

    accepted.sort();

    Ok(ScanOutcome { accepted, skipped })
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
