//! ONNX model loader

use anyhow::{bail, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::fs::File;
use std::path::Path;
use tracing::info;
use zip::ZipArchive;

use crate::preprocess::ModelFamily;

/// Loaded ONNX model with metadata
pub struct LoadedModel {
    /// Model name, derived from the weights file
    pub name: String,
    /// Family the weights belong to, which fixes the input geometry
    pub family: ModelFamily,
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the model
    pub input_name: String,
    /// Output name for the opacity score
    pub output_name: String,
}

impl LoadedModel {
    /// True if the graph exposes an output with this exact name.
    pub fn has_output(&self, name: &str) -> bool {
        self.session.outputs().iter().any(|o| o.name == name)
    }
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Result<Self> {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        // Initialize ONNX Runtime
        ort::init().commit();
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load a single ONNX model from file
    pub fn load_model<P: AsRef<Path>>(&self, path: P, family: ModelFamily) -> Result<LoadedModel> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        // Get input/output names
        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "input".to_string());

        let output_name = session
            .outputs()
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("output") || o.name.contains("dense"))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| {
                session
                    .outputs()
                    .last()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| "output".to_string())
            });

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            name,
            family,
            session,
            input_name,
            output_name,
        })
    }

    /// Make sure the ResNet weights file exists, extracting the bundled
    /// archive into the models directory when it does not.
    pub fn ensure_resnet_weights(
        models_dir: &Path,
        weights: &Path,
        archive: &Path,
    ) -> Result<()> {
        if weights.exists() {
            return Ok(());
        }

        if !archive.exists() {
            bail!(
                "Model weights {} not found and archive {} is missing",
                weights.display(),
                archive.display()
            );
        }

        info!(archive = %archive.display(), "Extracting model archive");

        let file = File::open(archive)
            .with_context(|| format!("Failed to open archive {}", archive.display()))?;
        let mut zip = ZipArchive::new(file)
            .with_context(|| format!("Failed to read archive {}", archive.display()))?;
        zip.extract(models_dir)
            .with_context(|| format!("Failed to extract archive {}", archive.display()))?;

        if !weights.exists() {
            bail!(
                "Archive {} did not contain {}",
                archive.display(),
                weights.display()
            );
        }

        info!(weights = %weights.display(), "Extracted model successfully");
        Ok(())
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self { onnx_threads: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;
    use zip::write::SimpleFileOptions;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("loader_{}_{}", tag, uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_ensure_weights_present_is_noop() {
        let dir = scratch_dir("present");
        let weights = dir.join("covid_resnet.onnx");
        fs::write(&weights, b"weights").unwrap();

        // No archive needed when the weights already exist
        let archive = dir.join("covid_resnet.zip");
        ModelLoader::ensure_resnet_weights(&dir, &weights, &archive).unwrap();

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_ensure_weights_extracts_archive() {
        let dir = scratch_dir("extract");
        let weights = dir.join("covid_resnet.onnx");
        let archive = dir.join("covid_resnet.zip");

        let file = fs::File::create(&archive).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("covid_resnet.onnx", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"weights").unwrap();
        zip.finish().unwrap();

        ModelLoader::ensure_resnet_weights(&dir, &weights, &archive).unwrap();
        assert!(weights.exists());
        assert_eq!(fs::read(&weights).unwrap(), b"weights");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_ensure_weights_missing_archive_is_an_error() {
        let dir = scratch_dir("missing");
        let weights = dir.join("covid_resnet.onnx");
        let archive = dir.join("covid_resnet.zip");

        let err = ModelLoader::ensure_resnet_weights(&dir, &weights, &archive).unwrap_err();
        assert!(err.to_string().contains("archive"));

        fs::remove_dir_all(&dir).unwrap();
    }
}
