//! Opacity Detector - Main Entry Point
//!
//! Scans a directory of chest X-ray images, scores each one with the
//! selected ONNX model (or the two-model ensemble), prints the verdict
//! tallies, and optionally renders saliency heatmap overlays.

use anyhow::{bail, Result};
use clap::Parser;
use console::style;
use opacity_detector::{
    cli::{self, Args, ModelChoice},
    config::AppConfig,
    metrics::RunMetrics,
    models::aggregator,
    models::inference::Predictor,
    models::loader::ModelLoader,
    preprocess::ModelFamily,
    scan::{self, ScanOutcome},
    types::{BatchReport, RunReport},
    visualizer::Visualizer,
};
use std::path::PathBuf;
use std::process;
use tracing::info;

fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?;
    init_logging(&config.logging.level);

    info!("Starting opacity detector");

    let images_dir = match &args.images_dir {
        Some(dir) => dir.clone(),
        None if args.no_input => bail!("--images-dir is required with --no-input"),
        None => cli::prompt_images_dir()?,
    };

    let raw_choice = match &args.model {
        Some(model) => model.clone(),
        None if args.no_input => bail!("--model is required with --no-input"),
        None => cli::prompt_model_choice()?,
    };

    let choice = match ModelChoice::parse(&raw_choice) {
        Some(choice) => choice,
        None => {
            println!("{}", style("Invalid Option").red());
            process::exit(1);
        }
    };

    let verbose = if args.verbose {
        true
    } else if args.no_input {
        false
    } else {
        cli::prompt_confirm("Enable verbose output?", false)?
    };

    let outcome = scan::scan_directory(&images_dir)?;
    info!(
        accepted = outcome.accepted.len(),
        skipped = outcome.skipped,
        "Scanned image directory"
    );

    let metrics = RunMetrics::new();
    let loader = ModelLoader::with_threads(config.models.onnx_threads)?;

    match choice.family() {
        Some(family) => run_single(&args, &config, &loader, &outcome, family, verbose, &metrics),
        None => run_ensemble(&args, &config, &loader, &outcome, verbose, &metrics),
    }
}

/// Score the batch with one model, then offer heatmap rendering.
fn run_single(
    args: &Args,
    config: &AppConfig,
    loader: &ModelLoader,
    outcome: &ScanOutcome,
    family: ModelFamily,
    verbose: bool,
    metrics: &RunMetrics,
) -> Result<()> {
    let model_path = match family {
        ModelFamily::Resnet => {
            ModelLoader::ensure_resnet_weights(
                &config.models_dir(),
                &config.resnet_path(),
                &config.resnet_archive_path(),
            )?;
            config.resnet_path()
        }
        ModelFamily::Custom => config.custom_path(),
    };

    let model = loader.load_model(&model_path, family)?;
    let mut predictor = Predictor::new(model, config.detection.threshold);

    let verdicts = predictor.predict_batch(&outcome.accepted, verbose, metrics)?;
    let report = BatchReport::new(verdicts, outcome.skipped);

    print_skip_notice(&report);
    write_report(
        args,
        &[predictor.model_name().to_string()],
        config.detection.threshold,
        &report,
    )?;

    let visualize = if args.visualize {
        true
    } else if args.no_input {
        false
    } else {
        cli::prompt_confirm("Do you want to visualise gradients?", false)?
    };

    if visualize {
        let mut visualizer = Visualizer::new(&config.display);
        if let Some(dir) = &args.output_dir {
            visualizer = visualizer.with_output_dir(dir.clone());
        }

        let layer = args.layer.as_deref().or(config.heatmap.layer.as_deref());
        let files: Vec<PathBuf> = report.verdicts.iter().map(|v| v.path.clone()).collect();
        visualizer.render_all(
            &files,
            &mut predictor,
            layer,
            config.heatmap.grid,
            !args.no_input,
        )?;
    }

    metrics.print_summary(&report);
    Ok(())
}

/// Score the batch with both models and average their scores per image.
/// The ensemble finishes after reporting; heatmaps belong to a single
/// model and are not offered here.
fn run_ensemble(
    args: &Args,
    config: &AppConfig,
    loader: &ModelLoader,
    outcome: &ScanOutcome,
    verbose: bool,
    metrics: &RunMetrics,
) -> Result<()> {
    ModelLoader::ensure_resnet_weights(
        &config.models_dir(),
        &config.resnet_path(),
        &config.resnet_archive_path(),
    )?;

    let resnet = loader.load_model(&config.resnet_path(), ModelFamily::Resnet)?;
    let custom = loader.load_model(&config.custom_path(), ModelFamily::Custom)?;

    let threshold = config.detection.threshold;
    let mut first = Predictor::new(resnet, threshold);
    let mut second = Predictor::new(custom, threshold);

    let verdicts = aggregator::run_ensemble(&mut first, &mut second, &outcome.accepted, metrics)?;

    if verbose {
        for verdict in &verdicts {
            println!("{} ---> {:.4}", verdict.path.display(), verdict.score);
        }
    }

    let report = BatchReport::new(verdicts, outcome.skipped);
    println!(
        "{}: {}",
        style("Ensembling results").magenta().bold(),
        report.counts()
    );

    print_skip_notice(&report);
    write_report(
        args,
        &[
            first.model_name().to_string(),
            second.model_name().to_string(),
        ],
        threshold,
        &report,
    )?;

    metrics.print_summary(&report);
    Ok(())
}

fn print_skip_notice(report: &BatchReport) {
    if report.skipped > 0 {
        println!(
            "{}",
            style(format!(
                "Skipped predictions on {} images due to invalid file formats. Supported formats: jpeg, jpg, png, jfif",
                report.skipped
            ))
            .yellow()
        );
    }
}

fn write_report(
    args: &Args,
    models: &[String],
    threshold: f32,
    report: &BatchReport,
) -> Result<()> {
    if let Some(path) = &args.report {
        RunReport::new(models.to_vec(), threshold, report).write_json(path)?;
        info!(path = %path.display(), "Run report written");
    }
    Ok(())
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}
