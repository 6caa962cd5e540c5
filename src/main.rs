//! Plant Health CLI
//!
//! Thin command line front end over the library: it wires configuration and
//! logging, then runs a single prediction or inspects a checkpoint.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use plant_health::backend::{backend_name, default_device, InferenceBackend};
use plant_health::checkpoint::{classifier_weight_keys, infer_classifier_head, CheckpointNormalizer};
use plant_health::utils::format_duration;
use plant_health::utils::logging::{init_logging, LogConfig};
use plant_health::{Checkpoint, HealthStatus, PredictionResponse, Predictor, PredictorConfig};

/// Plant disease inference with a fine-tuned VGG classifier
#[derive(Parser, Debug)]
#[command(name = "plant-health")]
#[command(version = plant_health::VERSION)]
#[command(about = "Plant health prediction with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Predict crop and health status for one image
    Predict {
        /// Path to the input image
        #[arg(short, long)]
        image: PathBuf,

        /// Path to the checkpoint (.pth, .pt, .bin, .ckpt or .json)
        #[arg(short, long, env = "PLANT_HEALTH_CHECKPOINT")]
        checkpoint: Option<PathBuf>,

        /// Reference directory whose subdirectories name the classes
        #[arg(short, long, env = "PLANT_HEALTH_LABELS")]
        labels: Option<PathBuf>,

        /// Confidence threshold below which the status is Uncertain (0.0-1.0)
        #[arg(short, long, env = "PLANT_HEALTH_THRESHOLD")]
        threshold: Option<f32>,

        /// Predictor configuration JSON; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the JSON response instead of formatted text
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Show normalized parameter names and the classifier head of a checkpoint
    Inspect {
        /// Path to the checkpoint
        #[arg(short, long, env = "PLANT_HEALTH_CHECKPOINT")]
        checkpoint: PathBuf,

        /// Namespace prefixes to strip (defaults to "network." and "module.")
        #[arg(short, long)]
        prefix: Vec<String>,

        /// List every parameter instead of only classifier weights
        #[arg(long, default_value = "false")]
        all: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let json = matches!(cli.command, Commands::Predict { json: true, .. });
    let _ = init_logging(&LogConfig::for_cli(cli.verbose, json));

    match cli.command {
        Commands::Predict {
            image,
            checkpoint,
            labels,
            threshold,
            config,
            json,
        } => {
            let config = build_config(config.as_deref(), checkpoint, labels, threshold)?;
            cmd_predict(&config, &image, json)?;
        }

        Commands::Inspect {
            checkpoint,
            prefix,
            all,
        } => {
            cmd_inspect(&checkpoint, &prefix, all)?;
        }
    }

    Ok(())
}

fn build_config(
    config_path: Option<&Path>,
    checkpoint: Option<PathBuf>,
    labels: Option<PathBuf>,
    threshold: Option<f32>,
) -> Result<PredictorConfig> {
    let mut config = match config_path {
        Some(path) => PredictorConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PredictorConfig::default(),
    };

    if let Some(checkpoint) = checkpoint {
        config.checkpoint_path = checkpoint;
    }
    if let Some(labels) = labels {
        config.labels_path = Some(labels);
    }
    if let Some(threshold) = threshold {
        config.confidence_threshold = threshold;
    }

    config.validate()?;
    Ok(config)
}

fn cmd_predict(config: &PredictorConfig, image: &Path, json: bool) -> Result<()> {
    info!("Running prediction");
    info!("  Image: {:?}", image);
    info!("  Checkpoint: {:?}", config.checkpoint_path);

    if !json {
        println!("{}", "Prediction Configuration:".cyan().bold());
        println!("  Image:      {}", image.display());
        println!("  Checkpoint: {}", config.checkpoint_path.display());
        match &config.labels_path {
            Some(labels) => println!("  Labels:     {}", labels.display()),
            None => println!("  Labels:     (placeholder)"),
        }
        println!("  Threshold:  {:.2}", config.confidence_threshold);
        println!("  Backend:    {}", backend_name());
        println!();
        println!("{}", "Loading model...".cyan());
    }

    let predictor = Predictor::<InferenceBackend>::initialize(config, default_device())
        .context("Failed to initialize predictor")?;

    if !json {
        let report = predictor.load_report();
        println!(
            "  Loaded {} tensors ({} kept initialization, {} ignored)",
            report.loaded.len(),
            report.missing.len(),
            report.unexpected.len()
        );
        println!("  Classes: {}", predictor.num_classes());
        println!();
    }

    let response = predictor.respond_file(image, None);

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return ensure_prediction(&response);
    }

    match &response {
        PredictionResponse::Prediction(report) => {
            let decision = report.decision.to_string();
            let decision = match report.decision.status {
                HealthStatus::Healthy => decision.green().bold(),
                HealthStatus::Diseased => decision.red().bold(),
                HealthStatus::Uncertain | HealthStatus::Unknown => decision.yellow().bold(),
            };
            println!("{}", "Result:".cyan().bold());
            println!("  {}", decision);
            println!("  Label: {} (class {})", report.label, report.class_index);
            println!(
                "  Time:  {}",
                format_duration(report.inference_time_ms / 1000.0)
            );
            println!();
            println!("{}", "Top predictions:".cyan());
            for (rank, candidate) in report.top_k.iter().enumerate() {
                println!(
                    "  {}. {:<40} {:>6.2}%",
                    rank + 1,
                    candidate.label,
                    candidate.probability * 100.0
                );
            }
        }
        PredictionResponse::Error(message) => {
            println!("{} {}", "Error:".red(), message);
        }
    }

    ensure_prediction(&response)
}

/// Turn an error response into a failing exit status once it has been printed
fn ensure_prediction(response: &PredictionResponse) -> Result<()> {
    match response {
        PredictionResponse::Prediction(_) => Ok(()),
        PredictionResponse::Error(message) => anyhow::bail!("Prediction failed: {}", message),
    }
}

fn cmd_inspect(path: &Path, prefixes: &[String], all: bool) -> Result<()> {
    let checkpoint = Checkpoint::load(path)
        .with_context(|| format!("Failed to read checkpoint {}", path.display()))?;

    let normalizer = if prefixes.is_empty() {
        CheckpointNormalizer::default()
    } else {
        CheckpointNormalizer::new(prefixes.iter().cloned())
    };
    let normalized = normalizer.normalize(&checkpoint);

    println!("{}", "Checkpoint:".cyan().bold());
    println!("  Path:       {}", path.display());
    println!("  Tensors:    {}", normalized.len());
    println!("  Parameters: {}", normalized.num_parameters());
    println!("  Prefixes:   {:?}", normalizer.prefixes());
    println!();

    if all {
        println!("{}", "Parameters:".cyan());
        for (key, tensor) in normalized.iter() {
            println!("  {:<40} {:?}", key, tensor.shape);
        }
        println!();
    }

    println!("{}", "Classifier weights:".cyan());
    for key in classifier_weight_keys(&normalized) {
        if let Some(tensor) = normalized.get(key) {
            println!("  {:<40} {:?}", key, tensor.shape);
        }
    }
    println!();

    match infer_classifier_head(&normalized) {
        Ok(head) => {
            println!("{}", "Classifier head:".green().bold());
            println!("  Key:         {}", head.key);
            println!("  Classes:     {}", head.num_classes);
            if let Some(in_features) = head.in_features {
                println!("  In features: {}", in_features);
            }
        }
        Err(e) => {
            println!("{} {}", "Error:".red(), e);
        }
    }

    Ok(())
}
