mod analytics;
mod config;
mod data;
mod decision;
mod error;
mod ml;
mod pipeline;
mod types;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::load_config;
use crate::data::{read_csv, write_csv};
use crate::pipeline::RegimePipeline;
use crate::types::FeatureFrame;

#[derive(Parser)]
#[command(name = "regime-switch")]
#[command(author = "Trading Bot")]
#[command(version = "0.1.0")]
#[command(about = "Regime-switching decision pipeline over order-flow features", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "regime.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the online clusterer on the latest window
    FitClusters {
        /// Feature CSV
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Train the transition probability model
    Train {
        /// Labelled feature CSV
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Score rows with the trained model and the decision gate
    Infer {
        /// Feature CSV
        #[arg(short, long)]
        input: PathBuf,
        /// Scored CSV destination
        #[arg(short, long, default_value = "output/tvtp/scored.csv")]
        output: PathBuf,
    },
    /// Write calibration metrics for a scored CSV
    Summarize {
        /// Scored CSV produced by `infer`
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Clusterer stage followed by transition training
    Pipeline {
        /// Feature CSV for the clusterer
        #[arg(long)]
        cluster_input: PathBuf,
        /// Labelled feature CSV for training
        #[arg(long)]
        transition_input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs)?;

    info!("Regime Switch v0.1.0");

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(Some(&cli.config))
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let pipeline = RegimePipeline::from_config(config)?;

    match cli.command {
        Commands::FitClusters { input } => {
            let summary = pipeline.fit_clusters(&load_frame(&input)?)?;
            info!(
                "prototype_drift={:.4} label_switch={}",
                summary.prototype_drift, summary.label_switch
            );
        }
        Commands::Train { input } => {
            let outcome = pipeline.train(&load_frame(&input)?)?;
            info!(
                "Trained {} -> {} in {} iterations: ece={:.4} brier={:.4} n={}",
                outcome.artifact.state_a,
                outcome.artifact.state_b,
                outcome.iterations,
                outcome.calibration.ece,
                outcome.calibration.brier,
                outcome.calibration.count
            );
        }
        Commands::Infer { input, output } => {
            let scored = pipeline.score(&load_frame(&input)?)?;
            write_csv(&scored, &output).with_context(|| format!("writing {}", output.display()))?;
            info!("Wrote {} scored rows to {}", scored.len(), output.display());
        }
        Commands::Summarize { input } => {
            let summary = pipeline.summarize(&load_frame(&input)?)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Pipeline {
            cluster_input,
            transition_input,
        } => {
            let summary = pipeline.run_training(&load_frame(&cluster_input)?, &load_frame(&transition_input)?)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn load_frame(path: &Path) -> Result<FeatureFrame> {
    let frame = read_csv(path).with_context(|| format!("reading {}", path.display()))?;
    info!("Loaded {} rows x {} columns from {}", frame.len(), frame.column_names().len(), path.display());
    Ok(frame)
}
