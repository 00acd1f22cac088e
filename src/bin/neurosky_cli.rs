use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::stream::BoxStream;
use futures::StreamExt;
use neurosky_trainer::config::AppConfig;
use neurosky_trainer::engine::{Pipeline, PipelineEvent};
use neurosky_trainer::error::{ErrorCode, TrainingError};
use tokio::runtime::{Builder, Runtime};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "neurosky_cli",
    about = "Stream NeuroSky EEG features and run labeled training sessions"
)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// JSON configuration file (defaults to assets/neurosky_config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Generate synthetic samples instead of connecting to a ThinkGear bridge
    #[arg(long, global = true)]
    synthetic: bool,
    /// ThinkGear connector host
    #[arg(long, global = true)]
    host: Option<String>,
    /// ThinkGear connector port
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print quality, sampling rate and feature vectors as JSON lines
    Stream {
        /// Seconds to stream before closing
        #[arg(long, default_value_t = 10)]
        duration_secs: u64,
        /// Also print every raw sample
        #[arg(long)]
        samples: bool,
    },
    /// Train one session per label read from stdin, printing predictions in between
    Train {
        /// Labels to register up front; unknown labels read from stdin are registered on first use
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
        /// Override the delay before recording starts
        #[arg(long)]
        wait_ms: Option<u64>,
        /// Override the recording length
        #[arg(long)]
        recording_ms: Option<u64>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.source);

    let runtime = Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("building async runtime")?;

    match cli.command {
        Commands::Stream {
            duration_secs,
            samples,
        } => run_stream(&runtime, config, Duration::from_secs(duration_secs), samples),
        Commands::Train {
            labels,
            wait_ms,
            recording_ms,
        } => {
            if let Some(wait_ms) = wait_ms {
                config.training.training_wait_ms = wait_ms;
            }
            if let Some(recording_ms) = recording_ms {
                config.training.recording_ms = recording_ms;
            }
            run_train(&runtime, config, &labels)
        }
    }
}

fn load_config(source: &SourceArgs) -> AppConfig {
    let mut config = match &source.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };
    if source.synthetic {
        config.acquisition.synthetic = true;
    }
    if let Some(host) = &source.host {
        config.acquisition.host = host.clone();
    }
    if let Some(port) = source.port {
        config.acquisition.port = port;
    }
    config
}

fn run_stream(
    runtime: &Runtime,
    config: AppConfig,
    duration: Duration,
    samples: bool,
) -> Result<ExitCode> {
    let pipeline = Pipeline::new(config).context("building pipeline")?;
    let events = pipeline.events(samples);
    pipeline.start().context("starting pipeline")?;

    runtime.block_on(async {
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);
        let mut events = events;
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.next() => match event {
                    Some(event) => emit(&event)?,
                    None => break,
                },
            }
        }
        Ok::<(), anyhow::Error>(())
    })?;

    pipeline
        .close()
        .context("acquisition session ended with an error")?;
    Ok(ExitCode::from(0))
}

fn run_train(runtime: &Runtime, config: AppConfig, labels: &[String]) -> Result<ExitCode> {
    let pipeline = Pipeline::new(config).context("building pipeline")?;
    let trainer = pipeline.trainer();
    for label in labels {
        trainer
            .register(label)
            .with_context(|| format!("registering {}", label))?;
    }

    let printer = runtime.spawn(print_events(pipeline.events(false)));
    pipeline.start().context("starting pipeline")?;
    eprintln!("Type a label and press enter to train it; an empty line or EOF quits.");

    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        let label = line.trim();
        if label.is_empty() {
            break;
        }
        if trainer.target(label).is_none() {
            trainer
                .register(label)
                .with_context(|| format!("registering {}", label))?;
        }

        match trainer.train(label) {
            // The summary is printed by the event stream
            Ok(session) => match session.join() {
                Ok(_) => {}
                Err(TrainingError::Cancelled) => break,
                Err(err) => eprintln!("Session for {} failed: {}", label, err.message()),
            },
            Err(err) => eprintln!("Cannot train {}: {}", label, err.message()),
        }
    }

    let closed = pipeline.close();
    runtime
        .block_on(printer)
        .context("event printer panicked")??;
    closed.context("acquisition session ended with an error")?;
    Ok(ExitCode::from(0))
}

async fn print_events(mut events: BoxStream<'static, PipelineEvent>) -> Result<()> {
    while let Some(event) = events.next().await {
        emit(&event)?;
    }
    Ok(())
}

fn emit(event: &PipelineEvent) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
