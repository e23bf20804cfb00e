//! uireplay CLI - Main Entry Point
//!
//! Runs stored step sequences against a target URL and records new
//! sequences from a live browser session.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uireplay_common::{DeviceProfile, ExecutionJob, Result as CoreResult, Step};
use uireplay_engine::{Engine, EngineConfig, EventSink};

/// uireplay - browser UI test replay and recording
#[derive(Parser)]
#[command(name = "uireplay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(long, default_value = "uireplay.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a stored step sequence against a URL
    Run(RunArgs),

    /// Record a live browser session, streaming steps as JSON lines
    Record(RecordArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// JSON file holding the step sequence
    #[arg(long)]
    steps: PathBuf,

    /// Target URL to replay against
    #[arg(long)]
    url: String,

    /// Emulated viewport width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Emulated viewport height
    #[arg(long, default_value_t = 800)]
    height: u32,

    /// Emulated user agent
    #[arg(long, default_value = "")]
    user_agent: String,

    /// Run with a visible browser window
    #[arg(long)]
    visual: bool,
}

#[derive(clap::Args)]
struct RecordArgs {
    /// URL to open for recording
    #[arg(long)]
    url: String,

    /// Session id; generated when omitted
    #[arg(long)]
    session_id: Option<String>,

    /// Emulated viewport width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Emulated viewport height
    #[arg(long, default_value_t = 800)]
    height: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = EngineConfig::load(&cli.config)?;
    let engine = Engine::new(config)?;

    let outcome = match cli.command {
        Commands::Run(args) => run(&engine, args).await,
        Commands::Record(args) => record(&engine, args).await,
    };

    engine.shutdown().await;
    outcome
}

async fn run(engine: &Engine, args: RunArgs) -> anyhow::Result<()> {
    let steps: Vec<Step> = serde_json::from_str(&std::fs::read_to_string(&args.steps)?)?;
    info!("Loaded {} steps from {}", steps.len(), args.steps.display());

    let job = ExecutionJob {
        execution_id: uuid::Uuid::new_v4().as_u128() as u64,
        steps,
        device: DeviceProfile {
            name: format!("{}x{}", args.width, args.height),
            width: args.width,
            height: args.height,
            user_agent: args.user_agent,
        },
        target_url: args.url,
        visual: args.visual,
    };

    let result = engine.scheduler().submit(job).await?.await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.success {
        Ok(())
    } else {
        anyhow::bail!("replay failed: {}", result.error_message)
    }
}

async fn record(engine: &Engine, args: RecordArgs) -> anyhow::Result<()> {
    let session_id = args
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let device = DeviceProfile {
        name: format!("{}x{}", args.width, args.height),
        width: args.width,
        height: args.height,
        user_agent: String::new(),
    };

    engine
        .recorder()
        .start(&session_id, &args.url, device)
        .await?;
    engine
        .recorder()
        .attach_subscriber(&session_id, Arc::new(StdoutSink))?;

    info!("Recording session {} started; press Ctrl-C to stop", session_id);
    tokio::signal::ctrl_c().await?;

    engine.recorder().stop(&session_id)?;
    let status = engine.recorder().status(&session_id)?;
    engine.recorder().cleanup(&session_id)?;

    eprintln!("Captured {} steps", status.steps.len());
    println!("{}", serde_json::to_string_pretty(&status.steps)?);
    Ok(())
}

/// Streams each recorded step to stdout as one JSON line.
struct StdoutSink;

#[async_trait]
impl EventSink for StdoutSink {
    async fn emit(&self, step: &Step) -> CoreResult<()> {
        println!("{}", serde_json::to_string(step)?);
        Ok(())
    }
}
