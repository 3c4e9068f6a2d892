//! depwall agent - main entry point

use anyhow::Context;
use clap::Parser;
use depwall_agent::{AgentConfig, FrameSource};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "depwall-agent")]
#[command(version)]
#[command(about = "Dependency-graph packet filter agent", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, short, env = "DEPWALL_CONFIG")]
    config: Option<PathBuf>,

    /// Hex-encoded frames to classify, one per line ("-" for stdin)
    #[arg(long, short)]
    frames: Option<FrameSource>,

    /// Worker threads (overrides the config file)
    #[arg(long, short)]
    workers: Option<usize>,

    /// Policy document (overrides the config file)
    #[arg(long, short)]
    policy: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("depwall agent v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            tracing::warn!("no config file given, using defaults");
            AgentConfig::default()
        }
    };
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(policy) = cli.policy {
        config.policy_path = Some(policy);
    }

    let summary = depwall_agent::run(config, cli.frames).await?;
    if let Some(feed) = summary.feed {
        tracing::info!(
            lines = feed.lines,
            frames = feed.frames,
            rejected = feed.rejected,
            "replay complete"
        );
    }

    Ok(())
}
