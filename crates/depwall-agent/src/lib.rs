//! depwall agent
//!
//! Hosts the decision engine the way a receive path would:
//!
//! ```text
//!  policy.json ──► PolicyReloader ──┐
//!                                   ▼
//!                           ┌───────────────┐        ┌──────────┐
//!  hex frames ──► feed ──►  │  WorkerPool   │ ─────► │ Decision │
//!                  (bounded │  (OS threads) │        │  Engine  │
//!                  channel) └───────────────┘        └────┬─────┘
//!                                                         │
//!                              Reporter ◄── counters ─────┘
//!                          (logs + metrics gauges)
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod feed;
pub mod reload;
pub mod report;
pub mod workers;

pub use config::AgentConfig;
pub use feed::{FeedSummary, FrameSource};
pub use reload::{PolicyReloader, ReloadOutcome};
pub use report::Reporter;
pub use workers::{WorkerPool, WorkerReport};

use anyhow::Context;
use depwall_dataplane::{ControlPlane, CounterSnapshot, DecisionEngine};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// What one agent run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Counters at shutdown
    pub counters: CounterSnapshot,
    /// Replay counts, if frames were read to the end
    pub feed: Option<FeedSummary>,
    /// Per-worker counts
    pub workers: Vec<WorkerReport>,
    /// Stopped by Ctrl-C rather than end of input
    pub interrupted: bool,
}

/// Run the agent until the frame input ends or Ctrl-C.
///
/// Without a frame source the agent only serves policy reloads and
/// reports until interrupted.
pub async fn run(config: AgentConfig, frames: Option<FrameSource>) -> anyhow::Result<RunSummary> {
    config.validate()?;

    let engine = Arc::new(DecisionEngine::with_limits(config.engine.clone(), config.tables));
    let control = ControlPlane::for_engine(&engine);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    info!(
        interface = %config.interface,
        workers = config.workers,
        enforce_source_auth = config.engine.enforce_source_auth,
        on_malformed = ?config.engine.on_malformed,
        "starting depwall agent"
    );

    match &config.policy_path {
        Some(path) => {
            let mut reloader =
                PolicyReloader::new(path, control.clone(), config.reload_timeout());
            reloader.reload().await.context("loading initial policy")?;
            if let Some(period) = config.reload_interval() {
                tasks.push(tokio::spawn(reloader.run(period, shutdown_rx.clone())));
            }
        }
        None => warn!("no policy_path configured; every IPv4 frame will be denied"),
    }

    let reporter = Reporter::new(control.clone(), config.interface.clone());
    tasks.push(tokio::spawn(
        reporter.run(config.stats_interval(), shutdown_rx.clone()),
    ));

    let pool = WorkerPool::spawn(Arc::clone(&engine), config.workers, config.queue_depth)
        .context("spawning worker threads")?;

    // Input errors are held until the pool is drained and the tasks stopped
    let outcome: anyhow::Result<(Option<FeedSummary>, bool)> = match &frames {
        Some(source) => tokio::select! {
            result = feed::feed_source(source, &pool) => result.map(|summary| (Some(summary), false)),
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for Ctrl-C").map(|()| (None, true))
            }
        },
        None => tokio::signal::ctrl_c()
            .await
            .context("listening for Ctrl-C")
            .map(|()| (None, true)),
    };
    if matches!(outcome, Ok((_, true))) {
        info!("interrupted, shutting down");
    }

    let workers = tokio::task::spawn_blocking(move || pool.join())
        .await
        .context("joining worker threads");

    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }

    let counters = control.read_counters();
    report::publish_metrics(&counters, &control.session_stats(), control.active_sessions());
    info!(%counters, drop_rate = counters.drop_rate(), "final counters");

    let (feed, interrupted) =
        outcome.with_context(|| format!("frame input stopped at {}", counters))?;
    let workers = workers?;
    Ok(RunSummary {
        counters,
        feed,
        workers,
        interrupted,
    })
}
