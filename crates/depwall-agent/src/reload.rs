//! Policy reloader
//!
//! Periodically re-reads the policy document and swaps it into the tables.
//! Each attempt is bounded by a timeout. A document that fails to read,
//! parse or fit leaves the last good tables in place.

use anyhow::{anyhow, Context};
use depwall_dataplane::ControlPlane;
use depwall_policy::{ApplySummary, PolicyDocument};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Result of one reload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// New contents applied
    Applied(ApplySummary),
    /// File contents identical to the last attempt
    Unchanged,
}

/// Watches one policy file
pub struct PolicyReloader {
    path: PathBuf,
    control: ControlPlane,
    timeout: Duration,
    last_seen: Option<String>,
    generation: u64,
}

impl PolicyReloader {
    /// Create for `path`; nothing is read until the first reload
    pub fn new(path: impl Into<PathBuf>, control: ControlPlane, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            control,
            timeout,
            last_seen: None,
            generation: 0,
        }
    }

    /// Watched file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of documents applied so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Read the file and apply it if its contents changed.
    ///
    /// Contents that fail to apply are remembered too, so a broken file is
    /// reported once rather than on every tick.
    pub async fn reload(&mut self) -> anyhow::Result<ReloadOutcome> {
        let text = timeout(self.timeout, tokio::fs::read_to_string(&self.path))
            .await
            .map_err(|_| anyhow!("timed out after {:?}", self.timeout))?
            .with_context(|| format!("reading {}", self.path.display()))?;

        if self.last_seen.as_deref() == Some(text.as_str()) {
            return Ok(ReloadOutcome::Unchanged);
        }

        let result = PolicyDocument::from_json(&text)
            .and_then(|doc| self.control.apply_policy(&doc))
            .with_context(|| format!("applying {}", self.path.display()));
        self.last_seen = Some(text);

        let summary = result?;
        self.generation += 1;
        info!(
            path = %self.path.display(),
            generation = self.generation,
            auth_bindings = summary.auth_bindings,
            dependencies = summary.dependencies,
            "policy reloaded"
        );
        Ok(ReloadOutcome::Applied(summary))
    }

    /// Reload every `period` until `shutdown` flips to true
    pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; the initial load already happened
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.reload().await {
                        Ok(ReloadOutcome::Unchanged) => debug!("policy unchanged"),
                        Ok(ReloadOutcome::Applied(_)) => {}
                        Err(err) => warn!("policy reload failed, keeping previous policy: {:#}", err),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(path = %self.path.display(), "policy reloader stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depwall_dataplane::DecisionEngine;
    use std::net::Ipv4Addr;

    const A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    fn setup() -> (tempfile::TempDir, PathBuf, ControlPlane) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let engine = DecisionEngine::default();
        (dir, path, ControlPlane::for_engine(&engine))
    }

    #[tokio::test]
    async fn test_reload_applies_then_skips_unchanged() {
        let (_dir, path, control) = setup();
        std::fs::write(
            &path,
            r#"{ "dependencies": [ { "source": "10.0.0.1", "destination": "10.0.0.2" } ] }"#,
        )
        .unwrap();

        let mut reloader = PolicyReloader::new(&path, control.clone(), Duration::from_secs(1));
        let outcome = reloader.reload().await.unwrap();
        assert!(matches!(outcome, ReloadOutcome::Applied(s) if s.dependencies == 1));
        assert!(control.dependencies().is_authorized(A, B));

        assert_eq!(reloader.reload().await.unwrap(), ReloadOutcome::Unchanged);
        assert_eq!(reloader.generation(), 1);
    }

    #[tokio::test]
    async fn test_bad_document_keeps_previous_policy() {
        let (_dir, path, control) = setup();
        std::fs::write(
            &path,
            r#"{ "dependencies": [ { "source": "10.0.0.1", "destination": "10.0.0.2" } ] }"#,
        )
        .unwrap();
        let mut reloader = PolicyReloader::new(&path, control.clone(), Duration::from_secs(1));
        reloader.reload().await.unwrap();

        std::fs::write(&path, "{ not json").unwrap();
        assert!(reloader.reload().await.is_err());
        assert!(control.dependencies().is_authorized(A, B));

        // Same broken contents are not retried
        assert_eq!(reloader.reload().await.unwrap(), ReloadOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let (_dir, path, control) = setup();
        let mut reloader = PolicyReloader::new(&path, control, Duration::from_secs(1));
        assert!(reloader.reload().await.is_err());
        assert_eq!(reloader.generation(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_dir, path, control) = setup();
        std::fs::write(&path, "{}").unwrap();
        let reloader = PolicyReloader::new(&path, control, Duration::from_secs(1));

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(reloader.run(Duration::from_millis(10), rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        let stopped = tokio::time::timeout(Duration::from_secs(5), task).await;
        assert!(matches!(stopped, Ok(Ok(()))));
    }
}
