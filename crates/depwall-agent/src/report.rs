//! Periodic counter reporting

use depwall_dataplane::{ControlPlane, Counter, CounterSnapshot, SessionStats};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Publish counters as `metrics` gauges
pub fn publish_metrics(counters: &CounterSnapshot, sessions: &SessionStats, active_sessions: usize) {
    for counter in Counter::ALL {
        metrics::gauge!(format!("depwall_packets_{}", counter)).set(counters.get(counter) as f64);
    }
    metrics::gauge!("depwall_sessions_active").set(active_sessions as f64);
    metrics::gauge!("depwall_sessions_evicted").set(sessions.evicted as f64);
}

/// Logs and publishes counters on an interval
pub struct Reporter {
    control: ControlPlane,
    interface: String,
    last: CounterSnapshot,
}

impl Reporter {
    /// Create for the engine behind `control`
    pub fn new(control: ControlPlane, interface: impl Into<String>) -> Self {
        Self {
            control,
            interface: interface.into(),
            last: CounterSnapshot::default(),
        }
    }

    /// Take one snapshot, log it with the change since the previous one,
    /// and publish it
    pub fn report(&mut self) -> CounterSnapshot {
        let counters = self.control.read_counters();
        let sessions = self.control.session_stats();
        let active = self.control.active_sessions();
        let delta = counters.delta(&self.last);

        info!(
            interface = %self.interface,
            total = counters.total,
            allowed = counters.allowed,
            dropped = counters.dropped,
            invalid = counters.invalid,
            new_frames = delta.total,
            drop_rate = counters.drop_rate(),
            active_sessions = active,
            evicted_sessions = sessions.evicted,
            "counters"
        );
        publish_metrics(&counters, &sessions, active);

        self.last = counters;
        counters
    }

    /// Report every `period` until `shutdown` flips to true
    pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.report();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("reporter stopped");
    }
}
