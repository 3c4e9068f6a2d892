//! Control-plane facade
//!
//! The operations an external loader or CLI uses to configure the engine
//! and poll its counters. Every mutation publishes a new table snapshot;
//! frames already being classified finish against the snapshot they loaded.

use crate::engine::DecisionEngine;
use crate::session::{SessionStats, SessionTracker};
use crate::stats::{CounterSnapshot, Statistics};
use depwall_common::{DepwallResult, MacAddr};
use depwall_policy::{ApplySummary, AuthTable, DependencyTable, PolicyDocument};
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Handle onto the engine's shared state
#[derive(Clone)]
pub struct ControlPlane {
    auth: Arc<AuthTable>,
    dependencies: Arc<DependencyTable>,
    sessions: Arc<SessionTracker>,
    stats: Arc<Statistics>,
}

impl ControlPlane {
    /// Control handle sharing `engine`'s tables and counters
    pub fn for_engine(engine: &DecisionEngine) -> Self {
        Self {
            auth: Arc::clone(engine.auth()),
            dependencies: Arc::clone(engine.dependencies()),
            sessions: Arc::clone(engine.sessions()),
            stats: Arc::clone(engine.stats()),
        }
    }

    /// Bind `mac` to `addr`, replacing any previous binding
    pub fn install_auth_binding(&self, mac: MacAddr, addr: Ipv4Addr) -> DepwallResult<()> {
        self.auth.install(mac, addr).map(|_| ())
    }

    /// Drop the binding for `mac`; returns whether one existed
    pub fn remove_auth_binding(&self, mac: &MacAddr) -> bool {
        self.auth.remove(mac).is_some()
    }

    /// Install or update the directed edge `src -> dst`
    pub fn install_dependency(
        &self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        authorized: bool,
    ) -> DepwallResult<()> {
        self.dependencies.add(src, dst, authorized)
    }

    /// Remove the directed edge `src -> dst`; returns whether it existed
    pub fn remove_dependency(&self, src: Ipv4Addr, dst: Ipv4Addr) -> bool {
        self.dependencies.remove(src, dst)
    }

    /// Replace both tables from a policy document
    pub fn apply_policy(&self, document: &PolicyDocument) -> DepwallResult<ApplySummary> {
        document.apply(&self.auth, &self.dependencies)
    }

    /// Current counter values
    pub fn read_counters(&self) -> CounterSnapshot {
        self.stats.snapshot()
    }

    /// Session tracker counters
    pub fn session_stats(&self) -> SessionStats {
        self.sessions.stats()
    }

    /// Sessions currently tracked
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Authentication table
    pub fn auth(&self) -> &AuthTable {
        &self.auth
    }

    /// Dependency table
    pub fn dependencies(&self) -> &DependencyTable {
        &self.dependencies
    }
}
