//! Decision engine
//!
//! Per-frame state machine, terminal states PASS / DROP:
//!
//! ```text
//! total++ ─► parse ─┬─ malformed ──────► invalid++ ─► FailMode verdict
//!                   ├─ not IPv4 ───────► PASS
//!                   └─ IPv4 ─► [auth] ─┬─ mismatch ─► DROP
//!                                      └─ ok ─► [session touch] ─► dependency
//!                                                     allowed++ PASS ◄─┤
//!                                                     dropped++ DROP ◄─┘
//! ```
//!
//! Every collaborator is injected, so tests build an engine over fresh
//! tables. Nothing on this path allocates, blocks on I/O, or loops without
//! bound; the only lock is the session shard mutex, held for one O(1) touch.

use crate::parser::{self, ParseError, ParseOutcome, ParsedHeaders};
use crate::session::{SessionKey, SessionTracker, Touch};
use crate::stats::{Counter, Statistics};
use crate::DEFAULT_SESSION_CAPACITY;
use depwall_common::Verdict;
use depwall_policy::{AuthTable, DependencyTable, TableLimits};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Verdict for frames whose headers cannot be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    /// Drop malformed frames
    #[default]
    FailClosed,
    /// Pass malformed frames
    FailOpen,
}

impl FailMode {
    /// Verdict applied to a malformed frame
    #[inline(always)]
    pub const fn verdict(self) -> Verdict {
        match self {
            FailMode::FailClosed => Verdict::Drop,
            FailMode::FailOpen => Verdict::Pass,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Drop frames whose source MAC is not bound to their source IP
    pub enforce_source_auth: bool,
    /// Malformed frame handling
    pub on_malformed: FailMode,
    /// Also count authentication failures as `invalid`
    pub count_auth_failure_as_invalid: bool,
    /// Session tracker capacity
    pub session_capacity: usize,
    /// Session tracker shards; derived from capacity when unset
    pub session_shards: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enforce_source_auth: false,
            on_malformed: FailMode::FailClosed,
            count_auth_failure_as_invalid: false,
            session_capacity: DEFAULT_SESSION_CAPACITY,
            session_shards: None,
        }
    }
}

impl EngineConfig {
    /// Empty session tracker sized by this config
    pub fn build_session_tracker(&self) -> SessionTracker {
        match self.session_shards {
            Some(shards) => SessionTracker::with_shards(self.session_capacity, shards),
            None => SessionTracker::new(self.session_capacity),
        }
    }
}

/// Why a verdict was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Authorized by a dependency edge
    Admitted,
    /// Not IPv4; passed without policy
    NotApplicable,
    /// Headers did not fit or were invalid
    Malformed,
    /// Source MAC not bound to the claimed source IP
    AuthFailure,
    /// No authorizing dependency edge
    PolicyDenied,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Reason::Admitted => "admitted",
            Reason::NotApplicable => "not_applicable",
            Reason::Malformed => "malformed",
            Reason::AuthFailure => "auth_failure",
            Reason::PolicyDenied => "policy_denied",
        })
    }
}

/// Verdict plus the path that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// PASS / DROP
    pub verdict: Verdict,
    /// Terminal state
    pub reason: Reason,
    /// Session tracker outcome, for TCP/UDP frames that reached it
    pub session: Option<Touch>,
}

impl Decision {
    #[inline(always)]
    const fn new(verdict: Verdict, reason: Reason) -> Self {
        Self {
            verdict,
            reason,
            session: None,
        }
    }
}

/// Per-frame admission engine
pub struct DecisionEngine {
    config: EngineConfig,
    auth: Arc<AuthTable>,
    dependencies: Arc<DependencyTable>,
    sessions: Arc<SessionTracker>,
    stats: Arc<Statistics>,
}

impl DecisionEngine {
    /// Create over shared collaborators
    pub fn new(
        config: EngineConfig,
        auth: Arc<AuthTable>,
        dependencies: Arc<DependencyTable>,
        sessions: Arc<SessionTracker>,
        stats: Arc<Statistics>,
    ) -> Self {
        Self {
            config,
            auth,
            dependencies,
            sessions,
            stats,
        }
    }

    /// Create with empty tables sized by `config` and `limits`
    pub fn with_limits(config: EngineConfig, limits: TableLimits) -> Self {
        let (auth, dependencies) = limits.build();
        let sessions = config.build_session_tracker();
        Self::new(
            config,
            Arc::new(auth),
            Arc::new(dependencies),
            Arc::new(sessions),
            Arc::new(Statistics::new()),
        )
    }

    /// Classify one raw frame
    #[inline]
    pub fn classify(&self, frame: &[u8]) -> Verdict {
        self.decide(frame).verdict
    }

    /// Classify one raw frame, reporting the terminal state
    pub fn decide(&self, frame: &[u8]) -> Decision {
        self.stats.increment(Counter::Total);

        match parser::parse(frame) {
            Ok(ParseOutcome::Ipv4(headers)) => self.decide_ipv4(&headers),
            Ok(ParseOutcome::NotApplicable { ethertype }) => {
                trace!(ethertype, "non-IPv4 frame passed");
                Decision::new(Verdict::Pass, Reason::NotApplicable)
            }
            Err(err) => self.malformed(frame.len(), err),
        }
    }

    #[inline]
    fn malformed(&self, len: usize, err: ParseError) -> Decision {
        self.stats.increment(Counter::Invalid);
        let verdict = self.config.on_malformed.verdict();
        trace!(len, %err, %verdict, "malformed frame");
        Decision::new(verdict, Reason::Malformed)
    }

    #[inline]
    fn decide_ipv4(&self, headers: &ParsedHeaders) -> Decision {
        if self.config.enforce_source_auth && !self.auth.verify(&headers.src_mac, headers.src_ip) {
            if self.config.count_auth_failure_as_invalid {
                self.stats.increment(Counter::Invalid);
            }
            trace!(mac = %headers.src_mac, src = %headers.src_ip, "source authentication failed");
            return Decision::new(Verdict::Drop, Reason::AuthFailure);
        }

        let session = SessionKey::from_headers(headers).map(|key| self.sessions.touch(key));

        let (verdict, reason) = if self
            .dependencies
            .is_authorized(headers.src_ip, headers.dst_ip)
        {
            self.stats.increment(Counter::Allowed);
            (Verdict::Pass, Reason::Admitted)
        } else {
            self.stats.increment(Counter::Dropped);
            (Verdict::Drop, Reason::PolicyDenied)
        };

        trace!(
            src = %headers.src_ip,
            dst = %headers.dst_ip,
            proto = %headers.protocol,
            ?session,
            %verdict,
            "policy decision"
        );

        Decision {
            verdict,
            reason,
            session,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Authentication table
    pub fn auth(&self) -> &Arc<AuthTable> {
        &self.auth
    }

    /// Dependency table
    pub fn dependencies(&self) -> &Arc<DependencyTable> {
        &self.dependencies
    }

    /// Session tracker
    pub fn sessions(&self) -> &Arc<SessionTracker> {
        &self.sessions
    }

    /// Statistics registry
    pub fn stats(&self) -> &Arc<Statistics> {
        &self.stats
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::with_limits(EngineConfig::default(), TableLimits::default())
    }
}
