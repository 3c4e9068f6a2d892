//! depwall data plane
//!
//! Per-frame PASS/DROP decisions against a dependency-graph allow-list.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        DECISION ENGINE                           │
//! │                                                                  │
//! │  raw frame                                                       │
//! │     │                                                            │
//! │     ▼                                                            │
//! │  ┌──────────┐   ┌──────────────┐   ┌─────────┐   ┌────────────┐  │
//! │  │  Parser  │──►│ Auth (opt.)  │──►│ Session │──►│ Dependency │  │
//! │  │ (cursor) │   │ MAC -> IPv4  │   │  touch  │   │  (A -> B)  │  │
//! │  └────┬─────┘   └──────┬───────┘   └─────────┘   └─────┬──────┘  │
//! │       │                │                               │         │
//! │       ▼                ▼                               ▼         │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │      Statistics: total / allowed / dropped / invalid        │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//!              ▲
//!              │ install / remove / read_counters
//!        ┌─────┴──────┐
//!        │  Control   │
//!        │   plane    │
//!        └────────────┘
//! ```
//!
//! # Guarantees
//!
//! 1. **Bounds-safe**: every header read goes through [`cursor::Cursor`]
//! 2. **Non-blocking reads**: policy tables are copy-on-write snapshots
//! 3. **Bounded sessions**: LRU eviction absorbs capacity pressure
//! 4. **Lossless counters**: cache-padded atomics

#![warn(missing_docs)]

pub mod control;
pub mod cursor;
pub mod engine;
pub mod frame;
pub mod parser;
pub mod session;
pub mod stats;

pub use control::ControlPlane;
pub use engine::{Decision, DecisionEngine, EngineConfig, FailMode, Reason};
pub use frame::FrameBuilder;
pub use parser::{parse, ParseError, ParseOutcome, ParsedHeaders, Ports};
pub use session::{SessionKey, SessionStats, SessionTracker, Touch};
pub use stats::{Counter, CounterSnapshot, Statistics};

/// Default session tracker capacity
pub const DEFAULT_SESSION_CAPACITY: usize = 1024;
