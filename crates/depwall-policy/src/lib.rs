//! depwall policy tables
//!
//! The two read-mostly tables consulted on the packet fast path:
//!
//! ```text
//! ┌──────────────────────┐      ┌───────────────────────────────┐
//! │   Authentication     │      │          Dependency           │
//! │   MAC -> IPv4        │      │   (src IPv4, dst IPv4) -> bool│
//! │   (anti-spoofing)    │      │   (directed allow-list)       │
//! └──────────┬───────────┘      └──────────────┬────────────────┘
//!            │  lock-free snapshot load         │
//!            ▼                                  ▼
//!                     packet-processing contexts
//! ```
//!
//! Both are copy-on-write: the control plane publishes a new snapshot per
//! mutation and readers never block on a writer.

#![warn(missing_docs)]

pub mod auth;
pub mod dependency;
pub mod document;
mod table;

pub use auth::{AuthTable, DEFAULT_AUTH_CAPACITY};
pub use dependency::{DependencyKey, DependencyTable, DEFAULT_DEPENDENCY_CAPACITY};
pub use document::{ApplySummary, AuthBinding, CompiledPolicy, DependencyRule, PolicyDocument};

use serde::{Deserialize, Serialize};

/// Hard capacities for the policy tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableLimits {
    /// Authentication table entries
    pub auth_capacity: usize,
    /// Dependency table entries
    pub dependency_capacity: usize,
}

impl Default for TableLimits {
    fn default() -> Self {
        Self {
            auth_capacity: DEFAULT_AUTH_CAPACITY,
            dependency_capacity: DEFAULT_DEPENDENCY_CAPACITY,
        }
    }
}

impl TableLimits {
    /// Build empty tables with these capacities
    pub fn build(&self) -> (AuthTable, DependencyTable) {
        (
            AuthTable::new(self.auth_capacity),
            DependencyTable::new(self.dependency_capacity),
        )
    }
}
