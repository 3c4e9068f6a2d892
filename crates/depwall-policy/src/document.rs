//! JSON policy document
//!
//! The control plane's description of the allow-list: MAC -> IP bindings
//! and directed dependency edges. Applying a document swaps each table's
//! contents in one step.

use crate::{AuthTable, DependencyKey, DependencyTable, TableLimits};
use depwall_common::{DepwallError, DepwallResult, MacAddr};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::info;

/// One source binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthBinding {
    /// Link-layer source address
    pub mac: MacAddr,
    /// The only IPv4 address this MAC may claim
    pub ip: Ipv4Addr,
}

/// One directed dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRule {
    /// Source address
    pub source: Ipv4Addr,
    /// Destination address
    pub destination: Ipv4Addr,
    /// Authorization marker
    #[serde(default = "default_authorized")]
    pub authorized: bool,
}

fn default_authorized() -> bool {
    true
}

/// Complete policy as loaded from disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Source bindings
    #[serde(default)]
    pub auth_bindings: Vec<AuthBinding>,
    /// Dependency edges
    #[serde(default)]
    pub dependencies: Vec<DependencyRule>,
}

/// Result of applying a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    /// Bindings now installed
    pub auth_bindings: usize,
    /// Edges now installed
    pub dependencies: usize,
}

/// Validated table contents ready to swap in
#[derive(Debug, Clone, Default)]
pub struct CompiledPolicy {
    /// MAC -> IP bindings
    pub auth: HashMap<MacAddr, Ipv4Addr>,
    /// Directed edges
    pub dependencies: HashMap<DependencyKey, bool>,
}

impl PolicyDocument {
    /// Parse from JSON text
    pub fn from_json(text: &str) -> DepwallResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> DepwallResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> DepwallResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Collapse duplicates and check the table invariants.
    ///
    /// Repeating an identical entry is allowed; binding one MAC to two
    /// addresses, or listing one edge as both authorized and not, is not.
    pub fn compile(&self) -> DepwallResult<CompiledPolicy> {
        let mut compiled = CompiledPolicy::default();

        for binding in &self.auth_bindings {
            match compiled.auth.entry(binding.mac) {
                Entry::Vacant(slot) => {
                    slot.insert(binding.ip);
                }
                Entry::Occupied(slot) if *slot.get() == binding.ip => {}
                Entry::Occupied(slot) => {
                    return Err(DepwallError::InvalidPolicy(format!(
                        "{} bound to both {} and {}",
                        binding.mac,
                        slot.get(),
                        binding.ip
                    )));
                }
            }
        }

        for rule in &self.dependencies {
            let key = DependencyKey::new(rule.source, rule.destination);
            match compiled.dependencies.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(rule.authorized);
                }
                Entry::Occupied(slot) if *slot.get() == rule.authorized => {}
                Entry::Occupied(_) => {
                    return Err(DepwallError::InvalidPolicy(format!(
                        "dependency {} listed as both authorized and unauthorized",
                        key
                    )));
                }
            }
        }

        Ok(compiled)
    }

    /// Compile and check the result fits within `limits`
    pub fn validate(&self, limits: &TableLimits) -> DepwallResult<CompiledPolicy> {
        let compiled = self.compile()?;

        if compiled.auth.len() > limits.auth_capacity {
            return Err(DepwallError::TableFull {
                table: "authentication",
                capacity: limits.auth_capacity,
            });
        }
        if compiled.dependencies.len() > limits.dependency_capacity {
            return Err(DepwallError::TableFull {
                table: "dependency",
                capacity: limits.dependency_capacity,
            });
        }
        Ok(compiled)
    }

    /// Validate against both tables' capacities, then replace their contents.
    ///
    /// Capacities are checked before either table is touched, so a rejected
    /// document leaves both tables as they were.
    pub fn apply(&self, auth: &AuthTable, deps: &DependencyTable) -> DepwallResult<ApplySummary> {
        let compiled = self.validate(&TableLimits {
            auth_capacity: auth.capacity(),
            dependency_capacity: deps.capacity(),
        })?;

        let summary = ApplySummary {
            auth_bindings: compiled.auth.len(),
            dependencies: compiled.dependencies.len(),
        };

        auth.replace_all(compiled.auth)?;
        deps.replace_all(compiled.dependencies)?;

        info!(
            auth_bindings = summary.auth_bindings,
            dependencies = summary.dependencies,
            "policy applied"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "auth_bindings": [
            { "mac": "01:02:03:04:05:06", "ip": "192.168.0.1" }
        ],
        "dependencies": [
            { "source": "10.0.0.1", "destination": "10.0.0.2", "authorized": true },
            { "source": "10.0.0.2", "destination": "10.0.0.1" },
            { "source": "10.0.0.3", "destination": "10.0.0.1", "authorized": false }
        ]
    }"#;

    #[test]
    fn test_parse_and_apply() {
        let doc = PolicyDocument::from_json(SAMPLE).unwrap();
        assert_eq!(doc.auth_bindings.len(), 1);
        assert_eq!(doc.dependencies.len(), 3);
        assert!(doc.dependencies[1].authorized);

        let auth = AuthTable::default();
        let deps = DependencyTable::default();
        let summary = doc.apply(&auth, &deps).unwrap();
        assert_eq!(summary, ApplySummary { auth_bindings: 1, dependencies: 3 });

        let mac: MacAddr = "01:02:03:04:05:06".parse().unwrap();
        assert!(auth.verify(&mac, Ipv4Addr::new(192, 168, 0, 1)));
        assert!(deps.is_authorized(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)));
        assert!(deps.is_authorized(Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1)));
        assert!(!deps.is_authorized(Ipv4Addr::new(10, 0, 0, 3), Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn test_apply_replaces_previous_contents() {
        let auth = AuthTable::default();
        let deps = DependencyTable::default();
        deps.add(Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(2, 2, 2, 2), true).unwrap();

        PolicyDocument::from_json(SAMPLE).unwrap().apply(&auth, &deps).unwrap();
        assert!(!deps.is_authorized(Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(2, 2, 2, 2)));
    }

    #[test]
    fn test_empty_document() {
        let doc = PolicyDocument::from_json("{}").unwrap();
        assert!(doc.auth_bindings.is_empty());
        assert!(doc.dependencies.is_empty());
    }

    #[test]
    fn test_conflicting_binding_rejected() {
        let doc = PolicyDocument::from_json(
            r#"{ "auth_bindings": [
                { "mac": "01:02:03:04:05:06", "ip": "10.0.0.1" },
                { "mac": "01:02:03:04:05:06", "ip": "10.0.0.2" }
            ] }"#,
        )
        .unwrap();
        assert!(matches!(doc.compile(), Err(DepwallError::InvalidPolicy(_))));
    }

    #[test]
    fn test_duplicate_identical_entries_collapse() {
        let doc = PolicyDocument::from_json(
            r#"{ "dependencies": [
                { "source": "10.0.0.1", "destination": "10.0.0.2" },
                { "source": "10.0.0.1", "destination": "10.0.0.2" }
            ] }"#,
        )
        .unwrap();
        assert_eq!(doc.compile().unwrap().dependencies.len(), 1);
    }

    #[test]
    fn test_conflicting_edge_rejected() {
        let doc = PolicyDocument::from_json(
            r#"{ "dependencies": [
                { "source": "10.0.0.1", "destination": "10.0.0.2", "authorized": true },
                { "source": "10.0.0.1", "destination": "10.0.0.2", "authorized": false }
            ] }"#,
        )
        .unwrap();
        assert!(doc.compile().is_err());
    }

    #[test]
    fn test_over_capacity_leaves_tables_untouched() {
        let auth = AuthTable::default();
        let deps = DependencyTable::new(2);
        deps.add(Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(2, 2, 2, 2), true).unwrap();

        let err = PolicyDocument::from_json(SAMPLE)
            .unwrap()
            .apply(&auth, &deps)
            .unwrap_err();
        assert!(matches!(err, DepwallError::TableFull { table: "dependency", .. }));
        assert!(auth.is_empty());
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn test_validate_against_limits() {
        let doc = PolicyDocument::from_json(SAMPLE).unwrap();
        let compiled = doc.validate(&TableLimits::default()).unwrap();
        assert_eq!(compiled.dependencies.len(), 3);

        let tight = TableLimits {
            auth_capacity: 0,
            dependency_capacity: 10,
        };
        assert!(matches!(
            doc.validate(&tight),
            Err(DepwallError::TableFull { table: "authentication", capacity: 0 })
        ));
    }

    #[test]
    fn test_bad_address_rejected() {
        let err = PolicyDocument::from_json(
            r#"{ "dependencies": [ { "source": "fe80::1", "destination": "10.0.0.2" } ] }"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let doc = PolicyDocument::load(file.path()).unwrap();
        assert_eq!(doc.dependencies.len(), 3);

        let round = PolicyDocument::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(round, doc);
    }
}
