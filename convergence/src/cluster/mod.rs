//! Cluster state as seen by one reconciliation pass.
//!
//! The status object is owned by the state-observation step; everything in
//! the exclusion path reads it through [`ClusterState`]. Desired process
//! counts are derived outside this crate and the derivation may fail.

pub mod address;
pub mod process_group;

pub use address::{format_addresses, AddressParseError, ProcessAddress};
pub use process_group::{ConditionType, ProcessClass, ProcessGroup, ProcessGroupCondition};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Errors from reading cluster state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("desired process counts unavailable for {cluster}")]
    DesiredCountsUnavailable { cluster: String },

    #[error("address {address} is bound to both {first} and {second}")]
    DuplicateAddress {
        address: String,
        first: String,
        second: String,
    },

    #[error("duplicate process group id {0}")]
    DuplicateProcessGroup(String),

    #[error("invalid cluster snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Namespaced identity of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterRef {
    pub namespace: String,
    pub name: String,
}

impl ClusterRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClusterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Desired number of processes per class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessCounts(BTreeMap<ProcessClass, u32>);

impl ProcessCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, class: ProcessClass, count: u32) -> Self {
        self.set(class, count);
        self
    }

    pub fn set(&mut self, class: ProcessClass, count: u32) {
        self.0.insert(class, count);
    }

    /// Desired count for `class`; classes without an entry want zero.
    pub fn count(&self, class: ProcessClass) -> u32 {
        self.0.get(&class).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProcessClass, u32)> + '_ {
        self.0.iter().map(|(class, count)| (*class, *count))
    }
}

/// Read-only view of the cluster status for the current pass.
pub trait ClusterState: Send + Sync {
    fn cluster_ref(&self) -> &ClusterRef;

    fn process_groups(&self) -> &[ProcessGroup];

    /// Desired process counts, derived externally. May fail.
    fn desired_process_counts(&self) -> Result<ProcessCounts, ClusterError>;
}

/// Serializable cluster status used by tests and the dry-run tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    #[serde(flatten)]
    pub cluster: ClusterRef,
    /// `None` when the desired-state step could not compute counts.
    #[serde(default)]
    pub desired_process_counts: Option<ProcessCounts>,
    #[serde(default)]
    pub process_groups: Vec<ProcessGroup>,
}

impl ClusterSnapshot {
    pub fn new(cluster: ClusterRef) -> Self {
        Self {
            cluster,
            desired_process_counts: None,
            process_groups: Vec::new(),
        }
    }

    pub fn with_desired_counts(mut self, counts: ProcessCounts) -> Self {
        self.desired_process_counts = Some(counts);
        self
    }

    pub fn with_process_group(mut self, group: ProcessGroup) -> Self {
        self.process_groups.push(group);
        self
    }

    /// Parses a JSON snapshot and checks its invariants.
    pub fn from_json_str(json: &str) -> Result<Self, ClusterError> {
        let snapshot: Self = serde_json::from_str(json)
            .map_err(|e| ClusterError::InvalidSnapshot(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn process_group(&self, id: &str) -> Option<&ProcessGroup> {
        self.process_groups
            .iter()
            .find(|g| g.process_group_id == id)
    }

    pub fn process_group_mut(&mut self, id: &str) -> Option<&mut ProcessGroup> {
        self.process_groups
            .iter_mut()
            .find(|g| g.process_group_id == id)
    }

    /// Checks that process group ids are unique and that every address
    /// belongs to exactly one group.
    pub fn validate(&self) -> Result<(), ClusterError> {
        let mut owners: HashMap<&ProcessAddress, &str> = HashMap::new();
        let mut seen_ids: HashSet<&str> = HashSet::new();

        for group in &self.process_groups {
            let id = group.process_group_id.as_str();
            if !seen_ids.insert(id) {
                return Err(ClusterError::DuplicateProcessGroup(id.to_string()));
            }
            for address in &group.addresses {
                if let Some(first) = owners.insert(address, id) {
                    // A group listing the same address twice is still one owner.
                    if first != id {
                        return Err(ClusterError::DuplicateAddress {
                            address: address.to_string(),
                            first: first.to_string(),
                            second: id.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl ClusterState for ClusterSnapshot {
    fn cluster_ref(&self) -> &ClusterRef {
        &self.cluster
    }

    fn process_groups(&self) -> &[ProcessGroup] {
        &self.process_groups
    }

    fn desired_process_counts(&self) -> Result<ProcessCounts, ClusterError> {
        self.desired_process_counts
            .clone()
            .ok_or_else(|| ClusterError::DesiredCountsUnavailable {
                cluster: self.cluster.to_string(),
            })
    }
}
