//! Process groups and their health conditions.
//!
//! A process group is the unit of lifecycle management for one database
//! process instance. Groups are rebuilt by the state-observation step on
//! every pass; the exclusion step only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::address::ProcessAddress;

/// Role of a database process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessClass {
    Storage,
    Log,
    Transaction,
    Stateless,
    ClusterController,
    Coordinator,
    CommitProxy,
    GrvProxy,
    Resolution,
    Test,
}

impl ProcessClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Log => "log",
            Self::Transaction => "transaction",
            Self::Stateless => "stateless",
            Self::ClusterController => "cluster_controller",
            Self::Coordinator => "coordinator",
            Self::CommitProxy => "commit_proxy",
            Self::GrvProxy => "grv_proxy",
            Self::Resolution => "resolution",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for ProcessClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named health condition observed on a process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    /// The database does not report a process for this group.
    MissingProcesses,
    /// The pod backing this group does not exist.
    MissingPod,
    /// The pod exists but is not running.
    PodFailing,
    IncorrectCommandLine,
    IncorrectPodSpec,
    IncorrectConfigMap,
    MissingPvc,
    SidecarUnreachable,
}

impl ConditionType {
    /// Conditions under which the group does not count towards the healthy
    /// members of its class.
    pub fn marks_missing(self) -> bool {
        matches!(self, Self::MissingProcesses | Self::MissingPod)
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A condition together with the time it was first observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessGroupCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub timestamp: DateTime<Utc>,
}

impl ProcessGroupCondition {
    pub fn new(condition_type: ConditionType) -> Self {
        Self {
            condition_type,
            timestamp: Utc::now(),
        }
    }

    pub fn observed_at(condition_type: ConditionType, timestamp: DateTime<Utc>) -> Self {
        Self {
            condition_type,
            timestamp,
        }
    }
}

/// Status of one process group as seen by the current reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessGroup {
    pub process_group_id: String,
    pub process_class: ProcessClass,
    #[serde(default)]
    pub addresses: Vec<ProcessAddress>,
    /// Set by the desired-state step when the group is slated for removal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removal_timestamp: Option<DateTime<Utc>>,
    /// Set once the admin interface confirmed the group's addresses are excluded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conditions: Vec<ProcessGroupCondition>,
}

impl ProcessGroup {
    pub fn new(process_group_id: impl Into<String>, process_class: ProcessClass) -> Self {
        Self {
            process_group_id: process_group_id.into(),
            process_class,
            addresses: Vec::new(),
            removal_timestamp: None,
            exclusion_timestamp: None,
            conditions: Vec::new(),
        }
    }

    pub fn with_address(mut self, address: ProcessAddress) -> Self {
        self.addresses.push(address);
        self
    }

    pub fn with_condition(mut self, condition_type: ConditionType) -> Self {
        self.add_condition(condition_type);
        self
    }

    pub fn marked_for_removal(mut self) -> Self {
        self.mark_for_removal();
        self
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.removal_timestamp.is_some()
    }

    pub fn is_excluded(&self) -> bool {
        self.exclusion_timestamp.is_some()
    }

    /// Marks the group for removal. An existing removal timestamp is kept.
    pub fn mark_for_removal(&mut self) {
        if self.removal_timestamp.is_none() {
            self.removal_timestamp = Some(Utc::now());
        }
    }

    /// Records that the admin interface confirmed the exclusion.
    pub fn set_excluded(&mut self) {
        if self.exclusion_timestamp.is_none() {
            self.exclusion_timestamp = Some(Utc::now());
        }
    }

    /// Adds a condition unless it is already present, preserving the
    /// first-observed timestamp.
    pub fn add_condition(&mut self, condition_type: ConditionType) {
        if self.get_condition_time(condition_type).is_none() {
            self.conditions.push(ProcessGroupCondition::new(condition_type));
        }
    }

    pub fn remove_condition(&mut self, condition_type: ConditionType) {
        self.conditions.retain(|c| c.condition_type != condition_type);
    }

    /// First-observed time of `condition_type`, if present.
    pub fn get_condition_time(&self, condition_type: ConditionType) -> Option<DateTime<Utc>> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
            .map(|c| c.timestamp)
    }

    /// Whether the group has a condition that keeps it out of the healthy
    /// count for quorum purposes.
    pub fn is_missing(&self) -> bool {
        self.conditions.iter().any(|c| c.condition_type.marks_missing())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_removal_and_exclusion_flags() {
        let mut group = ProcessGroup::new("storage-1", ProcessClass::Storage);
        assert!(!group.is_marked_for_removal());
        assert!(!group.is_excluded());

        group.mark_for_removal();
        let first = group.removal_timestamp;
        group.mark_for_removal();
        assert_eq!(group.removal_timestamp, first);
        assert!(group.is_marked_for_removal());

        group.set_excluded();
        assert!(group.is_excluded());
    }

    #[test]
    fn test_add_condition_keeps_first_timestamp() {
        let earlier = Utc::now() - Duration::minutes(10);
        let mut group = ProcessGroup::new("log-1", ProcessClass::Log);
        group.conditions.push(ProcessGroupCondition::observed_at(
            ConditionType::MissingProcesses,
            earlier,
        ));

        group.add_condition(ConditionType::MissingProcesses);
        assert_eq!(group.conditions.len(), 1);
        assert_eq!(
            group.get_condition_time(ConditionType::MissingProcesses),
            Some(earlier)
        );
    }

    #[test]
    fn test_is_missing_only_for_missing_conditions() {
        let group = ProcessGroup::new("storage-2", ProcessClass::Storage)
            .with_condition(ConditionType::IncorrectCommandLine);
        assert!(!group.is_missing());

        let group = group.with_condition(ConditionType::MissingPod);
        assert!(group.is_missing());

        let mut group = group;
        group.remove_condition(ConditionType::MissingPod);
        assert!(!group.is_missing());
        assert!(group
            .get_condition_time(ConditionType::IncorrectCommandLine)
            .is_some());
    }

    #[test]
    fn test_process_class_serde() {
        let json = serde_json::to_string(&ProcessClass::ClusterController).unwrap();
        assert_eq!(json, "\"cluster_controller\"");
        let parsed: ProcessClass = serde_json::from_str("\"storage\"").unwrap();
        assert_eq!(parsed, ProcessClass::Storage);
        assert_eq!(ProcessClass::GrvProxy.to_string(), "grv_proxy");
    }

    #[test]
    fn test_process_group_deserialize_defaults() {
        let json = r#"{
            "process_group_id": "storage-3",
            "process_class": "storage",
            "addresses": ["1.2.3.4:4500"],
            "conditions": [{"type": "MissingProcesses", "timestamp": "2024-01-01T00:00:00Z"}]
        }"#;
        let group: ProcessGroup = serde_json::from_str(json).unwrap();
        assert_eq!(group.addresses.len(), 1);
        assert!(!group.is_marked_for_removal());
        assert!(group.is_missing());
    }
}
