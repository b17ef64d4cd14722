//! Convergence engine for a replicated database operator.
//!
//! This library provides the safe membership-change path of the operator:
//! deciding which database processes may be excluded from the cluster,
//! gating that on per-class quorum, coordinating under the cluster lock, and
//! turning outcomes into requeue decisions for the scheduler.
//!
//! # Modules
//!
//! - [`cluster`]: read-only cluster status (process groups, addresses, desired counts)
//! - [`exclusion`]: candidate builder, quorum gate, and the `exclude_processes` step
//! - [`pipeline`]: the step contract and an ordered step runner
//! - [`requeue`]: the uniform step result
//! - [`admin`], [`lock`], [`events`]: ports to the database, lock service, and event sink
//! - [`config`]: TOML and environment configuration
//!
//! # Usage
//!
//! ```rust,ignore
//! use convergence::{ExcludeProcesses, Pipeline, ReconcileContext};
//!
//! let pipeline = Pipeline::new().with_step(ExcludeProcesses);
//! let outcome = pipeline.run(&ctx, &cluster).await;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod admin;
pub mod cluster;
pub mod config;
pub mod error;
pub mod events;
pub mod exclusion;
pub mod lock;
pub mod pipeline;
pub mod requeue;

// Re-export key cluster types
pub use cluster::{
    ClusterError, ClusterRef, ClusterSnapshot, ClusterState, ConditionType, ProcessAddress,
    ProcessClass, ProcessCounts, ProcessGroup, ProcessGroupCondition,
};

// Re-export port types
pub use admin::{AdminClient, AdminClientProvider, AdminError, AdminResult, AdminSession};
pub use events::{ClusterEvent, EventRecorder, EventType, MemoryRecorder, TracingRecorder};
pub use lock::{LocalLockClient, LockClient, LockError};

// Re-export reconciliation types
pub use config::{ConfigError, GateConfig, LockConfig, OperatorConfig, RequeueConfig};
pub use error::ReconcileError;
pub use exclusion::{ExcludeProcesses, ExclusionCandidates, QuorumDecision};
pub use pipeline::{PassOutcome, Pipeline, ReconcileContext, ReconcileStep};
pub use requeue::Requeue;
