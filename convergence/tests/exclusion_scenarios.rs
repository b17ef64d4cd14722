//! Integration tests for the exclude_processes step
//!
//! Runs the step end-to-end against the in-memory admin client, the local
//! lock service, and a memory event recorder.

use std::sync::Arc;

use convergence::admin::MockAdminProvider;
use convergence::events::REASON_EXCLUDING_PROCESSES;
use convergence::{
    AdminError, ClusterRef, ClusterSnapshot, ConditionType, ExcludeProcesses, LocalLockClient,
    LockError, MemoryRecorder, OperatorConfig, ProcessAddress, ProcessClass, ProcessCounts,
    ProcessGroup, ReconcileContext, ReconcileError, ReconcileStep, Requeue,
};

fn addr(s: &str) -> ProcessAddress {
    s.parse().expect("valid address")
}

/// Four storage groups, `instance-4` marked for removal, desired storage = 4.
fn storage_cluster() -> ClusterSnapshot {
    let mut snapshot = ClusterSnapshot::new(ClusterRef::new("test", "sample"))
        .with_desired_counts(ProcessCounts::new().with(ProcessClass::Storage, 4));
    for i in 1..=4 {
        snapshot = snapshot.with_process_group(
            ProcessGroup::new(format!("instance-{}", i), ProcessClass::Storage)
                .with_address(addr(&format!("1.2.3.{}", i))),
        );
    }
    snapshot
        .process_group_mut("instance-4")
        .expect("instance-4 exists")
        .mark_for_removal();
    snapshot
}

struct Harness {
    admin: MockAdminProvider,
    locks: LocalLockClient,
    events: MemoryRecorder,
    ctx: ReconcileContext,
}

impl Harness {
    fn new(admin: MockAdminProvider) -> Self {
        let config = OperatorConfig::default();
        let locks = LocalLockClient::new(&config.lock);
        let events = MemoryRecorder::new();
        let ctx = ReconcileContext::new(
            Arc::new(admin.clone()),
            Arc::new(locks.clone()),
            Arc::new(events.clone()),
            config,
        );
        Self {
            admin,
            locks,
            events,
            ctx,
        }
    }

    async fn run(&self, cluster: &ClusterSnapshot) -> Option<Requeue> {
        ExcludeProcesses.reconcile(&self.ctx, cluster).await
    }
}

/// Test: nothing marked for removal means no admin mutation and no action
#[tokio::test]
async fn test_no_removals_is_no_action() {
    let mut cluster = storage_cluster();
    cluster.process_group_mut("instance-4").unwrap().removal_timestamp = None;
    let harness = Harness::new(MockAdminProvider::new());

    assert_eq!(harness.run(&cluster).await, None);
    assert_eq!(harness.admin.get_exclusions_calls(), 0);
    assert_eq!(harness.admin.exclude_calls(), 0);
    assert!(harness.events.is_empty());
    assert!(harness.locks.current_lease(&cluster.cluster).is_none());
    assert_eq!(harness.admin.open_sessions(), 0);
}

/// Test: a removal-marked group whose addresses are all excluded yields no work
#[tokio::test]
async fn test_already_excluded_addresses_are_skipped() {
    let cluster = storage_cluster();
    let harness = Harness::new(MockAdminProvider::new().with_exclusions([addr("1.2.3.4")]));

    assert_eq!(harness.run(&cluster).await, None);
    assert_eq!(harness.admin.get_exclusions_calls(), 1);
    assert_eq!(harness.admin.exclude_calls(), 0);
    assert!(harness.locks.current_lease(&cluster.cluster).is_none());
}

/// Test: healthy cluster excludes the single removal candidate
#[tokio::test]
async fn test_healthy_cluster_excludes_candidate() {
    let cluster = storage_cluster();
    let harness = Harness::new(MockAdminProvider::new());

    let result = harness.run(&cluster).await;

    assert_eq!(result, None);
    assert_eq!(harness.admin.exclude_batches(), vec![vec![addr("1.2.3.4")]]);
    let lease = harness
        .locks
        .current_lease(&cluster.cluster)
        .expect("lock taken");
    assert_eq!(lease.reason, "excluding processes: [1.2.3.4]");

    let events = harness.events.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, REASON_EXCLUDING_PROCESSES);
    assert_eq!(events[0].message, "Excluding [1.2.3.4]");
    assert_eq!(harness.admin.open_sessions(), 0);
    assert_eq!(harness.admin.closed_sessions(), 1);
}

/// Test: two of three remaining storage groups missing blocks the exclusion
#[tokio::test]
async fn test_degraded_class_is_delayed() {
    let mut cluster = storage_cluster();
    for id in ["instance-1", "instance-2"] {
        cluster
            .process_group_mut(id)
            .unwrap()
            .add_condition(ConditionType::MissingProcesses);
    }
    let harness = Harness::new(MockAdminProvider::new());

    let result = harness.run(&cluster).await;

    assert_eq!(
        result,
        Some(Requeue::delayed(
            "Waiting for missing processes: [instance-1 instance-2]. Addresses to exclude: [1.2.3.4]"
        ))
    );
    assert_eq!(harness.admin.exclude_calls(), 0);
    assert!(harness.locks.current_lease(&cluster.cluster).is_none());
    assert!(harness.events.is_empty());
}

/// Test: one missing of three remaining is still within `desired - 1`
#[tokio::test]
async fn test_single_missing_process_is_tolerated() {
    let mut cluster = storage_cluster();
    cluster
        .process_group_mut("instance-1")
        .unwrap()
        .add_condition(ConditionType::MissingPod);
    // valid = 2, desired = 4: 2 >= 3 fails, 2 >= ceil(3.2) fails.
    let harness = Harness::new(MockAdminProvider::new());
    assert!(harness.run(&cluster).await.unwrap().is_delayed());

    // With desired = 3 the same health passes: 2 >= 3 - 1.
    cluster.desired_process_counts = Some(ProcessCounts::new().with(ProcessClass::Storage, 3));
    let harness = Harness::new(MockAdminProvider::new());
    assert_eq!(harness.run(&cluster).await, None);
    assert_eq!(harness.admin.exclude_calls(), 1);
}

/// Test: a single-process class can always move its only member
#[tokio::test]
async fn test_single_process_class_can_be_replaced() {
    let cluster = ClusterSnapshot::new(ClusterRef::new("test", "tiny"))
        .with_desired_counts(ProcessCounts::new().with(ProcessClass::Log, 1))
        .with_process_group(
            ProcessGroup::new("log-1", ProcessClass::Log)
                .with_address(addr("10.0.0.1:4500:tls"))
                .marked_for_removal(),
        );
    let harness = Harness::new(MockAdminProvider::new());

    assert_eq!(harness.run(&cluster).await, None);
    assert_eq!(
        harness.admin.exclude_batches(),
        vec![vec![addr("10.0.0.1:4500:tls")]]
    );
}

/// Test: underivable desired counts deny the exclusion without failing the pass
#[tokio::test]
async fn test_unknown_desired_counts_delay_exclusion() {
    let mut cluster = storage_cluster();
    cluster.desired_process_counts = None;
    let harness = Harness::new(MockAdminProvider::new());

    let result = harness.run(&cluster).await;

    assert_eq!(
        result,
        Some(Requeue::delayed(
            "Waiting for missing processes: []. Addresses to exclude: [1.2.3.4]"
        ))
    );
    assert_eq!(harness.admin.exclude_calls(), 0);
    assert!(harness.locks.current_lease(&cluster.cluster).is_none());
    assert!(harness.events.is_empty());
}

/// Test: a machine-level exclusion already covers a process address on it
#[tokio::test]
async fn test_machine_exclusion_covers_removed_process() {
    let mut cluster = storage_cluster();
    cluster.process_group_mut("instance-4").unwrap().addresses = vec![addr("1.2.3.4:4500:tls")];
    let harness = Harness::new(MockAdminProvider::new().with_exclusions([addr("1.2.3.4")]));

    assert_eq!(harness.run(&cluster).await, None);
    assert_eq!(harness.admin.exclude_calls(), 0);
    assert!(harness.locks.current_lease(&cluster.cluster).is_none());
    assert!(harness.events.is_empty());
}

/// Test: exclusion timeout is a delayed requeue, never fatal
#[tokio::test]
async fn test_exclusion_timeout_is_delayed() {
    let cluster = storage_cluster();
    let admin = MockAdminProvider::new();
    admin.fail_exclude(AdminError::timeout("exclude_processes", "5s elapsed"));
    let harness = Harness::new(admin);

    let result = harness.run(&cluster).await.expect("requeue");
    assert!(result.is_delayed());
    assert_eq!(result.message(), "exclude_processes timed out: 5s elapsed");
    assert!(harness.events.is_empty());
    assert_eq!(harness.admin.open_sessions(), 0);
}

/// Test: any other exclusion error is surfaced unchanged
#[tokio::test]
async fn test_exclusion_error_is_fatal() {
    let cluster = storage_cluster();
    let admin = MockAdminProvider::new();
    let cause = AdminError::other("exclude_processes", "database unavailable");
    admin.fail_exclude(cause.clone());
    let harness = Harness::new(admin);

    let result = harness.run(&cluster).await;
    assert_eq!(result, Some(Requeue::Error(ReconcileError::Admin(cause))));
}

/// Test: lock held by another operator instance is fatal, admin untouched
#[tokio::test]
async fn test_lock_contention_is_fatal() {
    let cluster = storage_cluster();
    let harness = Harness::new(MockAdminProvider::new());
    harness
        .locks
        .instance("operator-b")
        .seed_lease(&cluster.cluster, "operator-b", "upgrading");

    let result = harness.run(&cluster).await;
    assert!(matches!(
        result,
        Some(Requeue::Error(ReconcileError::Lock(LockError::HeldByOther { ref owner, .. })))
            if owner == "operator-b"
    ));
    assert_eq!(harness.admin.exclude_calls(), 0);
    assert!(harness.events.is_empty());
}

/// Test: repeated invocations without external change agree
#[tokio::test]
async fn test_step_is_idempotent() {
    // Blocked by quorum.
    let mut degraded = storage_cluster();
    for id in ["instance-1", "instance-2"] {
        degraded
            .process_group_mut(id)
            .unwrap()
            .add_condition(ConditionType::MissingProcesses);
    }
    let harness = Harness::new(MockAdminProvider::new());
    let first = harness.run(&degraded).await;
    let second = harness.run(&degraded).await;
    assert!(first.is_some());
    assert_eq!(first, second);

    // Timing out.
    let admin = MockAdminProvider::new();
    admin.fail_exclude(AdminError::timeout("exclude_processes", "slow"));
    let harness = Harness::new(admin);
    let cluster = storage_cluster();
    let first = harness.run(&cluster).await;
    let second = harness.run(&cluster).await;
    assert_eq!(first, second);
    assert_eq!(harness.admin.exclude_calls(), 2);

    // Nothing to do.
    let harness = Harness::new(MockAdminProvider::new().with_exclusions([addr("1.2.3.4")]));
    assert_eq!(harness.run(&cluster).await, None);
    assert_eq!(harness.run(&cluster).await, None);
}

/// Test: after a successful exclusion the next pass finds nothing left to do
#[tokio::test]
async fn test_second_pass_after_success_is_noop() {
    let cluster = storage_cluster();
    let harness = Harness::new(MockAdminProvider::new());

    assert_eq!(harness.run(&cluster).await, None);
    assert_eq!(harness.run(&cluster).await, None);
    assert_eq!(harness.admin.exclude_calls(), 1);
    assert_eq!(harness.events.len(), 1);
}

/// Test: a confirmed-excluded group is never resubmitted
#[tokio::test]
async fn test_confirmed_exclusion_not_resubmitted() {
    let mut cluster = storage_cluster();
    cluster.process_group_mut("instance-4").unwrap().set_excluded();
    let harness = Harness::new(MockAdminProvider::new());

    assert_eq!(harness.run(&cluster).await, None);
    assert_eq!(harness.admin.exclude_calls(), 0);
}
