//! Runs the exclude_processes step once against a cluster snapshot.
//!
//! The admin client, lock service, and event sink are in-memory, so nothing
//! outside this process is touched. Output is a JSON report of the decision,
//! the addresses that would have been excluded, and the events recorded.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use convergence::admin::MockAdminProvider;
use convergence::exclusion::{can_exclude_new_processes, QuorumDecision};
use convergence::requeue::RequeueSummary;
use convergence::{
    ClusterEvent, ClusterSnapshot, ClusterState, ExcludeProcesses, LocalLockClient,
    MemoryRecorder, OperatorConfig, ProcessAddress, ReconcileContext, ReconcileStep,
    TracingRecorder,
};

#[derive(Debug, Parser)]
#[command(name = "exclusion-dryrun", about = "Dry-run the process exclusion step")]
struct Args {
    /// Cluster snapshot (JSON)
    #[arg(long)]
    cluster: PathBuf,

    /// Operator config (TOML). Defaults plus environment overrides when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Addresses already excluded in the database
    #[arg(long, value_delimiter = ',')]
    exclusions: Vec<ProcessAddress>,

    /// Pretend another operator instance holds the cluster lock
    #[arg(long)]
    lock_held_by: Option<String>,
}

#[derive(Debug, Serialize)]
struct Report {
    cluster: String,
    decision: Decision,
    gates: Vec<QuorumDecision>,
    excluded: Vec<Vec<ProcessAddress>>,
    events: Vec<ClusterEvent>,
}

#[derive(Debug, Serialize)]
struct Decision {
    /// `None` when the step had nothing to do.
    requeue: Option<RequeueSummary>,
    after_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => OperatorConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => OperatorConfig::from_env().context("Invalid environment configuration")?,
    };

    let raw = std::fs::read_to_string(&args.cluster)
        .with_context(|| format!("Failed to read {}", args.cluster.display()))?;
    let cluster = ClusterSnapshot::from_json_str(&raw).context("Invalid cluster snapshot")?;

    info!(
        cluster = %cluster.cluster_ref(),
        process_groups = cluster.process_groups().len(),
        threshold = config.gate.missing_process_threshold,
        "Dry run starting"
    );

    let admin = MockAdminProvider::new().with_exclusions(args.exclusions.iter().cloned());
    let locks = LocalLockClient::new(&config.lock);
    if let Some(owner) = &args.lock_held_by {
        locks.seed_lease(cluster.cluster_ref(), owner, "held for dry run");
    }
    let events = MemoryRecorder::new();

    let ctx = ReconcileContext::new(
        Arc::new(admin.clone()),
        Arc::new(locks),
        Arc::new((TracingRecorder, events.clone())),
        config.clone(),
    );

    let result = ExcludeProcesses.reconcile(&ctx, &cluster).await;

    let decision = Decision {
        requeue: result.as_ref().map(|r| r.summary()),
        after_secs: result
            .as_ref()
            .and_then(|r| r.delay(&config.requeue))
            .map(|d| d.as_secs()),
    };

    // Gate view for every class with removals, regardless of the outcome.
    let mut classes: Vec<_> = cluster
        .process_groups()
        .iter()
        .filter(|g| g.is_marked_for_removal())
        .map(|g| g.process_class)
        .collect();
    classes.sort();
    classes.dedup();
    let gates = classes
        .into_iter()
        .map(|class| can_exclude_new_processes(&cluster, class, &config.gate))
        .collect();

    let report = Report {
        cluster: cluster.cluster_ref().to_string(),
        decision,
        gates,
        excluded: admin.exclude_batches(),
        events: events.events(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(requeue) = result.filter(|r| r.is_error()) {
        anyhow::bail!("exclusion failed: {}", requeue.message());
    }
    Ok(())
}
