//! The poll-schedule-apply loop (§4.3, §10): list cluster state, call the
//! pure engine, apply the plan, log the outcome, repeat on an interval.

use log::{debug, warn};
use scheduler_core::{Plan, Snapshot, schedule};
use tokio::time::{Duration, interval};

use crate::client::{ClusterClient, DriverError};

/// Summary of one tick's outcome, suitable for a single log line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub binds_applied: usize,
    pub binds_skipped: usize,
    pub evicts_applied: usize,
    pub evicts_skipped: usize,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        *self == TickReport::default()
    }
}

/// Lists nodes/pods, computes a [`Plan`], and applies it (evicts before
/// binds). Per-action failures are logged and skipped rather than aborting
/// the whole tick (§7); only a failure to *list* cluster state is
/// propagated, since without a snapshot there is nothing to apply.
pub async fn tick(
    client: &impl ClusterClient,
    scheduler_name: &str,
) -> Result<TickReport, DriverError> {
    let nodes = client.list_nodes().await?;
    let pods = client.list_pods().await?;
    let snapshot = Snapshot {
        scheduler_name: scheduler_name.to_string(),
        nodes,
        pods,
    };

    let plan: Plan = schedule(&snapshot);
    debug!(
        "tick: {} evict(s), {} bind(s) planned",
        plan.evicts().count(),
        plan.binds().count()
    );

    let mut report = TickReport::default();

    for pod in plan.evicts() {
        match client.create_eviction(pod).await {
            Ok(()) => report.evicts_applied += 1,
            Err(DriverError::Transient(msg)) => {
                warn!("eviction of {pod} deferred to next tick: {msg}");
                report.evicts_skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    for (pod, node) in plan.binds() {
        match client.create_binding(pod, node).await {
            Ok(()) => report.binds_applied += 1,
            Err(DriverError::Transient(msg)) => {
                warn!("bind of {pod} onto {node} deferred to next tick: {msg}");
                report.binds_skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(report)
}

/// Runs [`tick`] on a fixed interval until the process is cancelled. A
/// transient failure to list cluster state is logged and retried next
/// tick; anything else propagates and ends the loop.
pub async fn run(
    client: impl ClusterClient,
    scheduler_name: String,
    period: Duration,
) -> Result<(), DriverError> {
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        match tick(&client, &scheduler_name).await {
            Ok(report) if report.is_empty() => debug!("tick: nothing to do"),
            Ok(report) => debug!("tick: {report:?}"),
            Err(DriverError::Transient(msg)) => warn!("tick failed, will retry: {msg}"),
            Err(err) => return Err(err),
        }
    }
}
