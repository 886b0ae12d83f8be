use crate::api::daemon::DaemonMutator;
use crate::core::error::{ActionExecutionFailed, ClientError};
use crate::models::plan::{ActionKind, ActionPlan, ExecutionReport, Outcome};
use crate::models::torrent::Snapshot;
use tracing::{error, info};

/// Apply a plan through the daemon: relabels, then moves, then removals in
/// plan order.
///
/// A failing action is logged and recorded; the remaining actions still run.
/// With `dry_run` nothing is sent to the daemon.
pub async fn execute_plan(
    mutator: &dyn DaemonMutator,
    plan: &ActionPlan,
    snapshot: &Snapshot,
    dry_run: bool,
) -> ExecutionReport {
    let mut report = ExecutionReport {
        dry_run,
        actions: Vec::with_capacity(plan.len()),
    };

    for (torrent_id, label) in &plan.to_relabel {
        let name = torrent_name(snapshot, torrent_id);
        info!(
            torrent_id = %torrent_id,
            name = name,
            label = %label,
            dry_run = dry_run,
            "Relabelling torrent"
        );
        let outcome = apply(dry_run, || mutator.relabel_torrent(torrent_id, label)).await;
        finish(&mut report, ActionKind::Relabel, torrent_id, outcome);
    }

    for (torrent_id, path) in &plan.to_move {
        let name = torrent_name(snapshot, torrent_id);
        let target = path.to_string_lossy();
        info!(
            torrent_id = %torrent_id,
            name = name,
            path = %target,
            dry_run = dry_run,
            "Moving torrent"
        );
        let outcome = apply(dry_run, || mutator.move_torrent(torrent_id, &target)).await;
        finish(&mut report, ActionKind::Move, torrent_id, outcome);
    }

    for torrent_id in &plan.to_remove {
        let name = torrent_name(snapshot, torrent_id);
        info!(torrent_id = %torrent_id, name = name, dry_run = dry_run, "Removing torrent");
        let outcome = apply(dry_run, || mutator.remove_torrent(torrent_id)).await;
        finish(&mut report, ActionKind::Remove, torrent_id, outcome);
    }

    info!(
        applied = report.applied(),
        skipped = report.skipped(),
        failed = report.failed(),
        dry_run = dry_run,
        "Executed plan"
    );
    report
}

fn torrent_name<'a>(snapshot: &'a Snapshot, torrent_id: &str) -> &'a str {
    snapshot
        .get(torrent_id)
        .map(|torrent| torrent.name.as_str())
        .unwrap_or("")
}

async fn apply<F, Fut>(dry_run: bool, action: F) -> Result<Outcome, ClientError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(), ClientError>>,
{
    if dry_run {
        return Ok(Outcome::Skipped);
    }
    action().await.map(|()| Outcome::Applied)
}

fn finish(
    report: &mut ExecutionReport,
    kind: ActionKind,
    torrent_id: &str,
    outcome: Result<Outcome, ClientError>,
) {
    let outcome = outcome.unwrap_or_else(|err| {
        let failure = ActionExecutionFailed {
            action: kind.as_str(),
            torrent_id: torrent_id.to_string(),
            reason: err.to_string(),
        };
        error!(torrent_id = %torrent_id, action = kind.as_str(), error = %err, "{failure}");
        Outcome::Failed(failure.reason)
    });
    report.record(kind, torrent_id, outcome);
}
