//! Plain-text and JSON renderers for command output on stdout.

use crate::models::plan::{ExecutionReport, Outcome};
use crate::models::rule::RuleDefinition;
use crate::models::torrent::Snapshot;
use crate::utils::size::format_bytes;
use crate::utils::time::format_human;
use std::fmt::Write;

pub fn render_torrent_table(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<40} {:<11} {:<24} {:<12} {:<20} {:<25} {:>12} {:<40} NAME",
        "ID", "STATE", "PROGRESS", "LABEL", "TRACKER", "ADDED", "SEEDING", "PATH"
    );
    for torrent in snapshot {
        let progress = format!(
            "{} / {} {:.0}%",
            format_bytes(torrent.total_done),
            format_bytes(torrent.total_wanted),
            torrent.progress
        );
        let _ = writeln!(
            out,
            "{:<40} {:<11} {:<24} {:<12} {:<20} {:<25} {:>12} {:<40} {}",
            torrent.id,
            torrent.state.as_str(),
            progress,
            torrent.label,
            torrent.tracker_alias,
            torrent.time_added.format("%Y-%m-%dT%H:%M:%S%:z"),
            format_human(torrent.seeding_time),
            torrent.download_location.display(),
            torrent.name
        );
    }
    out
}

pub fn render_rules(rules: &[RuleDefinition]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(rules)
}

/// One line per action plus a summary line.
pub fn render_report(report: &ExecutionReport, snapshot: &Snapshot) -> String {
    let mut out = String::new();
    for action in &report.actions {
        let status = match &action.outcome {
            Outcome::Applied => "applied".to_string(),
            Outcome::Skipped => "dry-run".to_string(),
            Outcome::Failed(reason) => format!("failed ({reason})"),
        };
        let torrent = snapshot
            .get(&action.torrent_id)
            .map(ToString::to_string)
            .unwrap_or_else(|| action.torrent_id.clone());
        let _ = writeln!(out, "{:<8} {:<10} {}", action.kind, status, torrent);
    }

    let _ = writeln!(
        out,
        "{} action(s): {} applied, {} skipped, {} failed{}",
        report.actions.len(),
        report.applied(),
        report.skipped(),
        report.failed(),
        if report.dry_run { " (dry run)" } else { "" }
    );
    out
}
