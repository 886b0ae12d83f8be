use crate::core::error::RuleError;
use crate::engine::retention::eligible_for_removal;
use crate::engine::seed_time::qualifies_for_removal;
use crate::models::plan::ActionPlan;
use crate::models::rule::RuleChain;
use crate::models::torrent::Snapshot;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Which kinds of action a pass may plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionFlags {
    pub remove: bool,
    pub relocate: bool,
    pub relabel: bool,
}

impl Default for ActionFlags {
    fn default() -> Self {
        Self {
            remove: true,
            relocate: true,
            relabel: true,
        }
    }
}

/// Everything the planner needs besides the snapshot and the rules.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Tracker alias to label
    pub label_remap: HashMap<String, String>,
    /// Tracker alias to download path
    pub path_map: HashMap<String, PathBuf>,
    pub flags: ActionFlags,
    /// Seed time for torrents whose tracker has no rules
    pub default_seed_time: Duration,
    pub seed_buffer: f64,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            label_remap: HashMap::new(),
            path_map: HashMap::new(),
            flags: ActionFlags::default(),
            default_seed_time: Duration::from_secs(90 * 60),
            seed_buffer: 1.1,
        }
    }
}

/// Compute the relabel / remove / move actions for one snapshot.
///
/// Pure: nothing here talks to the daemon. Per torrent, a relabel wins over
/// everything else in the same pass, and a removal wins over a move.
pub fn plan_actions(
    snapshot: &Snapshot,
    rules: &RuleChain,
    options: &PlanOptions,
) -> Result<ActionPlan, RuleError> {
    let removable = eligible_for_removal(snapshot, rules);
    let flags = options.flags;
    let mut plan = ActionPlan::default();

    for torrent in snapshot {
        let alias = torrent.tracker_alias.as_str();

        if flags.relabel {
            if let Some(label) = options.label_remap.get(alias) {
                if *label != torrent.label {
                    debug!(torrent_id = %torrent.id, label = %label, "Planned relabel");
                    plan.to_relabel.push((torrent.id.clone(), label.clone()));
                    continue;
                }
            }
        }

        if flags.remove
            && removable.contains(&torrent.id)
            && qualifies_for_removal(
                torrent,
                rules.seed_rules(alias),
                options.default_seed_time,
                options.seed_buffer,
            )?
        {
            debug!(torrent_id = %torrent.id, "Planned removal");
            plan.to_remove.push(torrent.id.clone());
            continue;
        }

        if flags.relocate {
            if let Some(path) = options.path_map.get(alias) {
                if *path != torrent.download_location {
                    debug!(torrent_id = %torrent.id, path = %path.display(), "Planned move");
                    plan.to_move.push((torrent.id.clone(), path.clone()));
                }
            }
        }
    }

    plan.to_remove.reverse();

    info!(
        torrents = snapshot.len(),
        relabel = plan.to_relabel.len(),
        relocate = plan.to_move.len(),
        remove = plan.to_remove.len(),
        "Planned actions"
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::compiler::compile_rules;
    use crate::models::rule::RuleDefinition;
    use crate::models::torrent::fixtures::torrent;
    use crate::models::torrent::Torrent;

    const DAY: u64 = 86_400;

    fn snapshot(torrents: Vec<Torrent>) -> Snapshot {
        torrents.into_iter().collect()
    }

    fn options() -> PlanOptions {
        PlanOptions {
            default_seed_time: Duration::from_secs(DAY),
            seed_buffer: 1.0,
            ..PlanOptions::default()
        }
    }

    #[test]
    fn test_removals_are_reversed() {
        let snap = snapshot(vec![
            torrent("a", "x", 2 * DAY, 1),
            torrent("b", "x", 2 * DAY, 1),
            torrent("c", "x", 0, 1),
            torrent("d", "y", 2 * DAY, 1),
        ]);
        let plan = plan_actions(&snap, &RuleChain::new(), &options()).unwrap();
        assert_eq!(plan.to_remove, vec!["d", "b", "a"]);
        assert!(plan.to_move.is_empty());
        assert!(plan.to_relabel.is_empty());
    }

    #[test]
    fn test_relabel_suppresses_remove_and_move() {
        let snap = snapshot(vec![torrent("a", "x", 10 * DAY, 1)]);
        let mut opts = options();
        opts.label_remap.insert("x".to_string(), "archive".to_string());
        opts.path_map.insert("x".to_string(), PathBuf::from("/data/x"));

        let plan = plan_actions(&snap, &RuleChain::new(), &opts).unwrap();
        assert_eq!(plan.relabel_for("a"), Some("archive"));
        assert!(!plan.removes("a"));
        assert!(plan.move_for("a").is_none());
    }

    #[test]
    fn test_matching_label_is_not_relabelled() {
        let snap = snapshot(vec![torrent("a", "x", 0, 1)]);
        let mut opts = options();
        opts.label_remap.insert("x".to_string(), "seeding".to_string());
        opts.path_map.insert("x".to_string(), PathBuf::from("/data/x"));

        let plan = plan_actions(&snap, &RuleChain::new(), &opts).unwrap();
        assert!(plan.to_relabel.is_empty());
        assert_eq!(plan.move_for("a"), Some(&PathBuf::from("/data/x")));
    }

    #[test]
    fn test_removal_suppresses_move() {
        let snap = snapshot(vec![torrent("a", "x", 2 * DAY, 1)]);
        let mut opts = options();
        opts.path_map.insert("x".to_string(), PathBuf::from("/data/x"));

        let plan = plan_actions(&snap, &RuleChain::new(), &opts).unwrap();
        assert_eq!(plan.to_remove, vec!["a"]);
        assert!(plan.to_move.is_empty());
    }

    #[test]
    fn test_move_skipped_when_already_in_place() {
        let snap = snapshot(vec![torrent("a", "x", 0, 1)]);
        let mut opts = options();
        opts.path_map.insert("x".to_string(), PathBuf::from("/downloads"));

        let plan = plan_actions(&snap, &RuleChain::new(), &opts).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_disabled_flags() {
        let snap = snapshot(vec![torrent("a", "x", 10 * DAY, 1), torrent("b", "y", 0, 1)]);
        let mut opts = options();
        opts.label_remap.insert("y".to_string(), "tv".to_string());
        opts.path_map.insert("x".to_string(), PathBuf::from("/data/x"));
        opts.flags = ActionFlags {
            remove: false,
            relocate: true,
            relabel: false,
        };

        let plan = plan_actions(&snap, &RuleChain::new(), &opts).unwrap();
        assert!(plan.to_remove.is_empty());
        assert!(plan.to_relabel.is_empty());
        assert_eq!(plan.move_for("a"), Some(&PathBuf::from("/data/x")));
    }

    #[test]
    fn test_retention_protects_from_removal() {
        let rules = compile_rules(
            &[RuleDefinition::new("t", 10, Duration::from_secs(DAY)).with_keep_count(1)],
            true,
        )
        .unwrap();
        let snap = snapshot(vec![
            torrent("big", "t", 30 * DAY, 100),
            torrent("small", "t", 30 * DAY, 10),
        ]);

        let plan = plan_actions(&snap, &rules, &options()).unwrap();
        assert_eq!(plan.to_remove, vec!["small"]);
    }

    #[test]
    fn test_rule_errors_propagate() {
        let definition = RuleDefinition::new("t", 1, Duration::from_secs(DAY))
            .with_formula("timedelta(weeks=1000000) * {size}");
        let rules = compile_rules(&[definition], true).unwrap();
        let huge = torrent("a", "t", 10 * DAY, u64::MAX);

        let result = plan_actions(&snapshot(vec![huge]), &rules, &options());
        assert!(matches!(result, Err(RuleError::InvalidFormulaResult(_))));
    }
}
