use crate::models::rule::RuleChain;
use crate::models::torrent::{Snapshot, Torrent};
use crate::utils::size::GIBIBYTE;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Group torrents by tracker alias, preserving first-seen order of both
/// groups and members.
pub fn torrents_by_tracker(snapshot: &Snapshot) -> Vec<(&str, Vec<&Torrent>)> {
    let mut groups: Vec<(&str, Vec<&Torrent>)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for torrent in snapshot {
        let alias = torrent.tracker_alias.as_str();
        match positions.get(alias) {
            Some(&position) => groups[position].1.push(torrent),
            None => {
                positions.insert(alias, groups.len());
                groups.push((alias, vec![torrent]));
            }
        }
    }

    groups
}

/// Ids of torrents not protected by their tracker's keep-count or
/// keep-size policy, and therefore open to seed-time based removal.
pub fn eligible_for_removal(snapshot: &Snapshot, rules: &RuleChain) -> HashSet<String> {
    let mut eligible = HashSet::new();

    for (alias, mut group) in torrents_by_tracker(snapshot) {
        // Largest first: these fill the kept slots.
        group.sort_by(|a, b| b.total_wanted.cmp(&a.total_wanted));

        let selected = match rules.head(alias) {
            Some(head) => match (head.keep_count_limit(), head.keep_size_limit()) {
                (Some(keep_count), _) => over_count(alias, &group, keep_count),
                (None, Some(keep_size)) => over_size(alias, &group, keep_size),
                (None, None) => &group[..],
            },
            None => &group[..],
        };

        eligible.extend(selected.iter().map(|torrent| torrent.id.clone()));
    }

    eligible
}

fn over_count<'a>(alias: &str, sorted: &'a [&'a Torrent], keep_count: u64) -> &'a [&'a Torrent] {
    let count = sorted.len();
    let keep = usize::try_from(keep_count).unwrap_or(usize::MAX);

    if count <= keep {
        info!(
            tracker = alias,
            count = count,
            keep_count = keep_count,
            "Tracker torrent count within keep count, keeping all"
        );
        return &[];
    }

    info!(
        tracker = alias,
        keep_count = keep_count,
        to_check = count - keep,
        "Tracker is over keep count"
    );
    &sorted[keep..]
}

fn over_size<'a>(alias: &str, sorted: &'a [&'a Torrent], keep_size: u64) -> &'a [&'a Torrent] {
    // Whole bytes against a whole-GiB limit keeps the comparison exact.
    let limit = u128::from(keep_size) * u128::from(GIBIBYTE);
    let mut total: u128 = 0;

    for (index, torrent) in sorted.iter().enumerate() {
        total += u128::from(torrent.total_wanted);
        if total > limit {
            let selected = &sorted[index..];
            info!(
                tracker = alias,
                total_size_gib = total as f64 / GIBIBYTE as f64,
                keep_size_gib = keep_size,
                to_check = selected.len(),
                "Tracker download size is over keep size"
            );
            return selected;
        }
    }

    info!(
        tracker = alias,
        total_size_gib = total as f64 / GIBIBYTE as f64,
        keep_size_gib = keep_size,
        "Tracker download size within keep size, keeping all"
    );
    &[]
}
