use crate::core::error::RuleError;
use crate::models::rule::TrackerRule;
use crate::models::torrent::Torrent;
use std::time::Duration;
use tracing::trace;

/// Decide whether a torrent has seeded long enough to be removed.
///
/// `rules` is the tracker's seed sub-chain in ascending priority order
/// (see [`RuleChain::seed_rules`](crate::models::rule::RuleChain::seed_rules)).
/// The first rule whose name filter matches and whose required seed time
/// has been exceeded wins. With no rules, the default seed time applies.
pub fn qualifies_for_removal(
    torrent: &Torrent,
    rules: &[TrackerRule],
    default_seed_time: Duration,
    buffer: f64,
) -> Result<bool, RuleError> {
    if rules.is_empty() {
        return Ok(torrent.seeding_time > default_seed_time);
    }

    for rule in rules {
        if !rule.matches_name(&torrent.name) {
            continue;
        }

        let required = rule.required_seed_time(torrent, buffer)?;
        trace!(
            torrent_id = %torrent.id,
            priority = rule.priority,
            required_secs = required.as_secs(),
            seeding_secs = torrent.seeding_time.as_secs(),
            "Checked seed rule"
        );
        if torrent.seeding_time > required {
            return Ok(true);
        }
    }

    Ok(false)
}
