use crate::core::error::RuleError;
use crate::models::rule::{RuleChain, RuleDefinition, TrackerRule};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable holding a JSON rule list that replaces all other rules.
pub const RULES_ENV_VAR: &str = "DELUGE_SYNC_RULES";

const SIZE_FORMULA: &str = "({min!r}+(timedelta(hours=2)*{size!r})) * {buffer}";
const EPISODE_PATTERN: &str = r"(?i)S[0-9][0-9]E[0-9][0-9]";

/// Tracker alias used when none are configured.
pub const DEFAULT_HOST_ALIASES: &[(&str, &str)] = &[("tleechreload.org", "torrentleech.org")];

fn days(count: u64) -> Duration {
    Duration::from_secs(count * 86_400)
}

/// Built-in rule table used when no override is configured.
pub fn default_rules() -> Vec<RuleDefinition> {
    vec![
        RuleDefinition::new("avistaz.to", 10, days(3)).with_formula(SIZE_FORMULA),
        RuleDefinition::new("blutopia.cc", 10, days(10)).with_keep_size(10_440),
        RuleDefinition::new("exoticaz.to", 10, days(3)).with_formula(SIZE_FORMULA),
        RuleDefinition::new("flacsfor.me", 10, days(7)),
        RuleDefinition::new("landof.tv", 1, days(1)).with_name_search(EPISODE_PATTERN),
        RuleDefinition::new("landof.tv", 10, days(5)),
        RuleDefinition::new("myanonamouse.net", 10, days(3)),
        RuleDefinition::new("opsfet.ch", 10, days(7)),
        RuleDefinition::new("seedpool.org", 10, days(10)),
        RuleDefinition::new("torrentbytes.net", 10, days(3)),
        RuleDefinition::new("torrentleech.org", 10, days(10)).with_keep_count(100),
        RuleDefinition::new("rptscene.xyz", 10, days(1)),
    ]
}

/// Where the active rule list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    Environment,
    ConfigFile,
    Defaults,
}

impl RuleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSource::Environment => "environment",
            RuleSource::ConfigFile => "config file",
            RuleSource::Defaults => "defaults",
        }
    }
}

/// Pick the active rule list. An environment override replaces everything,
/// then config file rules replace the defaults. Sources are never merged.
pub fn select_rules(
    env_rules: Option<&str>,
    config_rules: &[RuleDefinition],
) -> Result<(RuleSource, Vec<RuleDefinition>), RuleError> {
    if let Some(json) = env_rules.map(str::trim).filter(|json| !json.is_empty()) {
        let rules: Vec<RuleDefinition> = serde_json::from_str(json)
            .map_err(|err| RuleError::InvalidRuleSource(format!("{RULES_ENV_VAR}: {err}")))?;
        info!(rules = rules.len(), "Loading rules from environment");
        return Ok((RuleSource::Environment, rules));
    }

    if !config_rules.is_empty() {
        info!(rules = config_rules.len(), "Loading rules from config file");
        return Ok((RuleSource::ConfigFile, config_rules.to_vec()));
    }

    info!("Loading default rules");
    Ok((RuleSource::Defaults, default_rules()))
}

/// Group rules by host, sort each group by priority and synthesize the
/// priority-0 retention rule where keep caps are declared.
pub fn compile_rules(definitions: &[RuleDefinition], remove: bool) -> Result<RuleChain, RuleError> {
    // First-seen host order, so the first bad host is the one reported.
    let mut groups: Vec<(&str, Vec<&RuleDefinition>)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for definition in definitions {
        let host = definition.host.as_str();
        match positions.get(host) {
            Some(&position) => groups[position].1.push(definition),
            None => {
                positions.insert(host, groups.len());
                groups.push((host, vec![definition]));
            }
        }
    }

    let mut chain = RuleChain::new();
    for (host, mut group) in groups {
        group.sort_by_key(|definition| definition.priority);

        let rules = group
            .into_iter()
            .map(TrackerRule::from_definition)
            .collect::<Result<Vec<_>, _>>()?;

        let rules = compile_group(host, rules)?;
        debug!(
            tracker = host,
            rules = rules.len(),
            retention = rules.first().is_some_and(|rule| rule.priority == 0),
            "Compiled tracker rules"
        );
        chain.insert(host.to_string(), rules);
    }

    info!(trackers = chain.len(), remove = remove, "Loaded tracker rules");
    Ok(chain)
}

fn compile_group(host: &str, mut rules: Vec<TrackerRule>) -> Result<Vec<TrackerRule>, RuleError> {
    let Some(base) = rules.first() else {
        return Ok(rules);
    };

    if base.priority < 1 {
        return Err(RuleError::InvalidPriority {
            host: host.to_string(),
            priority: base.priority,
        });
    }

    if rules.len() == 1 {
        // A lone rule heads its own chain and carries its caps directly.
        if base.keep_count_limit().is_some() && base.keep_size_limit().is_some() {
            return Err(RuleError::InvalidKeepConflict {
                host: host.to_string(),
            });
        }
        return Ok(rules);
    }

    let retention = synthesize_retention_rule(&rules);
    if retention.has_retention() {
        if retention.keep_count_limit().is_some() && retention.keep_size_limit().is_some() {
            return Err(RuleError::InvalidKeepConflict {
                host: host.to_string(),
            });
        }
        rules.insert(0, retention);
    }

    Ok(rules)
}

/// Clone the base rule into a new priority-0 value, overlaying every
/// declared keep count in priority order (last one wins).
fn synthesize_retention_rule(sorted: &[TrackerRule]) -> TrackerRule {
    let mut retention = TrackerRule {
        priority: 0,
        ..sorted[0].clone()
    };
    for rule in sorted {
        if let Some(count) = rule.keep_count_limit() {
            retention.keep_count = Some(count);
        }
    }
    retention
}
