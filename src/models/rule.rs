use crate::core::error::RuleError;
use crate::engine::formula::{Formula, FormulaInputs};
use crate::models::torrent::Torrent;
use crate::utils::size::gibibytes;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// A tracker rule as written in configuration (JSON or TOML).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub host: String,
    pub priority: i64,
    #[serde(with = "crate::utils::time::serde_duration")]
    pub min_time: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_size: Option<u64>,
}

impl RuleDefinition {
    pub fn new(host: &str, priority: i64, min_time: Duration) -> Self {
        Self {
            host: host.to_string(),
            priority,
            min_time,
            min_formula: None,
            name_search: None,
            keep_count: None,
            keep_size: None,
        }
    }

    pub fn with_formula(mut self, formula: &str) -> Self {
        self.min_formula = Some(formula.to_string());
        self
    }

    pub fn with_name_search(mut self, pattern: &str) -> Self {
        self.name_search = Some(pattern.to_string());
        self
    }

    pub fn with_keep_count(mut self, keep_count: u64) -> Self {
        self.keep_count = Some(keep_count);
        self
    }

    pub fn with_keep_size(mut self, keep_size: u64) -> Self {
        self.keep_size = Some(keep_size);
        self
    }
}

/// A validated rule: formula parsed, name pattern compiled.
#[derive(Debug, Clone)]
pub struct TrackerRule {
    pub host: String,
    pub priority: i64,
    pub min_time: Duration,
    pub min_formula: Option<Formula>,
    pub name_search: Option<Regex>,
    /// Number of torrents to keep regardless of seed time
    pub keep_count: Option<u64>,
    /// GiB of wanted data to keep regardless of seed time
    pub keep_size: Option<u64>,
}

impl TrackerRule {
    pub fn from_definition(definition: &RuleDefinition) -> Result<Self, RuleError> {
        let min_formula = definition
            .min_formula
            .as_deref()
            .map(Formula::parse)
            .transpose()?;

        let name_search = definition
            .name_search
            .as_deref()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|err| RuleError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: err.to_string(),
                    })
            })
            .transpose()?;

        Ok(Self {
            host: definition.host.clone(),
            priority: definition.priority,
            min_time: definition.min_time,
            min_formula,
            name_search,
            keep_count: definition.keep_count,
            keep_size: definition.keep_size,
        })
    }

    /// Serializable form of this rule, for inspection.
    pub fn to_definition(&self) -> RuleDefinition {
        RuleDefinition {
            host: self.host.clone(),
            priority: self.priority,
            min_time: self.min_time,
            min_formula: self.min_formula.as_ref().map(|f| f.source().to_string()),
            name_search: self.name_search.as_ref().map(|re| re.as_str().to_string()),
            keep_count: self.keep_count,
            keep_size: self.keep_size,
        }
    }

    /// Effective keep count; zero means no cap.
    pub fn keep_count_limit(&self) -> Option<u64> {
        self.keep_count.filter(|&count| count > 0)
    }

    /// Effective keep size in GiB; zero means no cap.
    pub fn keep_size_limit(&self) -> Option<u64> {
        self.keep_size.filter(|&size| size > 0)
    }

    pub fn has_retention(&self) -> bool {
        self.keep_count_limit().is_some() || self.keep_size_limit().is_some()
    }

    /// True when the rule has no name filter or the filter matches.
    pub fn matches_name(&self, name: &str) -> bool {
        self.name_search
            .as_ref()
            .map_or(true, |pattern| pattern.is_match(name))
    }

    /// Seed time a torrent needs before this rule lets it go.
    pub fn required_seed_time(
        &self,
        torrent: &Torrent,
        buffer: f64,
    ) -> Result<Duration, RuleError> {
        match &self.min_formula {
            None => {
                let seconds = self.min_time.as_secs_f64() * buffer;
                Ok(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
            }
            Some(formula) => formula.evaluate(&FormulaInputs {
                min_time: self.min_time,
                size_gib: gibibytes(torrent.total_wanted),
                buffer,
            }),
        }
    }
}

/// Compiled rules keyed by tracker alias, each sorted ascending by priority.
/// A priority-0 retention rule, when present, is always first.
#[derive(Debug, Clone, Default)]
pub struct RuleChain {
    chains: HashMap<String, Vec<TrackerRule>>,
}

impl RuleChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, host: String, rules: Vec<TrackerRule>) {
        self.chains.insert(host, rules);
    }

    pub fn get(&self, alias: &str) -> Option<&[TrackerRule]> {
        self.chains.get(alias).map(Vec::as_slice)
    }

    /// The rule deciding group retention: the synthesized priority-0 rule
    /// when one exists, otherwise the lowest-priority rule.
    pub fn head(&self, alias: &str) -> Option<&TrackerRule> {
        self.get(alias).and_then(|rules| rules.first())
    }

    /// Rules consulted for seed time: everything with priority 1 or more.
    pub fn seed_rules(&self, alias: &str) -> &[TrackerRule] {
        match self.get(alias) {
            Some(rules) => {
                let skip = rules.iter().take_while(|rule| rule.priority < 1).count();
                &rules[skip..]
            }
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::torrent::fixtures::torrent;

    const DAY: u64 = 86_400;

    #[test]
    fn test_definition_json_omits_absent_fields() {
        let rule = RuleDefinition::new("flacsfor.me", 10, Duration::from_secs(7 * DAY));
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"host": "flacsfor.me", "priority": 10, "min_time": "P7D"})
        );
    }

    #[test]
    fn test_definition_accepts_seconds_and_iso() {
        let rule: RuleDefinition = serde_json::from_str(
            r#"{"host": "a", "priority": 1, "min_time": 3600, "keep_count": 5}"#,
        )
        .unwrap();
        assert_eq!(rule.min_time, Duration::from_secs(3600));
        assert_eq!(rule.keep_count, Some(5));

        let rule: RuleDefinition =
            serde_json::from_str(r#"{"host": "a", "priority": 1, "min_time": "P1DT1H"}"#).unwrap();
        assert_eq!(rule.min_time, Duration::from_secs(DAY + 3600));
        assert!(rule.name_search.is_none());
    }

    #[test]
    fn test_tracker_rule_round_trip() {
        let definition = RuleDefinition::new("landof.tv", 1, Duration::from_secs(DAY))
            .with_name_search("S[0-9][0-9]E[0-9][0-9]")
            .with_formula("{min} * {buffer}")
            .with_keep_size(20);
        let rule = TrackerRule::from_definition(&definition).unwrap();
        assert_eq!(rule.to_definition(), definition);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let definition =
            RuleDefinition::new("a", 1, Duration::from_secs(1)).with_name_search("S01(");
        assert!(matches!(
            TrackerRule::from_definition(&definition),
            Err(RuleError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_name_filter_is_case_insensitive() {
        let definition =
            RuleDefinition::new("a", 1, Duration::from_secs(1)).with_name_search("S01E02");
        let rule = TrackerRule::from_definition(&definition).unwrap();
        assert!(rule.matches_name("Show.s01e02.mkv"));
        assert!(!rule.matches_name("Show.Complete.Pack"));
    }

    #[test]
    fn test_required_seed_time_applies_buffer() {
        let rule =
            TrackerRule::from_definition(&RuleDefinition::new("a", 1, Duration::from_secs(1000)))
                .unwrap();
        let t = torrent("x", "a", 0, 0);
        assert_eq!(
            rule.required_seed_time(&t, 1.5).unwrap(),
            Duration::from_secs(1500)
        );
    }

    #[test]
    fn test_required_seed_time_uses_formula_with_size() {
        let definition = RuleDefinition::new("a", 1, Duration::from_secs(DAY))
            .with_formula("{min} + timedelta(hours=1) * {size}");
        let rule = TrackerRule::from_definition(&definition).unwrap();
        let t = torrent("x", "a", 0, 3 << 30);
        assert_eq!(
            rule.required_seed_time(&t, 1.0).unwrap(),
            Duration::from_secs(DAY + 3 * 3600)
        );
    }

    #[test]
    fn test_zero_keep_caps_are_ignored() {
        let definition = RuleDefinition::new("a", 1, Duration::from_secs(1)).with_keep_count(0);
        let rule = TrackerRule::from_definition(&definition).unwrap();
        assert!(!rule.has_retention());
        assert_eq!(rule.to_definition().keep_count, Some(0));
    }
}
