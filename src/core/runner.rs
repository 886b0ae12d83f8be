use crate::api::client::DelugeClient;
use crate::api::daemon::{DaemonMutator, TorrentQuery, TorrentSource};
use crate::core::cli::{Command, QueryArgs};
use crate::core::config::Config;
use crate::core::error::CliError;
use crate::core::executor::execute_plan;
use crate::core::output::{render_report, render_rules, render_torrent_table};
use crate::engine::compiler::{compile_rules, select_rules, DEFAULT_HOST_ALIASES};
use crate::engine::planner::{plan_actions, ActionFlags, PlanOptions};
use crate::models::plan::ExecutionReport;
use crate::models::rule::{RuleChain, RuleDefinition};
use crate::models::torrent::State;
use crate::utils::maps::split_list;
use std::collections::HashMap;
use tracing::info;

pub const EXIT_SUCCESS: i32 = 0;
/// `query` found no torrents
pub const EXIT_NOTHING_FOUND: i32 = 1;

/// Run one command to completion and return the process exit code.
///
/// `rule_override` is the JSON rule list from `--rules` or the environment.
pub async fn run(
    command: Command,
    config: Config,
    rule_override: Option<String>,
) -> Result<i32, CliError> {
    match command {
        Command::Rules => {
            let rules = active_rules(rule_override.as_deref(), &config)?;
            let json = render_rules(&rules).map_err(|err| CliError::Output(err.to_string()))?;
            println!("{json}");
            Ok(EXIT_SUCCESS)
        }
        Command::Query(args) => {
            config.validate_deluge().map_err(CliError::config)?;
            let client = connect(&config).await?;
            query(&client, &args, &config).await
        }
        Command::Sync(_) => {
            config.validate().map_err(CliError::config)?;

            let definitions = active_rules(rule_override.as_deref(), &config)?;
            let rules = compile_rules(&definitions, config.sync.remove)?;

            let client = connect(&config).await?;
            sync(&client, &client, &config, &rules).await?;
            Ok(EXIT_SUCCESS)
        }
    }
}

async fn connect(config: &Config) -> Result<DelugeClient, CliError> {
    let deluge = &config.deluge;
    info!(
        url = %deluge.url,
        timeout = deluge.timeout,
        retries = deluge.retries,
        host = ?deluge.host_header,
        verify = deluge.verify,
        "Connecting to Deluge"
    );
    let client = DelugeClient::new(deluge)?;
    client.connect().await?;
    Ok(client)
}

fn active_rules(
    rule_override: Option<&str>,
    config: &Config,
) -> Result<Vec<RuleDefinition>, CliError> {
    let (source, rules) = select_rules(rule_override, &config.rules)?;
    info!(source = source.as_str(), rules = rules.len(), "Selected rule source");
    Ok(rules)
}

fn host_aliases(config: &Config) -> HashMap<String, String> {
    if config.sync.host_aliases.is_empty() {
        DEFAULT_HOST_ALIASES
            .iter()
            .map(|(host, alias)| (host.to_string(), alias.to_string()))
            .collect()
    } else {
        config.sync.host_aliases.clone()
    }
}

/// Print the torrent table. Returns [`EXIT_NOTHING_FOUND`] when empty.
pub async fn query(
    source: &dyn TorrentSource,
    args: &QueryArgs,
    config: &Config,
) -> Result<i32, CliError> {
    let query = TorrentQuery {
        state: args.state,
        labels: split_list(&args.labels),
        exclude_labels: split_list(&args.exclude_labels),
        aliases: host_aliases(config),
    };
    info!(
        state = ?query.state,
        labels = ?query.labels,
        exclude = ?query.exclude_labels,
        "Getting list of torrents"
    );

    let snapshot = source.fetch_torrents(&query).await?;
    if snapshot.is_empty() {
        println!("No torrents found");
        return Ok(EXIT_NOTHING_FOUND);
    }

    print!("{}", render_torrent_table(&snapshot));
    Ok(EXIT_SUCCESS)
}

/// One sync pass: fetch seeding torrents, plan, then apply the plan.
pub async fn sync(
    source: &dyn TorrentSource,
    mutator: &dyn DaemonMutator,
    config: &Config,
    rules: &RuleChain,
) -> Result<ExecutionReport, CliError> {
    let settings = &config.sync;
    let query = TorrentQuery {
        state: Some(State::Seeding),
        labels: settings.labels.clone(),
        exclude_labels: settings.exclude_labels.clone(),
        aliases: host_aliases(config),
    };
    info!(
        path_maps = settings.path_map.len(),
        label_remaps = settings.label_remap.len(),
        aliases = query.aliases.len(),
        labels = ?query.labels,
        exclude = ?query.exclude_labels,
        "Getting list of seeding torrents"
    );

    let snapshot = source.fetch_torrents(&query).await?;
    if snapshot.is_empty() {
        info!("No torrents to process");
        return Ok(ExecutionReport {
            dry_run: settings.dry_run,
            actions: Vec::new(),
        });
    }
    info!(torrents = snapshot.len(), "Processing torrents");

    let options = PlanOptions {
        label_remap: settings.label_remap.clone(),
        path_map: settings.path_map.clone(),
        flags: ActionFlags {
            remove: settings.remove,
            relocate: settings.relocate,
            relabel: settings.relabel,
        },
        default_seed_time: settings.seed_time,
        seed_buffer: settings.seed_buffer,
    };
    let plan = plan_actions(&snapshot, rules, &options)?;

    let report = execute_plan(mutator, &plan, &snapshot, settings.dry_run).await;
    print!("{}", render_report(&report, &snapshot));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ClientError;
    use crate::models::plan::{ActionKind, Outcome};
    use crate::models::torrent::fixtures::torrent;
    use crate::models::torrent::{Snapshot, Torrent};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    const DAY: u64 = 86_400;

    /// In-memory daemon: serves a fixed torrent list and records mutations.
    struct FakeDaemon {
        torrents: Vec<Torrent>,
        queries: Mutex<Vec<TorrentQuery>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeDaemon {
        fn new(torrents: Vec<Torrent>) -> Self {
            Self {
                torrents,
                queries: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TorrentSource for FakeDaemon {
        async fn fetch_torrents(&self, query: &TorrentQuery) -> Result<Snapshot, ClientError> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(self
                .torrents
                .iter()
                .filter(|t| !query.exclude_labels.contains(&t.label))
                .cloned()
                .map(|mut t| {
                    if let Some(alias) = query.aliases.get(&t.tracker_host) {
                        t.tracker_alias = alias.clone();
                    }
                    t
                })
                .collect())
        }
    }

    #[async_trait]
    impl DaemonMutator for FakeDaemon {
        async fn remove_torrent(&self, torrent_id: &str) -> Result<(), ClientError> {
            self.calls.lock().unwrap().push(format!("remove {torrent_id}"));
            Ok(())
        }

        async fn move_torrent(&self, torrent_id: &str, path: &str) -> Result<(), ClientError> {
            self.calls.lock().unwrap().push(format!("move {torrent_id} {path}"));
            Ok(())
        }

        async fn relabel_torrent(&self, torrent_id: &str, label: &str) -> Result<(), ClientError> {
            self.calls.lock().unwrap().push(format!("relabel {torrent_id} {label}"));
            Ok(())
        }
    }

    fn leech(id: &str, seeding_days: u64) -> Torrent {
        torrent(id, "tleechreload.org", seeding_days * DAY, 1 << 30)
    }

    #[tokio::test]
    async fn test_sync_applies_default_aliases_and_rules() {
        let daemon = FakeDaemon::new(vec![
            leech("old", 12),
            torrent("flac-old", "flacsfor.me", 8 * DAY, 1),
            torrent("flac-new", "flacsfor.me", 7 * DAY, 1),
        ]);
        let config = Config::default();
        let definitions = active_rules(None, &config).unwrap();
        let rules = compile_rules(&definitions, true).unwrap();

        let report = sync(&daemon, &daemon, &config, &rules).await.unwrap();

        let query = daemon.queries.lock().unwrap()[0].clone();
        assert_eq!(query.state, Some(State::Seeding));
        assert_eq!(query.aliases["tleechreload.org"], "torrentleech.org");
        // torrentleech.org keeps its 100 largest; flacsfor.me needs 7 days * 1.1
        assert_eq!(daemon.calls(), vec!["remove flac-old"]);
        assert_eq!(report.applied(), 1);
    }

    #[tokio::test]
    async fn test_sync_dry_run_reports_without_calls() {
        let daemon = FakeDaemon::new(vec![torrent("a", "other", 2 * DAY, 1)]);
        let mut config = Config::default();
        config.sync.dry_run = true;
        config.sync.path_map.insert("other".to_string(), PathBuf::from("/data/other"));
        config.sync.seed_time = Duration::from_secs(3 * DAY);

        let report = sync(&daemon, &daemon, &config, &RuleChain::new()).await.unwrap();

        assert!(daemon.calls().is_empty());
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.actions[0].kind, ActionKind::Move);
        assert_eq!(report.actions[0].outcome, Outcome::Skipped);
    }

    #[tokio::test]
    async fn test_sync_honours_label_filters_and_remap() {
        let mut keep = torrent("keep", "flacsfor.me", 30 * DAY, 1);
        keep.label = "keep".to_string();
        let music = torrent("music", "flacsfor.me", 0, 1);
        let daemon = FakeDaemon::new(vec![keep, music]);

        let mut config = Config::default();
        config.sync.exclude_labels = vec!["keep".to_string()];
        config
            .sync
            .label_remap
            .insert("flacsfor.me".to_string(), "music".to_string());

        sync(&daemon, &daemon, &config, &RuleChain::new()).await.unwrap();
        assert_eq!(daemon.calls(), vec!["relabel music music"]);
    }

    #[tokio::test]
    async fn test_sync_empty_snapshot() {
        let daemon = FakeDaemon::new(Vec::new());
        let report = sync(&daemon, &daemon, &Config::default(), &RuleChain::new())
            .await
            .unwrap();
        assert!(report.actions.is_empty());
    }

    #[tokio::test]
    async fn test_query_exit_codes() {
        let empty = FakeDaemon::new(Vec::new());
        let code = query(&empty, &QueryArgs::default(), &Config::default()).await.unwrap();
        assert_eq!(code, EXIT_NOTHING_FOUND);

        let daemon = FakeDaemon::new(vec![torrent("a", "x", 0, 1)]);
        let args = QueryArgs {
            state: Some(State::Seeding),
            labels: vec!["tv,movies".to_string()],
            exclude_labels: Vec::new(),
        };
        let code = query(&daemon, &args, &Config::default()).await.unwrap();
        assert_eq!(code, EXIT_SUCCESS);
        assert_eq!(daemon.queries.lock().unwrap()[0].labels, vec!["tv", "movies"]);
    }

    #[test]
    fn test_config_rules_replace_defaults() {
        let mut config = Config::default();
        config.rules = vec![RuleDefinition::new("a", 1, Duration::from_secs(DAY))];
        assert_eq!(active_rules(None, &config).unwrap(), config.rules);

        let env = r#"[{"host": "b", "priority": 2, "min_time": "P1D"}]"#;
        let rules = active_rules(Some(env), &config).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].host, "b");
    }

    #[test]
    fn test_explicit_aliases_replace_default() {
        let mut config = Config::default();
        assert_eq!(host_aliases(&config).len(), DEFAULT_HOST_ALIASES.len());
        config
            .sync
            .host_aliases
            .insert("a.example".to_string(), "a".to_string());
        let aliases = host_aliases(&config);
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases["a.example"], "a");
    }
}
