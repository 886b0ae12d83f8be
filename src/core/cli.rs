use crate::core::config::Config;
use crate::core::error::ParseError;
use crate::engine::compiler::RULES_ENV_VAR;
use crate::models::torrent::State;
use crate::utils::maps::{parse_pairs, split_list};
use crate::utils::time::parse_duration;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "deluge-sync",
    version,
    about = "Relabel, move and retire torrents on a Deluge daemon by tracker rules"
)]
pub struct Cli {
    /// TOML config file (default: ./deluge-sync.toml when present)
    #[arg(short = 'c', long, global = true, env = "DELUGE_SYNC_CONFIG")]
    pub config: Option<PathBuf>,
    /// Deluge Web base URL
    #[arg(short = 'u', long = "deluge-url", global = true, env = "DELUGE_SYNC_URL")]
    pub url: Option<String>,
    /// Deluge Web password
    #[arg(
        short = 'p',
        long = "deluge-password",
        global = true,
        env = "DELUGE_SYNC_PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,
    /// Request timeout in seconds
    #[arg(long, global = true, env = "DELUGE_SYNC_TIMEOUT")]
    pub deluge_timeout: Option<u64>,
    /// Login attempts
    #[arg(long, global = true, env = "DELUGE_SYNC_RETRIES")]
    pub deluge_retries: Option<u32>,
    /// Host header sent to the Deluge Web UI
    #[arg(long, global = true, env = "DELUGE_SYNC_HOST")]
    pub deluge_host: Option<String>,
    /// Skip TLS certificate verification
    #[arg(long, global = true, env = "DELUGE_SYNC_NO_VERIFY")]
    pub no_verify: bool,
    /// Only log warnings and errors
    #[arg(short = 'q', long, global = true, env = "DELUGE_SYNC_QUIET")]
    pub quiet: bool,
    /// JSON rule list replacing config file and built-in rules
    #[arg(long, global = true, env = RULES_ENV_VAR, hide_env_values = true)]
    pub rules: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List torrents on the daemon
    Query(QueryArgs),
    /// Print the active rule list as JSON
    Rules,
    /// Plan and apply relabel, move and remove actions
    Sync(SyncArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Query(_) => "query",
            Command::Rules => "rules",
            Command::Sync(_) => "sync",
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct QueryArgs {
    /// Torrent state to filter for
    #[arg(short = 's', long, env = "DELUGE_SYNC_STATE")]
    pub state: Option<State>,
    /// Only torrents with these labels
    #[arg(short = 'l', long = "label", env = "DELUGE_SYNC_LABELS")]
    pub labels: Vec<String>,
    /// Drop torrents with these labels
    #[arg(short = 'e', long = "exclude-label", env = "DELUGE_SYNC_EXCLUDE_LABELS")]
    pub exclude_labels: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Only torrents with these labels
    #[arg(short = 'l', long = "label", env = "DELUGE_SYNC_LABELS")]
    pub labels: Vec<String>,
    /// Drop torrents with these labels
    #[arg(short = 'e', long = "exclude-label", env = "DELUGE_SYNC_EXCLUDE_LABELS")]
    pub exclude_labels: Vec<String>,
    /// Seed time for trackers without rules (seconds, ISO-8601 or 1h30m)
    #[arg(short = 't', long, env = "DELUGE_SYNC_SEED_TIME", value_parser = parse_duration)]
    pub seed_time: Option<Duration>,
    /// Multiplier applied to every rule's min_time
    #[arg(long = "buffer-time", env = "DELUGE_SYNC_SEED_BUFFER")]
    pub seed_buffer: Option<f64>,
    /// TRACKER=PATH storage location per tracker
    #[arg(short = 'm', long = "path-map", env = "DELUGE_SYNC_PATH_MAP")]
    pub path_map: Vec<String>,
    /// TRACKER=LABEL label per tracker
    #[arg(long = "label-remap", env = "DELUGE_SYNC_LABEL_REMAP")]
    pub label_remap: Vec<String>,
    /// HOST=TRACKER alias for trackers announcing under another host
    #[arg(long = "host-alias", env = "DELUGE_SYNC_HOST_ALIAS_MAP")]
    pub host_aliases: Vec<String>,
    #[arg(long, env = "DELUGE_SYNC_NO_REMOVE")]
    pub no_remove: bool,
    #[arg(long, env = "DELUGE_SYNC_NO_MOVE")]
    pub no_move: bool,
    #[arg(long, env = "DELUGE_SYNC_NO_RELABEL")]
    pub no_relabel: bool,
    /// Log the planned actions without applying them
    #[arg(short = 'd', long, env = "DELUGE_SYNC_DRY_RUN")]
    pub dry_run: bool,
}

impl Cli {
    /// Layer command-line and environment values over the config file.
    pub fn apply(&self, config: &mut Config) -> Result<(), ParseError> {
        if let Some(url) = &self.url {
            config.deluge.url = url.clone();
        }
        if let Some(password) = &self.password {
            config.deluge.password = password.clone();
        }
        if let Some(timeout) = self.deluge_timeout {
            config.deluge.timeout = timeout;
        }
        if let Some(retries) = self.deluge_retries {
            config.deluge.retries = retries;
        }
        if let Some(host) = &self.deluge_host {
            config.deluge.host_header = Some(host.clone());
        }
        if self.no_verify {
            config.deluge.verify = false;
        }
        if self.quiet {
            config.logging.quiet = true;
        }

        if let Command::Sync(args) = &self.command {
            args.apply(config)?;
        }
        Ok(())
    }
}

impl SyncArgs {
    fn apply(&self, config: &mut Config) -> Result<(), ParseError> {
        let sync = &mut config.sync;

        if !self.labels.is_empty() {
            sync.labels = split_list(&self.labels);
        }
        if !self.exclude_labels.is_empty() {
            sync.exclude_labels = split_list(&self.exclude_labels);
        }
        if let Some(seed_time) = self.seed_time {
            sync.seed_time = seed_time;
        }
        if let Some(buffer) = self.seed_buffer {
            sync.seed_buffer = buffer;
        }
        if !self.path_map.is_empty() {
            sync.path_map = parse_pairs(&self.path_map)?
                .into_iter()
                .map(|(tracker, path)| (tracker, PathBuf::from(path)))
                .collect();
        }
        if !self.label_remap.is_empty() {
            sync.label_remap = parse_pairs(&self.label_remap)?;
        }
        if !self.host_aliases.is_empty() {
            sync.host_aliases = parse_pairs(&self.host_aliases)?;
        }

        sync.remove &= !self.no_remove;
        sync.relocate &= !self.no_move;
        sync.relabel &= !self.no_relabel;
        sync.dry_run |= self.dry_run;
        Ok(())
    }
}
