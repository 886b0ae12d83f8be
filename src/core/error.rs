// Centralized error handling for the sync agent

use thiserror::Error;

/// Errors raised while loading or compiling tracker rules.
///
/// Any of these aborts the whole pass: a partially compiled rule set is
/// never used to plan actions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("Priority must be 1 or greater (tracker {host}, priority {priority})")]
    InvalidPriority { host: String, priority: i64 },

    #[error("Keep count and keep size are mutually exclusive (tracker {host})")]
    InvalidKeepConflict { host: String },

    #[error("Invalid formula: {0}")]
    InvalidFormula(String),

    #[error("Formula result must be a duration: {0}")]
    InvalidFormulaResult(String),

    #[error("Invalid name pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid rule source: {0}")]
    InvalidRuleSource(String),
}

/// Errors talking to the Deluge Web JSON-RPC endpoint.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Deluge daemon unavailable: {0}")]
    DaemonUnavailable(String),

    #[error("Deluge returned HTTP status {0}")]
    HttpStatus(u16),

    #[error("Deluge RPC error: {0}")]
    Rpc(String),

    #[error("Not Connected")]
    NotConnected,

    #[error("Deluge rejected the password")]
    AuthFailed,

    #[error("Invalid response from Deluge: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ClientError::HttpStatus(status.as_u16()),
            None if err.is_decode() => ClientError::InvalidResponse(err.to_string()),
            None => ClientError::DaemonUnavailable(err.to_string()),
        }
    }
}

/// A single failed action while applying a plan.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to {action} torrent {torrent_id}: {reason}")]
pub struct ActionExecutionFailed {
    pub action: &'static str,
    pub torrent_id: String,
    pub reason: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("Invalid mapping '{0}', expected KEY=VALUE")]
    InvalidMapping(String),

    #[error("Unknown torrent state '{0}'")]
    UnknownState(String),
}

/// Errors that end a command, mapped to the process exit code.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Failed to render output: {0}")]
    Output(String),
}

impl CliError {
    /// Keeps the full `anyhow` context chain in the message.
    pub fn config(err: anyhow::Error) -> Self {
        Self::Config(format!("{err:#}"))
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Parse(_) | Self::Rule(_) => 2,
            Self::Client(_) => 3,
            Self::Output(_) => 1,
        }
    }
}
