use crate::api::daemon::{DaemonMutator, TorrentQuery, TorrentSource};
use crate::core::config::DelugeConfig;
use crate::core::error::ClientError;
use crate::models::torrent::{Snapshot, State, Torrent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, HOST};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

const ID_AUTH: u32 = 13;
const ID_UPDATE_UI: u32 = 22;
const ID_REMOVE: u32 = 2030;
const ID_MOVE: u32 = 112;
const ID_LABEL: u32 = 9641;

const TORRENT_FIELDS: [&str; 10] = [
    "name",
    "state",
    "time_added",
    "tracker_host",
    "seeding_time",
    "label",
    "download_location",
    "progress",
    "total_done",
    "total_wanted",
];

/// Client for the Deluge Web UI JSON-RPC endpoint
pub struct DelugeClient {
    client: reqwest::Client,
    endpoint: String,
    password: String,
    retries: u32,
    retry_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
    #[serde(default)]
    code: i64,
}

#[derive(Debug, Deserialize)]
struct UpdateUi {
    #[serde(default)]
    connected: bool,
    #[serde(default)]
    torrents: Option<Map<String, Value>>,
}

/// Torrent fields as returned by `web.update_ui`
#[derive(Debug, Deserialize)]
struct RawTorrent {
    name: String,
    state: String,
    time_added: f64,
    tracker_host: String,
    seeding_time: f64,
    #[serde(default)]
    label: String,
    download_location: String,
    progress: f64,
    total_done: u64,
    total_wanted: u64,
}

impl RawTorrent {
    fn into_torrent(
        self,
        id: String,
        aliases: &HashMap<String, String>,
    ) -> Result<Torrent, ClientError> {
        let state = self
            .state
            .parse::<State>()
            .map_err(|err| ClientError::InvalidResponse(format!("torrent {id}: {err}")))?;

        let time_added = timestamp_from_secs(self.time_added).ok_or_else(|| {
            ClientError::InvalidResponse(format!(
                "torrent {id}: bad time_added {}",
                self.time_added
            ))
        })?;

        let seeding_time = Duration::try_from_secs_f64(self.seeding_time.max(0.0)).map_err(|_| {
            ClientError::InvalidResponse(format!(
                "torrent {id}: bad seeding_time {}",
                self.seeding_time
            ))
        })?;

        let tracker_alias = aliases
            .get(&self.tracker_host)
            .cloned()
            .unwrap_or_else(|| self.tracker_host.clone());

        Ok(Torrent {
            id,
            name: self.name,
            state,
            label: self.label,
            tracker_host: self.tracker_host,
            tracker_alias,
            time_added,
            seeding_time,
            download_location: PathBuf::from(self.download_location),
            progress: self.progress,
            total_done: self.total_done,
            total_wanted: self.total_wanted,
        })
    }
}

fn timestamp_from_secs(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

impl DelugeClient {
    pub fn new(config: &DelugeConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        if let Some(host) = &config.host_header {
            let value = HeaderValue::from_str(host).map_err(|err| {
                ClientError::DaemonUnavailable(format!("invalid host header '{host}': {err}"))
            })?;
            headers.insert(HOST, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .cookie_store(true)
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify)
            .build()
            .map_err(|err| {
                ClientError::DaemonUnavailable(format!("failed to create HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/json", config.url.trim_end_matches('/')),
            password: config.password.clone(),
            retries: config.retries.max(1),
            retry_delay: Duration::from_millis(500),
        })
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Log in, retrying transport failures. A rejected password is not retried.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let mut attempt = 1;
        loop {
            match self.auth().await {
                Ok(()) => {
                    info!(endpoint = %self.endpoint, "Logged in to Deluge");
                    return Ok(());
                }
                Err(ClientError::AuthFailed) => return Err(ClientError::AuthFailed),
                Err(err) if attempt < self.retries => {
                    warn!(
                        endpoint = %self.endpoint,
                        attempt = attempt,
                        retries = self.retries,
                        error = %err,
                        "Deluge login failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn auth(&self) -> Result<(), ClientError> {
        let logged_in: Option<bool> = self
            .call("auth.login", json!([self.password]), ID_AUTH)
            .await?;

        match logged_in {
            Some(true) => Ok(()),
            _ => Err(ClientError::AuthFailed),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        id: u32,
    ) -> Result<Option<T>, ClientError> {
        debug!(method = method, "Calling Deluge");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({"method": method, "params": params, "id": id}))
            .send()
            .await?
            .error_for_status()?;

        let body = response.json::<RpcResponse<T>>().await?;

        if let Some(error) = body.error {
            return Err(ClientError::Rpc(format!("{} (code {})", error.message, error.code)));
        }

        Ok(body.result)
    }
}

#[async_trait]
impl TorrentSource for DelugeClient {
    async fn fetch_torrents(&self, query: &TorrentQuery) -> Result<Snapshot, ClientError> {
        let mut filter = Map::new();
        if let Some(state) = query.state {
            filter.insert("state".to_string(), json!(state.as_str()));
        }
        if !query.labels.is_empty() {
            filter.insert("label".to_string(), json!(query.labels));
        }

        let update: UpdateUi = self
            .call("web.update_ui", json!([TORRENT_FIELDS, filter]), ID_UPDATE_UI)
            .await?
            .ok_or_else(|| {
                ClientError::InvalidResponse("web.update_ui returned no result".to_string())
            })?;

        if !update.connected {
            return Err(ClientError::NotConnected);
        }

        let mut snapshot = Snapshot::new();
        for (id, values) in update.torrents.unwrap_or_default() {
            let raw: RawTorrent = serde_json::from_value(values)
                .map_err(|err| ClientError::InvalidResponse(format!("torrent {id}: {err}")))?;
            if query.exclude_labels.contains(&raw.label) {
                continue;
            }
            snapshot.insert(raw.into_torrent(id, &query.aliases)?);
        }

        debug!(torrents = snapshot.len(), "Fetched torrents from Deluge");
        Ok(snapshot)
    }
}

#[async_trait]
impl DaemonMutator for DelugeClient {
    async fn remove_torrent(&self, torrent_id: &str) -> Result<(), ClientError> {
        self.call::<Value>("core.remove_torrent", json!([torrent_id, true]), ID_REMOVE)
            .await?;
        Ok(())
    }

    async fn move_torrent(&self, torrent_id: &str, path: &str) -> Result<(), ClientError> {
        self.call::<Value>("core.move_storage", json!([[torrent_id], path]), ID_MOVE)
            .await?;
        Ok(())
    }

    async fn relabel_torrent(&self, torrent_id: &str, label: &str) -> Result<(), ClientError> {
        self.call::<Value>("label.set_torrent", json!([torrent_id, label]), ID_LABEL)
            .await?;
        Ok(())
    }
}
