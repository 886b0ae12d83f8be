use crate::core::error::ClientError;
use crate::models::torrent::{Snapshot, State};
use async_trait::async_trait;
use std::collections::HashMap;

/// Filters applied when fetching a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TorrentQuery {
    pub state: Option<State>,
    /// Only torrents carrying one of these labels (all when empty)
    pub labels: Vec<String>,
    /// Torrents carrying one of these labels are dropped
    pub exclude_labels: Vec<String>,
    /// Tracker host to alias; unmapped hosts are their own alias
    pub aliases: HashMap<String, String>,
}

/// Read side of the daemon.
#[async_trait]
pub trait TorrentSource: Send + Sync {
    async fn fetch_torrents(&self, query: &TorrentQuery) -> Result<Snapshot, ClientError>;
}

/// Write side of the daemon.
#[async_trait]
pub trait DaemonMutator: Send + Sync {
    /// Remove a torrent together with its data.
    async fn remove_torrent(&self, torrent_id: &str) -> Result<(), ClientError>;

    async fn move_torrent(&self, torrent_id: &str, path: &str) -> Result<(), ClientError>;

    async fn relabel_torrent(&self, torrent_id: &str, label: &str) -> Result<(), ClientError>;
}
