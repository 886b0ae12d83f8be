use crate::core::error::ParseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Torrent state as reported by the Deluge daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    Allocating,
    Checking,
    Downloading,
    Error,
    Moving,
    Paused,
    Queued,
    Seeding,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Allocating => "Allocating",
            State::Checking => "Checking",
            State::Downloading => "Downloading",
            State::Error => "Error",
            State::Moving => "Moving",
            State::Paused => "Paused",
            State::Queued => "Queued",
            State::Seeding => "Seeding",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for State {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s.to_ascii_lowercase().as_str() {
            "allocating" => State::Allocating,
            "checking" => State::Checking,
            "downloading" => State::Downloading,
            "error" => State::Error,
            "moving" => State::Moving,
            "paused" => State::Paused,
            "queued" => State::Queued,
            "seeding" => State::Seeding,
            _ => return Err(ParseError::UnknownState(s.to_string())),
        };
        Ok(state)
    }
}

/// Read-only view of one torrent at snapshot time.
#[derive(Clone, Debug, PartialEq)]
pub struct Torrent {
    /// Info hash, used by Deluge as the torrent id
    pub id: String,
    pub name: String,
    pub state: State,
    pub label: String,
    /// Tracker host as reported by Deluge
    pub tracker_host: String,
    /// Tracker host after alias remapping; the key for rule lookup
    pub tracker_alias: String,
    pub time_added: DateTime<Utc>,
    pub seeding_time: Duration,
    pub download_location: PathBuf,
    /// Percent complete (0-100)
    pub progress: f64,
    pub total_done: u64,
    pub total_wanted: u64,
}

impl fmt::Display for Torrent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {} - {}",
            self.name, self.state, self.label, self.tracker_alias
        )
    }
}

/// Torrents fetched in one pass, in daemon order. Ids are unique.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    torrents: Vec<Torrent>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a torrent. A torrent with an id already present replaces the
    /// earlier entry in place.
    pub fn insert(&mut self, torrent: Torrent) {
        match self.index.get(&torrent.id) {
            Some(&position) => self.torrents[position] = torrent,
            None => {
                self.index.insert(torrent.id.clone(), self.torrents.len());
                self.torrents.push(torrent);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Torrent> {
        self.index.get(id).map(|&position| &self.torrents[position])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Torrent> {
        self.torrents.iter()
    }

    pub fn len(&self) -> usize {
        self.torrents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.torrents.is_empty()
    }
}

impl FromIterator<Torrent> for Snapshot {
    fn from_iter<I: IntoIterator<Item = Torrent>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for torrent in iter {
            snapshot.insert(torrent);
        }
        snapshot
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Torrent;
    type IntoIter = std::slice::Iter<'a, Torrent>;

    fn into_iter(self) -> Self::IntoIter {
        self.torrents.iter()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::torrent;
    use super::*;

    #[test]
    fn test_state_from_str_is_case_insensitive() {
        assert_eq!("seeding".parse::<State>().unwrap(), State::Seeding);
        assert_eq!("Paused".parse::<State>().unwrap(), State::Paused);
        assert!("stalled".parse::<State>().is_err());
    }

    #[test]
    fn test_torrent_display() {
        let t = torrent("a", "landof.tv", 0, 0);
        assert_eq!(t.to_string(), "torrent-a - Seeding - seeding - landof.tv");
    }

    #[test]
    fn test_snapshot_keeps_order_and_unique_ids() {
        let snapshot: Snapshot = vec![
            torrent("b", "x", 1, 1),
            torrent("a", "x", 2, 2),
            torrent("b", "y", 3, 3),
        ]
        .into_iter()
        .collect();

        assert_eq!(snapshot.len(), 2);
        let ids: Vec<&str> = snapshot.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(snapshot.get("b").unwrap().tracker_alias, "y");
        assert!(snapshot.get("c").is_none());
    }
}
