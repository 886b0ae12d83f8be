use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Actions computed by one planning pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionPlan {
    /// Torrent id and new label, in discovery order
    pub to_relabel: Vec<(String, String)>,
    /// Torrent id and new storage path, in discovery order
    pub to_move: Vec<(String, PathBuf)>,
    /// Torrent ids to remove, latest discovered first
    pub to_remove: Vec<String>,
}

impl ActionPlan {
    pub fn is_empty(&self) -> bool {
        self.to_relabel.is_empty() && self.to_move.is_empty() && self.to_remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_relabel.len() + self.to_move.len() + self.to_remove.len()
    }

    #[cfg(test)]
    pub fn relabel_for(&self, id: &str) -> Option<&str> {
        self.to_relabel
            .iter()
            .find(|(torrent_id, _)| torrent_id == id)
            .map(|(_, label)| label.as_str())
    }

    #[cfg(test)]
    pub fn move_for(&self, id: &str) -> Option<&PathBuf> {
        self.to_move
            .iter()
            .find(|(torrent_id, _)| torrent_id == id)
            .map(|(_, path)| path)
    }

    #[cfg(test)]
    pub fn removes(&self, id: &str) -> bool {
        self.to_remove.iter().any(|torrent_id| torrent_id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Relabel,
    Move,
    Remove,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Relabel => "relabel",
            ActionKind::Move => "move",
            ActionKind::Remove => "remove",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum Outcome {
    Applied,
    /// Dry run: nothing sent to the daemon
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub kind: ActionKind,
    pub torrent_id: String,
    pub outcome: Outcome,
}

/// Per-action results of applying a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub dry_run: bool,
    pub actions: Vec<ActionOutcome>,
}

impl ExecutionReport {
    pub fn record(&mut self, kind: ActionKind, torrent_id: &str, outcome: Outcome) {
        self.actions.push(ActionOutcome {
            kind,
            torrent_id: torrent_id.to_string(),
            outcome,
        });
    }

    pub fn applied(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Applied))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Failed(_)))
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.actions.iter().filter(|a| predicate(&a.outcome)).count()
    }
}
