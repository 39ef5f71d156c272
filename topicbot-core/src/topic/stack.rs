use serde::{Deserialize, Serialize};

use super::TopicStatus;

/// Recency-ordered topic snapshots of one session, most recent last.
///
/// Ids are unique: pushing an id already present replaces that entry and
/// moves it to the top. The oldest entries are dropped beyond `depth`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicStack {
    entries: Vec<TopicStatus>,
}

impl TopicStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, status: TopicStatus, depth: usize) {
        self.entries.retain(|s| s.id != status.id);
        self.entries.push(status);
        let depth = depth.max(1);
        if self.entries.len() > depth {
            let excess = self.entries.len() - depth;
            self.entries.drain(..excess);
        }
    }

    /// Most recently pushed status.
    pub fn top(&self) -> Option<&TopicStatus> {
        self.entries.last()
    }

    pub fn get(&self, id: &str) -> Option<&TopicStatus> {
        self.entries.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TopicStatus> {
        self.entries.iter()
    }
}
