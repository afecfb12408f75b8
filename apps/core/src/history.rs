use crate::document_store::{DocumentStore, StoreError};
use serde::{Deserialize, Serialize};

pub const PLUGIN_HISTORY_ID: &str = "plugin-history";
pub const DEFAULT_HISTORY_LIMIT: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Label of the command that opened the plugin.
    pub name: String,
    /// Installed plugin the command belongs to.
    pub origin_name: String,
    pub icon: Option<String>,
    pub description: String,
    pub feature_code: Option<String>,
    pub pin: bool,
}

impl HistoryEntry {
    pub fn new(name: &str, origin_name: &str) -> Self {
        Self {
            name: name.to_string(),
            origin_name: origin_name.to_string(),
            ..Default::default()
        }
    }
}

/// Recently opened plugins, pinned entries first.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginHistory {
    entries: Vec<HistoryEntry>,
    limit: usize,
}

impl PluginHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit: limit.max(1),
        }
    }

    pub fn load(store: &dyn DocumentStore, limit: usize) -> Result<Self, StoreError> {
        let mut history = Self::new(limit);
        if let Some(document) = store.get(PLUGIN_HISTORY_ID)? {
            let entries: Vec<HistoryEntry> = serde_json::from_value(document.data)?;
            history.set(entries);
        }
        Ok(history)
    }

    pub fn save(&self, store: &dyn DocumentStore) -> Result<(), StoreError> {
        store.put(PLUGIN_HISTORY_ID, &serde_json::to_value(&self.entries)?)?;
        Ok(())
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Moves `entry` to the front of its group. A pinned record keeps its
    /// stored form; the oldest unpinned entry is dropped past the limit.
    pub fn record(&mut self, entry: HistoryEntry) {
        let (mut pinned, mut unpinned): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|existing| existing.pin);

        if let Some(position) = pinned.iter().position(|p| p.name == entry.name) {
            let stored = pinned.remove(position);
            pinned.insert(0, stored);
        } else {
            unpinned.retain(|existing| existing.name != entry.name);
            unpinned.insert(0, HistoryEntry { pin: false, ..entry });
        }

        while pinned.len() + unpinned.len() > self.limit && !unpinned.is_empty() {
            unpinned.pop();
        }
        pinned.extend(unpinned);
        self.entries = pinned;
    }

    /// Replaces the list, keeping pinned entries ahead of the rest.
    pub fn set(&mut self, entries: Vec<HistoryEntry>) {
        let (mut pinned, unpinned): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(|entry| entry.pin);
        pinned.extend(unpinned);
        self.entries = pinned;
    }

    pub fn set_pinned(&mut self, name: &str, pin: bool) -> bool {
        let mut entries = std::mem::take(&mut self.entries);
        let found = entries
            .iter_mut()
            .find(|entry| entry.name == name)
            .map(|entry| entry.pin = pin)
            .is_some();
        self.set(entries);
        found
    }

    /// Drops entries whose plugin is no longer installed.
    pub fn prune(&mut self, installed: &[String]) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|entry| installed.iter().any(|name| *name == entry.origin_name));
        before != self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{HistoryEntry, PluginHistory};
    use crate::document_store::SqliteDocumentStore;

    fn names(history: &PluginHistory) -> Vec<&str> {
        history.entries().iter().map(|entry| entry.name.as_str()).collect()
    }

    #[test]
    fn recent_first_and_bounded() {
        let mut history = PluginHistory::new(3);
        for name in ["a", "b", "c", "d"] {
            history.record(HistoryEntry::new(name, "p"));
        }
        assert_eq!(names(&history), vec!["d", "c", "b"]);

        history.record(HistoryEntry::new("b", "p"));
        assert_eq!(names(&history), vec!["b", "d", "c"]);
    }

    #[test]
    fn pinned_entries_survive_and_lead() {
        let mut history = PluginHistory::new(2);
        history.record(HistoryEntry::new("keep", "p"));
        assert!(history.set_pinned("keep", true));
        for name in ["x", "y", "z"] {
            history.record(HistoryEntry::new(name, "p"));
        }
        assert_eq!(names(&history), vec!["keep", "z"]);

        history.record(HistoryEntry::new("keep", "p"));
        assert!(history.entries()[0].pin);
    }

    #[test]
    fn prune_and_persist() {
        let store = SqliteDocumentStore::open_memory().unwrap();
        let mut history = PluginHistory::new(8);
        history.record(HistoryEntry::new("calc", "hopper-calc"));
        history.record(HistoryEntry::new("翻译", "hopper-translate"));
        assert!(history.prune(&["hopper-calc".to_string()]));
        history.save(&store).unwrap();

        let loaded = PluginHistory::load(&store, 8).unwrap();
        assert_eq!(names(&loaded), vec!["calc"]);
    }
}
