//! Snapshot-based undo and redo.
//!
//! Entries are whole HTML snapshots taken just before each edit. The cursor
//! points one past the entry the next `undo` returns; redoing past the newest
//! entry yields the input recorded by the last commit.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HistoryConfigError {
    #[error("History size must be greater than zero when history is enabled, got {0}")]
    InvalidSize(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: 10,
        }
    }
}

/// Everything needed to rebuild a [`History`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryState {
    pub entries: Vec<String>,
    pub cursor: usize,
    pub input_last: String,
}

#[derive(Debug, Clone)]
pub struct History {
    config: HistoryConfig,
    entries: Vec<String>,
    cursor: usize,
    input_last: String,
    pending: Option<String>,
}

impl History {
    pub fn new(config: HistoryConfig) -> Result<Self, HistoryConfigError> {
        if config.enabled && config.max_depth == 0 {
            return Err(HistoryConfigError::InvalidSize(config.max_depth));
        }
        Ok(Self {
            config,
            entries: Vec::new(),
            cursor: 0,
            input_last: String::new(),
            pending: None,
        })
    }

    pub fn config(&self) -> HistoryConfig {
        self.config
    }

    /// Remembers the document as it was before an edit.
    pub fn snapshot_before(&mut self, html: &str) {
        if self.config.enabled {
            self.pending = Some(html.to_string());
        }
    }

    /// Records the pending snapshot if the edit changed the document.
    /// Returns true if an entry was added.
    pub fn commit(&mut self, after: &str) -> bool {
        let Some(before) = self.pending.take() else {
            return false;
        };
        if before == after {
            return false;
        }

        self.entries.truncate(self.cursor);
        self.entries.push(before);
        let overflow = self.entries.len().saturating_sub(self.config.max_depth);
        if overflow > 0 {
            log::debug!("evicting {overflow} oldest history entries");
            self.entries.drain(..overflow);
        }
        self.cursor = self.entries.len();
        self.input_last = after.to_string();
        true
    }

    pub fn undo(&mut self) -> Option<String> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor).cloned()
    }

    pub fn redo(&mut self) -> Option<String> {
        if !self.can_redo() {
            return None;
        }
        if self.cursor + 1 >= self.entries.len() {
            self.cursor = self.entries.len();
            return Some(self.input_last.clone());
        }
        self.cursor += 1;
        self.entries.get(self.cursor).cloned()
    }

    pub fn can_undo(&self) -> bool {
        self.config.enabled && self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.config.enabled && self.cursor < self.entries.len()
    }

    /// Drops every entry, e.g. after loading a new document.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.input_last.clear();
        self.pending = None;
    }

    pub fn state(&self) -> HistoryState {
        HistoryState {
            entries: self.entries.clone(),
            cursor: self.cursor,
            input_last: self.input_last.clone(),
        }
    }

    /// Restores saved entries, keeping the newest ones that fit and clamping
    /// the cursor.
    pub fn restore(&mut self, state: HistoryState) {
        let HistoryState {
            mut entries,
            cursor,
            input_last,
        } = state;
        if !self.config.enabled {
            self.clear();
            return;
        }
        let overflow = entries.len().saturating_sub(self.config.max_depth);
        entries.drain(..overflow);
        self.cursor = cursor.saturating_sub(overflow).min(entries.len());
        self.entries = entries;
        self.input_last = input_last;
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn history(max_depth: usize) -> History {
        History::new(HistoryConfig {
            enabled: true,
            max_depth,
        })
        .unwrap()
    }

    fn edit(history: &mut History, before: &str, after: &str) {
        history.snapshot_before(before);
        history.commit(after);
    }

    #[test]
    fn zero_size_is_rejected_only_when_enabled() {
        let enabled = History::new(HistoryConfig {
            enabled: true,
            max_depth: 0,
        });
        assert_eq!(enabled.unwrap_err(), HistoryConfigError::InvalidSize(0));
        assert!(
            History::new(HistoryConfig {
                enabled: false,
                max_depth: 0
            })
            .is_ok()
        );
    }

    #[test]
    fn undo_then_redo_walks_the_snapshots() {
        let mut h = history(10);
        edit(&mut h, "a", "ab");
        edit(&mut h, "ab", "abc");
        assert_eq!(h.undo().as_deref(), Some("ab"));
        assert_eq!(h.undo().as_deref(), Some("a"));
        assert_eq!(h.undo(), None);
        assert_eq!(h.redo().as_deref(), Some("ab"));
        assert_eq!(h.redo().as_deref(), Some("abc"));
        assert_eq!(h.redo(), None);
    }

    #[test]
    fn oldest_entries_are_evicted() {
        let mut h = history(2);
        edit(&mut h, "0", "1");
        edit(&mut h, "1", "2");
        edit(&mut h, "2", "3");
        assert_eq!(h.undo().as_deref(), Some("2"));
        assert_eq!(h.undo().as_deref(), Some("1"));
        assert_eq!(h.undo(), None);
    }

    #[test]
    fn new_edit_discards_redo_branch() {
        let mut h = history(10);
        edit(&mut h, "a", "b");
        edit(&mut h, "b", "c");
        h.undo();
        edit(&mut h, "b", "x");
        assert_eq!(h.state().entries, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(h.redo(), None);
        assert_eq!(h.undo().as_deref(), Some("b"));
    }

    #[test]
    fn unchanged_edits_are_not_recorded() {
        let mut h = history(10);
        h.snapshot_before("same");
        assert!(!h.commit("same"));
        assert!(!h.can_undo());
        assert!(!h.commit("other"));
    }

    #[test]
    fn disabled_history_records_nothing() {
        let mut h = History::new(HistoryConfig {
            enabled: false,
            max_depth: 0,
        })
        .unwrap();
        edit(&mut h, "a", "b");
        assert_eq!(h.undo(), None);
        assert_eq!(h.state(), HistoryState::default());
    }

    #[test]
    fn state_round_trips_through_toml() {
        let mut h = history(3);
        edit(&mut h, "<b>a</b>", "<b>ab</b>");
        h.undo();
        let saved = toml::to_string(&h.state()).unwrap();
        let mut restored = history(3);
        restored.restore(toml::from_str(&saved).unwrap());
        assert_eq!(restored.state(), h.state());
        assert_eq!(restored.redo().as_deref(), Some("<b>ab</b>"));
    }

    #[test]
    fn restore_trims_to_the_configured_size() {
        let mut h = history(2);
        h.restore(HistoryState {
            entries: vec!["a".into(), "b".into(), "c".into()],
            cursor: 3,
            input_last: "d".into(),
        });
        assert_eq!(h.state().entries, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(h.state().cursor, 2);
    }
}
