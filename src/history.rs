//! Version history of the generated site.
//!
//! [`History`] is a linear list of complete documents with a cursor. New
//! versions always land at the tail; committing while the cursor sits
//! behind the tail drops the redo entries first. Restoring an old version
//! does not move the cursor back: it appends a copy of the old code as a
//! new tip, so nothing already committed is ever rewritten.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub code: String,
    pub timestamp: DateTime<Local>,
    /// The edit instruction that produced this version; `None` for the
    /// initial build and for restores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

impl HistoryEntry {
    pub fn new(code: String, instruction: Option<String>) -> Self {
        Self {
            code,
            timestamp: Local::now(),
            instruction,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
    index: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the redo tail, append `code` and move the cursor onto it.
    pub fn commit(&mut self, code: impl Into<String>, instruction: Option<String>) -> usize {
        if let Some(index) = self.index {
            self.entries.truncate(index + 1);
        }
        self.entries.push(HistoryEntry::new(code.into(), instruction));
        let tip = self.entries.len() - 1;
        self.index = Some(tip);
        tip
    }

    pub fn undo(&mut self) -> Option<&str> {
        match self.index {
            Some(index) if index > 0 => {
                self.index = Some(index - 1);
                self.current()
            }
            _ => None,
        }
    }

    pub fn redo(&mut self) -> Option<&str> {
        match self.index {
            Some(index) if index + 1 < self.entries.len() => {
                self.index = Some(index + 1);
                self.current()
            }
            _ => None,
        }
    }

    /// Branch from the cursor with a copy of an earlier version.
    pub fn restore_branch(&mut self, code: impl Into<String>) -> usize {
        self.commit(code, None)
    }

    pub fn current(&self) -> Option<&str> {
        self.current_entry().map(|e| e.code.as_str())
    }

    pub fn current_entry(&self) -> Option<&HistoryEntry> {
        self.index.and_then(|i| self.entries.get(i))
    }

    pub fn entry(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.index, Some(i) if i > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.index, Some(i) if i + 1 < self.entries.len())
    }
}

/// A past edit instruction, kept for display and reuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRecord {
    pub prompt: String,
    pub timestamp: DateTime<Local>,
    pub code: String,
}

/// Append-only log of edits. Unlike [`History`] it is never truncated.
#[derive(Debug, Clone, Default)]
pub struct EditLog {
    records: Vec<EditRecord>,
}

impl EditLog {
    pub fn record(&mut self, prompt: impl Into<String>, code: impl Into<String>) {
        self.records.push(EditRecord {
            prompt: prompt.into(),
            timestamp: Local::now(),
            code: code.into(),
        });
    }

    pub fn records(&self) -> &[EditRecord] {
        &self.records
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn codes(history: &History) -> Vec<&str> {
        history.entries().iter().map(|e| e.code.as_str()).collect()
    }

    #[test]
    fn empty_history_has_no_cursor() {
        let mut history = History::new();
        assert_eq!(history.index(), None);
        assert_eq!(history.current(), None);
        assert_eq!(history.undo(), None);
        assert_eq!(history.redo(), None);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn commit_after_undo_discards_redo_tail() {
        let mut history = History::new();
        history.commit("A", None);
        history.commit("B", Some("b".into()));
        history.commit("C", Some("c".into()));
        assert_eq!(history.undo(), Some("B"));
        assert_eq!(history.undo(), Some("A"));

        history.commit("D", Some("d".into()));
        assert_eq!(codes(&history), vec!["A", "D"]);
        assert_eq!(history.index(), Some(1));
        assert_eq!(history.redo(), None);
        assert_eq!(history.current(), Some("D"));
    }

    #[test]
    fn undo_at_start_and_redo_at_tail_are_noops() {
        let mut history = History::new();
        history.commit("A", None);
        history.commit("B", None);

        assert_eq!(history.redo(), None);
        assert_eq!(history.index(), Some(1));

        history.undo();
        assert_eq!(history.undo(), None);
        assert_eq!(history.index(), Some(0));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn restore_branches_instead_of_rewinding() {
        let mut history = History::new();
        history.commit("A", None);
        history.commit("B", None);
        history.commit("C", None);
        history.undo();

        let a = history.entry(0).unwrap().code.clone();
        let tip = history.restore_branch(a);

        assert_eq!(tip, 2);
        assert_eq!(codes(&history), vec!["A", "B", "A"]);
        assert_eq!(history.index(), Some(2));
        assert_eq!(history.current_entry().unwrap().instruction, None);
        assert!(!history.can_redo());
    }

    #[test]
    fn edit_log_is_never_truncated() {
        let mut log = EditLog::default();
        log.record("make it blue", "<p>blue</p>");
        log.record("add footer", "<p>footer</p>");
        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[0].prompt, "make it blue");
    }
}
