//! Debounced editing of the active note.
//!
//! Each edit pushes a single commit deadline `quiet_period` into the
//! future. When the deadline passes and the drafts differ from the stored
//! note, they are written through [`NoteStore::update`] against the id the
//! editor was opened on. The status shows `saving` for `feedback_delay`
//! and then settles on `synced`, or `offline` if the write did not reach
//! storage. Status never blocks further edits.
//!
//! The editor does not own a timer task. An event loop asks for
//! [`AutosaveEditor::next_deadline`], sleeps until then and calls
//! [`AutosaveEditor::poll`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::model::{self, Note, NotePatch};
use crate::storage::Storage;
use crate::store::{NoteStore, Persistence};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(2);
pub const DEFAULT_FEEDBACK_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    Synced,
    Saving,
    Offline,
}

/// What happens to unsaved drafts when another note becomes active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPolicy {
    #[default]
    Flush,
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutosaveTiming {
    pub quiet_period: Duration,
    pub feedback_delay: Duration,
}

impl Default for AutosaveTiming {
    fn default() -> Self {
        AutosaveTiming {
            quiet_period: DEFAULT_QUIET_PERIOD,
            feedback_delay: DEFAULT_FEEDBACK_DELAY,
        }
    }
}

/// A draft that was written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub note_id: String,
    pub title: String,
    pub content: String,
    pub persistence: Persistence,
}

#[derive(Debug, Clone)]
pub struct AutosaveEditor {
    note_id: String,
    title: String,
    content: String,
    status: SaveStatus,
    timing: AutosaveTiming,
    save_at: Option<Instant>,
    settle: Option<(Instant, SaveStatus)>,
}

impl AutosaveEditor {
    pub fn open(note: &Note, timing: AutosaveTiming) -> Self {
        trace!("opening editor on note {}", note.id);
        AutosaveEditor {
            note_id: note.id.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
            status: SaveStatus::Synced,
            timing,
            save_at: None,
            settle: None,
        }
    }

    pub fn note_id(&self) -> &str {
        &self.note_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn status(&self) -> SaveStatus {
        self.status
    }

    pub fn word_count(&self) -> usize {
        model::word_count(&self.content)
    }

    pub fn has_pending_save(&self) -> bool {
        self.save_at.is_some()
    }

    pub fn set_title(&mut self, title: String, now: Instant) {
        self.title = title;
        self.reschedule(now);
    }

    pub fn set_content(&mut self, content: String, now: Instant) {
        self.content = content;
        self.reschedule(now);
    }

    fn reschedule(&mut self, now: Instant) {
        self.save_at = Some(now + self.timing.quiet_period);
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let settle_at = self.settle.map(|(at, _)| at);
        match (self.save_at, settle_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fires whichever timers have expired by `now`.
    pub fn poll<S: Storage>(&mut self, now: Instant, store: &mut NoteStore<S>) -> Option<Commit> {
        if let Some((at, settled)) = self.settle {
            if at <= now {
                self.settle = None;
                self.status = settled;
            }
        }
        match self.save_at {
            Some(at) if at <= now => {
                self.save_at = None;
                self.commit(now, store)
            }
            _ => None,
        }
    }

    /// Commits pending drafts immediately, cancelling the quiet period.
    pub fn flush<S: Storage>(&mut self, now: Instant, store: &mut NoteStore<S>) -> Option<Commit> {
        self.save_at = None;
        self.commit(now, store)
    }

    /// Tears the editor down before another note takes its place.
    pub fn close<S: Storage>(
        mut self,
        policy: SwitchPolicy,
        now: Instant,
        store: &mut NoteStore<S>,
    ) -> Option<Commit> {
        match policy {
            SwitchPolicy::Flush => self.flush(now, store),
            SwitchPolicy::Discard => {
                if self.has_pending_save() {
                    debug!("discarding unsaved edits to note {}", self.note_id);
                }
                None
            }
        }
    }

    /// Replaces the drafts after the note changed underneath the editor.
    /// Any pending save is cancelled.
    pub fn reload(&mut self, note: &Note) {
        if note.id != self.note_id {
            *self = AutosaveEditor::open(note, self.timing);
            return;
        }
        self.title = note.title.clone();
        self.content = note.content.clone();
        self.save_at = None;
    }

    fn commit<S: Storage>(&mut self, now: Instant, store: &mut NoteStore<S>) -> Option<Commit> {
        let Some(note) = store.note(&self.note_id) else {
            debug!("note {} is gone, dropping its drafts", self.note_id);
            return None;
        };
        if note.title == self.title && note.content == self.content {
            return None;
        }
        let persistence = store.update(
            &self.note_id,
            NotePatch::text(self.title.clone(), self.content.clone()),
        )?;
        debug!("autosaved note {} ({persistence:?})", self.note_id);
        self.status = SaveStatus::Saving;
        let settled = if persistence.is_durable() {
            SaveStatus::Synced
        } else {
            SaveStatus::Offline
        };
        self.settle = Some((now + self.timing.feedback_delay, settled));
        Some(Commit {
            note_id: self.note_id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            persistence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    const SEC: Duration = Duration::from_secs(1);

    fn setup() -> (NoteStore<MemoryStorage>, AutosaveEditor, Instant) {
        let mut store = NoteStore::new(MemoryStorage::new());
        store.load(Some("u1"));
        let editor = AutosaveEditor::open(store.active().unwrap(), AutosaveTiming::default());
        (store, editor, Instant::now())
    }

    #[test]
    fn burst_of_edits_commits_once_with_final_values() {
        let (mut store, mut editor, t0) = setup();
        let mut commits = Vec::new();

        editor.set_content("draft one".into(), t0);
        commits.extend(editor.poll(t0 + SEC, &mut store));
        editor.set_content("draft two".into(), t0 + SEC);
        for step in 2..=6 {
            commits.extend(editor.poll(t0 + SEC * step, &mut store));
        }

        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].content, "draft two");
        assert_eq!(store.note("note-1").unwrap().content, "draft two");
    }

    #[test]
    fn commit_lands_exactly_one_quiet_period_after_last_edit() {
        let (mut store, mut editor, t0) = setup();
        editor.set_title("a".into(), t0);
        editor.set_title("ab".into(), t0 + SEC);
        assert_eq!(editor.next_deadline(), Some(t0 + SEC * 3));
        assert!(editor
            .poll(t0 + SEC * 3 - Duration::from_millis(1), &mut store)
            .is_none());
        let commit = editor.poll(t0 + SEC * 3, &mut store).unwrap();
        assert_eq!(commit.title, "ab");
        assert_eq!(commit.persistence, Persistence::Durable);
    }

    #[test]
    fn status_goes_saving_then_synced() {
        let (mut store, mut editor, t0) = setup();
        assert_eq!(editor.status(), SaveStatus::Synced);
        editor.set_content("x".into(), t0);
        editor.poll(t0 + SEC * 2, &mut store).unwrap();
        assert_eq!(editor.status(), SaveStatus::Saving);
        assert_eq!(editor.next_deadline(), Some(t0 + SEC * 3));

        // Typing while saving is still accepted.
        editor.set_content("xy".into(), t0 + SEC * 2);
        editor.poll(t0 + SEC * 3, &mut store);
        assert_eq!(editor.status(), SaveStatus::Synced);
        editor.poll(t0 + SEC * 4, &mut store).unwrap();
        assert_eq!(store.note("note-1").unwrap().content, "xy");
    }

    #[test]
    fn non_durable_write_settles_offline() {
        let (mut store, mut editor, t0) = setup();
        store.load(None);
        let id = store.create();
        let mut editor2 =
            AutosaveEditor::open(store.note(&id).unwrap(), AutosaveTiming::default());
        editor2.set_content("volatile".into(), t0);
        let commit = editor2.poll(t0 + SEC * 2, &mut store).unwrap();
        assert_eq!(commit.persistence, Persistence::Volatile);
        editor2.poll(t0 + SEC * 3, &mut store);
        assert_eq!(editor2.status(), SaveStatus::Offline);

        // The first editor's note no longer exists after the reload.
        editor.set_content("lost".into(), t0);
        assert!(editor.poll(t0 + SEC * 2, &mut store).is_none());
    }

    #[test]
    fn unchanged_drafts_do_not_commit() {
        let (mut store, mut editor, t0) = setup();
        let before = store.note("note-1").unwrap().clone();
        editor.set_title(before.title.clone(), t0);
        assert!(editor.poll(t0 + SEC * 2, &mut store).is_none());
        assert_eq!(store.note("note-1").unwrap(), &before);
        assert_eq!(editor.status(), SaveStatus::Synced);
    }

    #[test]
    fn close_flushes_or_discards_per_policy() {
        let (mut store, mut editor, t0) = setup();
        editor.set_content("kept".into(), t0);
        let commit = editor.close(SwitchPolicy::Flush, t0, &mut store).unwrap();
        assert_eq!(commit.content, "kept");
        assert_eq!(store.note("note-1").unwrap().content, "kept");

        let mut editor =
            AutosaveEditor::open(store.note("note-1").unwrap(), AutosaveTiming::default());
        editor.set_content("dropped".into(), t0);
        assert!(editor.close(SwitchPolicy::Discard, t0, &mut store).is_none());
        assert_eq!(store.note("note-1").unwrap().content, "kept");
    }

    #[test]
    fn word_count_follows_drafts_not_stored_note() {
        let (store, mut editor, t0) = setup();
        assert_eq!(editor.word_count(), store.note("note-1").unwrap().word_count());
        editor.set_content("  three short\nwords ".into(), t0);
        assert_eq!(editor.word_count(), 3);
        assert_ne!(store.note("note-1").unwrap().word_count(), 3);
    }

    #[test]
    fn reload_cancels_pending_save() {
        let (mut store, mut editor, t0) = setup();
        editor.set_content("typing".into(), t0);
        store.update("note-1", NotePatch::content("from elsewhere"));
        editor.reload(store.note("note-1").unwrap());
        assert!(!editor.has_pending_save());
        assert_eq!(editor.content(), "from elsewhere");
        assert!(editor.poll(t0 + SEC * 5, &mut store).is_none());
    }
}
