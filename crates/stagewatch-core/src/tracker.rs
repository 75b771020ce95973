//! Staged progress tracking.
//!
//! A tracker owns a header line and an ordered list of stages, one per
//! condition of interest. The poller drives stage transitions through the
//! [`StageTracker`] trait; how (or whether) they are shown is up to the
//! implementation.

use serde::Serialize;
use stagewatch_error::Error;
use strum_macros::{Display, IntoStaticStr};

/// Lifecycle of a stage: `Waiting -> Running -> Complete | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Display, IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StageState {
    #[default]
    Waiting,
    Running,
    Complete,
    Failed,
}

/// A unit of user-visible progress, keyed by the condition it follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub key: String,
    pub header: String,
}

impl Stage {
    pub fn new(key: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            header: header.into(),
        }
    }
}

pub trait StageTracker {
    /// Current state of the stage keyed by `key`, `None` if not tracked.
    fn state(&self, key: &str) -> Option<StageState>;

    /// Keys of every tracked stage, in display order.
    fn stage_keys(&self) -> Vec<String>;

    fn start_stage(&mut self, key: &str);

    fn update_stage(&mut self, key: &str, message: &str);

    fn complete_stage(&mut self, key: &str, message: Option<&str>);

    fn fail_stage(&mut self, key: &str, error: &Error, message: &str);

    /// Advance any progress indicator.
    fn tick(&mut self);

    fn update_header_message(&mut self, message: &str);

    fn has_stage(&self, key: &str) -> bool {
        self.state(key).is_some()
    }

    fn is_waiting(&self, key: &str) -> bool {
        self.state(key) == Some(StageState::Waiting)
    }

    fn is_running(&self, key: &str) -> bool {
        self.state(key) == Some(StageState::Running)
    }

    fn is_complete(&self, key: &str) -> bool {
        self.state(key) == Some(StageState::Complete)
    }

    fn is_failed(&self, key: &str) -> bool {
        self.state(key) == Some(StageState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageEntry {
    pub stage: Stage,
    pub state: StageState,
    pub message: String,
}

/// In-memory stage state machine shared by every tracker.
///
/// Illegal transitions are ignored (with a warning) and reported as `false`.
#[derive(Debug, Clone, Default)]
pub struct StageBook {
    header: String,
    entries: Vec<StageEntry>,
    ticks: u64,
}

impl StageBook {
    pub fn new(header: impl Into<String>, stages: impl IntoIterator<Item = Stage>) -> Self {
        let mut entries: Vec<StageEntry> = Vec::new();
        for stage in stages {
            if entries.iter().any(|e| e.stage.key == stage.key) {
                tracing::warn!(stage = %stage.key, "duplicate stage key ignored");
                continue;
            }
            entries.push(StageEntry {
                stage,
                state: StageState::Waiting,
                message: String::new(),
            });
        }
        Self {
            header: header.into(),
            entries,
            ticks: 0,
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn entries(&self) -> &[StageEntry] {
        &self.entries
    }

    pub fn entry(&self, key: &str) -> Option<&StageEntry> {
        self.entries.iter().find(|e| e.stage.key == key)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn entry_mut(&mut self, key: &str) -> Option<&mut StageEntry> {
        let found = self.entries.iter_mut().find(|e| e.stage.key == key);
        if found.is_none() {
            tracing::warn!(stage = %key, "transition on untracked stage");
        }
        found
    }

    fn transition(&mut self, key: &str, from: &[StageState], to: StageState) -> bool {
        let Some(entry) = self.entry_mut(key) else {
            return false;
        };
        if !from.contains(&entry.state) {
            tracing::warn!(stage = %key, from = %entry.state, to = %to, "illegal stage transition ignored");
            return false;
        }
        tracing::debug!(stage = %key, from = %entry.state, to = %to, "stage transition");
        entry.state = to;
        true
    }

    pub fn start(&mut self, key: &str) -> bool {
        self.transition(key, &[StageState::Waiting], StageState::Running)
    }

    pub fn update(&mut self, key: &str, message: &str) -> bool {
        match self.entry_mut(key) {
            Some(entry) if entry.message != message => {
                entry.message = message.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn complete(&mut self, key: &str, message: Option<&str>) -> bool {
        if !self.transition(key, &[StageState::Running], StageState::Complete) {
            return false;
        }
        if let Some(message) = message {
            self.update(key, message);
        }
        true
    }

    pub fn fail(&mut self, key: &str, message: &str) -> bool {
        if !self.transition(
            key,
            &[StageState::Waiting, StageState::Running],
            StageState::Failed,
        ) {
            return false;
        }
        self.update(key, message);
        true
    }

    pub fn set_header(&mut self, message: &str) -> bool {
        if self.header == message {
            return false;
        }
        self.header = message.to_string();
        true
    }

    pub fn advance(&mut self) -> u64 {
        self.ticks += 1;
        self.ticks
    }
}

impl StageTracker for StageBook {
    fn state(&self, key: &str) -> Option<StageState> {
        self.entry(key).map(|e| e.state)
    }

    fn stage_keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.stage.key.clone()).collect()
    }

    fn start_stage(&mut self, key: &str) {
        self.start(key);
    }

    fn update_stage(&mut self, key: &str, message: &str) {
        self.update(key, message);
    }

    fn complete_stage(&mut self, key: &str, message: Option<&str>) {
        self.complete(key, message);
    }

    fn fail_stage(&mut self, key: &str, _error: &Error, message: &str) {
        self.fail(key, message);
    }

    fn tick(&mut self) {
        self.advance();
    }

    fn update_header_message(&mut self, message: &str) {
        self.set_header(message);
    }
}

/// Something observable that happened to a tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    Header(String),
    Started(String),
    Updated(String, String),
    Completed(String),
    Failed(String, String),
    Tick,
}

/// A tracker that keeps an ordered log of every effective transition.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracker {
    book: StageBook,
    events: Vec<TrackerEvent>,
}

impl RecordingTracker {
    pub fn new(header: impl Into<String>, stages: impl IntoIterator<Item = Stage>) -> Self {
        Self {
            book: StageBook::new(header, stages),
            events: Vec::new(),
        }
    }

    pub fn book(&self) -> &StageBook {
        &self.book
    }

    pub fn events(&self) -> &[TrackerEvent] {
        &self.events
    }

    /// Drain the log, leaving stage state untouched.
    pub fn take_events(&mut self) -> Vec<TrackerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Events that changed stage state, ignoring ticks, header and message updates.
    pub fn transitions(&self) -> Vec<TrackerEvent> {
        self.events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    TrackerEvent::Started(_) | TrackerEvent::Completed(_) | TrackerEvent::Failed(..)
                )
            })
            .cloned()
            .collect()
    }
}

impl StageTracker for RecordingTracker {
    fn state(&self, key: &str) -> Option<StageState> {
        self.book.state(key)
    }

    fn stage_keys(&self) -> Vec<String> {
        self.book.stage_keys()
    }

    fn start_stage(&mut self, key: &str) {
        if self.book.start(key) {
            self.events.push(TrackerEvent::Started(key.to_string()));
        }
    }

    fn update_stage(&mut self, key: &str, message: &str) {
        if self.book.update(key, message) {
            self.events
                .push(TrackerEvent::Updated(key.to_string(), message.to_string()));
        }
    }

    fn complete_stage(&mut self, key: &str, message: Option<&str>) {
        if self.book.complete(key, message) {
            self.events.push(TrackerEvent::Completed(key.to_string()));
        }
    }

    fn fail_stage(&mut self, key: &str, _error: &Error, message: &str) {
        if self.book.fail(key, message) {
            self.events
                .push(TrackerEvent::Failed(key.to_string(), message.to_string()));
        }
    }

    fn tick(&mut self) {
        self.book.advance();
        self.events.push(TrackerEvent::Tick);
    }

    fn update_header_message(&mut self, message: &str) {
        if self.book.set_header(message) {
            self.events.push(TrackerEvent::Header(message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> StageBook {
        StageBook::new(
            "Deploying...",
            [Stage::new("A", "Stage A..."), Stage::new("B", "Stage B...")],
        )
    }

    #[test]
    fn legal_lifecycle() {
        let mut book = book();
        assert!(book.is_waiting("A"));
        assert!(book.start("A"));
        assert!(book.is_running("A"));
        assert!(book.complete("A", Some("done")));
        assert!(book.is_complete("A"));
        assert_eq!(book.entry("A").unwrap().message, "done");
    }

    #[test]
    fn illegal_transitions_are_ignored() {
        let mut book = book();
        // complete before start
        assert!(!book.complete("A", None));
        assert!(book.is_waiting("A"));

        assert!(book.start("A"));
        assert!(!book.start("A"));
        assert!(book.complete("A", None));
        assert!(!book.complete("A", None));
        assert!(!book.fail("A", "late failure"));
        assert!(book.is_complete("A"));

        assert!(!book.start("missing"));
        assert!(!book.has_stage("missing"));
    }

    #[test]
    fn fail_from_waiting_or_running() {
        let mut book = book();
        assert!(book.fail("A", "boom"));
        assert!(book.is_failed("A"));
        assert!(!book.start("A"));

        assert!(book.start("B"));
        assert!(book.fail("B", "bang"));
        assert_eq!(book.entry("B").unwrap().message, "bang");
    }

    #[test]
    fn duplicate_keys_keep_first() {
        let book = StageBook::new(
            "",
            [Stage::new("A", "first"), Stage::new("A", "second")],
        );
        assert_eq!(book.entries().len(), 1);
        assert_eq!(book.entries()[0].stage.header, "first");
    }

    #[test]
    fn recording_tracker_logs_effective_changes_only() {
        let mut tracker = RecordingTracker::new("", [Stage::new("A", "Stage A...")]);
        tracker.start_stage("A");
        tracker.start_stage("A");
        tracker.update_stage("A", "working");
        tracker.update_stage("A", "working");
        tracker.update_header_message("Deploying");
        tracker.update_header_message("Deploying");
        tracker.complete_stage("A", None);
        tracker.tick();

        assert_eq!(
            tracker.events(),
            &[
                TrackerEvent::Started("A".into()),
                TrackerEvent::Updated("A".into(), "working".into()),
                TrackerEvent::Header("Deploying".into()),
                TrackerEvent::Completed("A".into()),
                TrackerEvent::Tick,
            ]
        );
        assert_eq!(tracker.book().ticks(), 1);
    }
}
