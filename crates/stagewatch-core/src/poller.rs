//! Dependency-ordered condition poller.
//!
//! Watches a resource's conditions and keeps a [`StageTracker`] in step with
//! them. A stage starts only after every condition it depends on has
//! completed, completes only while running, and a false sub-condition fails
//! just its own stage. The terminal condition decides the whole operation.
//!
//! The poller never sleeps; a driver such as
//! [`poll_until_done`](crate::waiter::poll_until_done) calls [`ConditionPoller::poll`]
//! repeatedly.

use std::collections::{HashSet, VecDeque};

use stagewatch_error::{Error, Result};

use crate::condition::{ConditionSet, ConditionStatus};
use crate::deps::DependencyMap;
use crate::tracker::StageTracker;
use crate::waiter::OperationPoller;

/// Header shown once the terminal condition is ready.
pub const DONE_MESSAGE: &str = "Done.";

/// Source of resource snapshots. `Ok(None)` means not observable yet.
pub trait ResourceGetter {
    fn get(&mut self) -> Result<Option<ConditionSet>>;
}

impl<F> ResourceGetter for F
where
    F: FnMut() -> Result<Option<ConditionSet>>,
{
    fn get(&mut self) -> Result<Option<ConditionSet>> {
        self()
    }
}

/// A sub-condition that resolved false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: String,
    pub message: String,
}

pub struct ConditionPoller<G, T> {
    getter: G,
    tracker: T,
    /// stage -> blockers still to complete; checked off as stages finish
    dependencies: DependencyMap,
    stages: Vec<String>,
    started: HashSet<String>,
    completed: HashSet<String>,
    failed: HashSet<String>,
    failures: Vec<StageFailure>,
    last_message: String,
}

impl<G: ResourceGetter, T: StageTracker> ConditionPoller<G, T> {
    /// Build a poller and start every stage that is not blocked.
    ///
    /// The dependency map is restricted to stages the tracker has; a cycle in
    /// what remains is a `CircularDependency` error.
    pub fn new(getter: G, tracker: T, dependencies: Option<DependencyMap>) -> Result<Self> {
        let stages = tracker.stage_keys();
        let dependencies = match dependencies {
            Some(map) => {
                let tracked: HashSet<&str> = stages.iter().map(String::as_str).collect();
                map.restrict_to(&tracked)
                    .map_err(|e| e.with_operation("poller::new"))?
            }
            None => DependencyMap::new(),
        };

        let mut poller = Self {
            getter,
            tracker,
            dependencies,
            stages,
            started: HashSet::new(),
            completed: HashSet::new(),
            failed: HashSet::new(),
            failures: Vec::new(),
            last_message: String::new(),
        };
        poller.start_unblocked();
        Ok(poller)
    }

    pub fn getter(&self) -> &G {
        &self.getter
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    pub fn into_tracker(self) -> T {
        self.tracker
    }

    pub fn stage_failures(&self) -> &[StageFailure] {
        &self.failures
    }

    pub fn remaining_dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    /// Best known descriptive message, kept for timeout reports.
    pub fn last_message(&self) -> &str {
        &self.last_message
    }

    pub fn is_started(&self, key: &str) -> bool {
        self.started.contains(key)
    }

    pub fn is_completed(&self, key: &str) -> bool {
        self.completed.contains(key)
    }

    pub fn is_failed(&self, key: &str) -> bool {
        self.failed.contains(key)
    }

    fn is_tracked(&self, key: &str) -> bool {
        self.stages.iter().any(|s| s == key)
    }

    /// Take one step.
    ///
    /// Returns `Ok(None)` while the operation is pending or the snapshot is
    /// missing or stale, `Ok(Some(snapshot))` once the terminal condition is
    /// ready, and an `OperationFailed` error once it is false.
    #[tracing::instrument(skip_all)]
    pub fn poll(&mut self) -> Result<Option<ConditionSet>> {
        let Some(conditions) = self.getter.get()? else {
            tracing::trace!("resource not observable yet");
            return Ok(None);
        };
        if !conditions.is_fresh() {
            tracing::trace!("stale snapshot ignored");
            return Ok(None);
        }

        let ready_message = conditions.descriptive_message().to_string();
        if !ready_message.is_empty() {
            self.tracker.update_header_message(&ready_message);
            self.last_message = ready_message.clone();
        }

        self.process_subconditions(&conditions, &ready_message);

        let terminal = conditions.terminal_condition().to_string();
        if conditions.is_ready() {
            self.tracker.update_header_message(DONE_MESSAGE);
            if self.is_tracked(&terminal) {
                self.possibly_complete_stage(&terminal, None);
            }
            self.tracker.tick();
            tracing::debug!(condition = %terminal, "operation ready");
            return Ok(Some(conditions));
        }

        if conditions.is_failed() {
            let error = Error::operation_failed(ready_message.as_str())
                .with_operation("poller::poll")
                .with_context("condition", terminal.as_str());
            if self.is_tracked(&terminal) {
                self.possibly_fail_stage(&terminal, &ready_message);
            }
            tracing::debug!(condition = %terminal, message = %ready_message, "operation failed");
            return Err(error);
        }

        Ok(None)
    }

    /// Walk the tracked sub-conditions of one snapshot.
    ///
    /// Stages unblocked by a completion are examined again against the same
    /// snapshot, so a chain of already-true conditions completes in one call.
    /// Every stage starts at most once, which bounds the queue.
    fn process_subconditions(&mut self, conditions: &ConditionSet, ready_message: &str) {
        let terminal = conditions.terminal_condition();
        let subconditions: Vec<String> = conditions
            .terminal_subconditions()
            .into_iter()
            .filter(|name| *name != terminal)
            .filter(|name| conditions.get(name).is_some() && self.is_tracked(name))
            .map(str::to_string)
            .collect();

        let mut queue: VecDeque<String> = subconditions.iter().cloned().collect();
        while let Some(key) = queue.pop_front() {
            for newly_started in self.process_subcondition(conditions, &key, ready_message) {
                if subconditions.contains(&newly_started) {
                    queue.push_back(newly_started);
                }
            }
        }
    }

    /// Returns the stages started as a consequence of this condition.
    fn process_subcondition(
        &mut self,
        conditions: &ConditionSet,
        key: &str,
        ready_message: &str,
    ) -> Vec<String> {
        if self.completed.contains(key) {
            return Vec::new();
        }
        let status = conditions.status(key);
        let message = conditions.message(key);

        if self.dependencies.is_blocked(key) {
            if !message.is_empty() {
                self.tracker.update_stage(key, message);
            }
            return Vec::new();
        }

        if !message.is_empty() && message != ready_message {
            self.tracker.update_stage(key, message);
        }

        match status {
            ConditionStatus::Unknown => Vec::new(),
            ConditionStatus::True => {
                let message = (!message.is_empty()).then_some(message);
                self.possibly_complete_stage(key, message)
            }
            ConditionStatus::False => {
                self.possibly_fail_stage(key, message);
                Vec::new()
            }
        }
    }

    /// Complete a running stage and start whatever it unblocked.
    ///
    /// A condition may still read true from the previous operation while its
    /// stage waits on blockers; such a stage is left alone until it runs.
    fn possibly_complete_stage(&mut self, key: &str, message: Option<&str>) -> Vec<String> {
        if self.completed.contains(key) || self.failed.contains(key) {
            return Vec::new();
        }
        if !self.started.contains(key) || !self.tracker.is_running(key) {
            tracing::trace!(stage = %key, "true before started, not completing");
            return Vec::new();
        }

        self.completed.insert(key.to_string());
        let unblocked = self.dependencies.resolve(key);
        self.tracker.complete_stage(key, message);
        tracing::debug!(stage = %key, unblocked = ?unblocked, "stage complete");
        self.start_unblocked()
    }

    fn possibly_fail_stage(&mut self, key: &str, message: &str) {
        if self.failed.contains(key) || self.completed.contains(key) {
            return;
        }
        self.failed.insert(key.to_string());

        let error = Error::stage_failed(key, message).with_operation("poller::poll");
        self.tracker.fail_stage(key, &error, message);
        tracing::warn!(stage = %key, message = %message, "stage failed");
        self.failures.push(StageFailure {
            stage: key.to_string(),
            message: message.to_string(),
        });
    }

    /// Start every stage that is neither started nor blocked, in tracker order.
    fn start_unblocked(&mut self) -> Vec<String> {
        let newly_unblocked: Vec<String> = self
            .stages
            .iter()
            .filter(|key| !self.started.contains(*key) && !self.failed.contains(*key))
            .filter(|key| !self.dependencies.is_blocked(key))
            .cloned()
            .collect();

        for key in &newly_unblocked {
            self.started.insert(key.clone());
            self.tracker.start_stage(key);
        }
        self.tracker.tick();
        newly_unblocked
    }
}

impl<G: ResourceGetter, T: StageTracker> OperationPoller for ConditionPoller<G, T> {
    type Ref = ();
    type Polled = Option<ConditionSet>;
    type Output = ConditionSet;

    fn poll(&mut self, _reference: &()) -> Result<Self::Polled> {
        ConditionPoller::poll(self)
    }

    fn is_done(&self, polled: &Self::Polled) -> bool {
        polled.as_ref().is_some_and(ConditionSet::is_terminal)
    }

    fn get_result(&mut self, polled: Self::Polled) -> Result<Self::Output> {
        polled.ok_or_else(|| {
            Error::unexpected("poll finished without a snapshot").with_operation("poller::get_result")
        })
    }

    fn status_message(&self) -> String {
        self.last_message.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{RecordingTracker, Stage, TrackerEvent};
    use pretty_assertions::assert_eq;
    use stagewatch_error::ErrorKind;

    fn absent() -> Result<Option<ConditionSet>> {
        Ok(None)
    }

    fn fixed(set: ConditionSet) -> impl FnMut() -> Result<Option<ConditionSet>> {
        move || Ok(Some(set.clone()))
    }

    #[test]
    fn construction_starts_only_unblocked_stages() {
        let tracker = RecordingTracker::new(
            "",
            [Stage::new("A", "A..."), Stage::new("B", "B..."), Stage::new("C", "C...")],
        );
        let deps = DependencyMap::new().with("B", ["A"]).with("C", ["B"]);
        let poller = ConditionPoller::new(absent, tracker, Some(deps)).unwrap();

        assert_eq!(
            poller.tracker().transitions(),
            vec![TrackerEvent::Started("A".into())]
        );
        assert!(poller.is_started("A"));
        assert!(!poller.is_started("B"));
        assert!(poller.remaining_dependencies().is_blocked("C"));
    }

    #[test]
    fn missing_resource_is_pending() {
        let tracker = RecordingTracker::new("", [Stage::new("A", "A...")]);
        let mut poller = ConditionPoller::new(absent, tracker, None).unwrap();
        assert!(poller.poll().unwrap().is_none());
    }

    #[test]
    fn getter_errors_propagate() {
        let tracker = RecordingTracker::new("", [Stage::new("A", "A...")]);
        let mut poller = ConditionPoller::new(
            || -> Result<Option<ConditionSet>> { Err(Error::unexpected("connection reset")) },
            tracker,
            None,
        )
        .unwrap();
        let err = poller.poll().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
    }

    #[test]
    fn cyclic_dependencies_rejected_at_construction() {
        let tracker = RecordingTracker::new("", [Stage::new("A", "A..."), Stage::new("B", "B...")]);
        let deps = DependencyMap::new().with("A", ["B"]).with("B", ["A"]);
        let err = ConditionPoller::new(absent, tracker, Some(deps))
            .err()
            .expect("cycle must be rejected");
        assert_eq!(err.kind(), ErrorKind::CircularDependency);
        assert_eq!(err.operation(), "poller::new");
    }

    #[test]
    fn message_matching_header_is_not_repeated_on_stage() {
        let tracker = RecordingTracker::new("", [Stage::new("A", "A...")]);
        let set = ConditionSet::new("Ready")
            .with("A", ConditionStatus::Unknown, "Waiting for revision")
            .with("Ready", ConditionStatus::Unknown, "Waiting for revision");
        let mut poller = ConditionPoller::new(fixed(set), tracker, None).unwrap();
        poller.poll().unwrap();

        assert!(
            !poller
                .tracker()
                .events()
                .iter()
                .any(|e| matches!(e, TrackerEvent::Updated(..)))
        );
        assert_eq!(poller.tracker().book().header(), "Waiting for revision");
        assert_eq!(poller.last_message(), "Waiting for revision");
    }

    #[test]
    fn blocked_stage_gets_message_but_no_transition() {
        let tracker = RecordingTracker::new("", [Stage::new("A", "A..."), Stage::new("B", "B...")]);
        let deps = DependencyMap::new().with("B", ["A"]);
        let set = ConditionSet::new("Ready")
            .with("A", ConditionStatus::Unknown, "")
            .with("B", false, "old failure")
            .with("Ready", ConditionStatus::Unknown, "");
        let mut poller = ConditionPoller::new(fixed(set), tracker, Some(deps)).unwrap();
        poller.tracker_mut().take_events();

        poller.poll().unwrap();
        assert!(poller.tracker().is_waiting("B"));
        assert!(poller.stage_failures().is_empty());
        assert!(poller.tracker().events().contains(&TrackerEvent::Updated(
            "B".into(),
            "old failure".into()
        )));
    }

    #[test]
    fn ready_terminal_does_not_complete_a_blocked_terminal_stage() {
        let tracker = RecordingTracker::new(
            "",
            [Stage::new("A", "A..."), Stage::new("Ready", "Finishing...")],
        );
        let deps = DependencyMap::new().with("Ready", ["A"]);
        let set = ConditionSet::new("Ready")
            .with("A", ConditionStatus::Unknown, "")
            .with("Ready", true, "");
        let mut poller = ConditionPoller::new(fixed(set), tracker, Some(deps)).unwrap();

        let done = poller.poll().unwrap();
        assert!(done.is_some_and(|set| set.is_ready()));
        assert!(poller.tracker().is_waiting("Ready"));
        assert!(!poller.is_completed("Ready"));
        assert!(poller.tracker().is_running("A"));
        assert_eq!(poller.tracker().book().header(), DONE_MESSAGE);
    }
}
