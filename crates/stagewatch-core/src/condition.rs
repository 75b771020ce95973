//! Status conditions observed on a remote resource.
//!
//! A [`ConditionSet`] is one snapshot of a resource: every named condition with
//! its tri-state status and message, the name of the terminal condition that
//! decides overall success, and whether the snapshot is fresh.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, IntoStaticStr};

/// Tri-state status of a single condition.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    pub fn is_true(self) -> bool {
        self == ConditionStatus::True
    }

    pub fn is_false(self) -> bool {
        self == ConditionStatus::False
    }

    pub fn is_unknown(self) -> bool {
        self == ConditionStatus::Unknown
    }
}

impl From<Option<bool>> for ConditionStatus {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => ConditionStatus::True,
            Some(false) => ConditionStatus::False,
            None => ConditionStatus::Unknown,
        }
    }
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        Some(value).into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub message: String,
}

impl Condition {
    pub fn new(
        name: impl Into<String>,
        status: impl Into<ConditionStatus>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
            message: message.into(),
        }
    }
}

/// One immutable snapshot of a resource's conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
    terminal: String,
    subconditions: Option<Vec<String>>,
    fresh: bool,
}

impl ConditionSet {
    /// Create an empty, fresh snapshot whose overall outcome is decided by `terminal`.
    pub fn new(terminal: impl Into<String>) -> Self {
        Self {
            conditions: Vec::new(),
            terminal: terminal.into(),
            subconditions: None,
            fresh: true,
        }
    }

    /// Add a condition, replacing any earlier condition with the same name.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        match self.conditions.iter_mut().find(|c| c.name == condition.name) {
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
        self
    }

    pub fn with(
        self,
        name: impl Into<String>,
        status: impl Into<ConditionStatus>,
        message: impl Into<String>,
    ) -> Self {
        self.with_condition(Condition::new(name, status, message))
    }

    /// Pin the ordered list of sub-conditions that gate the terminal condition.
    ///
    /// Without this, every non-terminal condition counts, in insertion order.
    pub fn with_subconditions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subconditions = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Derive freshness from resource generations.
    ///
    /// The snapshot is fresh once the controller has observed the latest
    /// generation; before that its conditions describe the previous operation.
    pub fn with_generation(mut self, generation: i64, observed_generation: Option<i64>) -> Self {
        self.fresh = observed_generation.is_some_and(|observed| observed >= generation);
        self
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn terminal_condition(&self) -> &str {
        &self.terminal
    }

    pub fn terminal_subconditions(&self) -> Vec<&str> {
        match &self.subconditions {
            Some(names) => names.iter().map(String::as_str).collect(),
            None => self
                .conditions
                .iter()
                .map(|c| c.name.as_str())
                .filter(|name| *name != self.terminal)
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.name == name)
    }

    /// Status of `name`; a condition missing from the snapshot is unknown.
    pub fn status(&self, name: &str) -> ConditionStatus {
        self.get(name).map(|c| c.status).unwrap_or_default()
    }

    /// Message of `name`, empty when missing.
    pub fn message(&self, name: &str) -> &str {
        self.get(name).map(|c| c.message.as_str()).unwrap_or("")
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_terminal(&self) -> bool {
        !self.status(&self.terminal).is_unknown()
    }

    pub fn is_ready(&self) -> bool {
        self.status(&self.terminal).is_true()
    }

    pub fn is_failed(&self) -> bool {
        self.status(&self.terminal).is_false()
    }

    /// Human readable summary of the operation: the terminal condition's message.
    pub fn descriptive_message(&self) -> &str {
        self.message(&self.terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_state_follows_terminal_condition() {
        let pending = ConditionSet::new("Ready").with("Ready", ConditionStatus::Unknown, "");
        assert!(!pending.is_terminal());
        assert!(!pending.is_ready());
        assert!(!pending.is_failed());

        let ready = ConditionSet::new("Ready").with("Ready", true, "");
        assert!(ready.is_terminal() && ready.is_ready());

        let failed = ConditionSet::new("Ready").with("Ready", false, "quota exceeded");
        assert!(failed.is_terminal() && failed.is_failed());
        assert_eq!(failed.descriptive_message(), "quota exceeded");
    }

    #[test]
    fn missing_terminal_condition_is_pending() {
        let set = ConditionSet::new("Ready").with("RoutesReady", true, "");
        assert!(!set.is_terminal());
        assert_eq!(set.descriptive_message(), "");
    }

    #[test]
    fn subconditions_default_to_non_terminal_in_order() {
        let set = ConditionSet::new("Ready")
            .with("ConfigurationsReady", ConditionStatus::Unknown, "")
            .with("Ready", ConditionStatus::Unknown, "")
            .with("RoutesReady", ConditionStatus::Unknown, "");
        assert_eq!(
            set.terminal_subconditions(),
            vec!["ConfigurationsReady", "RoutesReady"]
        );

        let pinned = set.with_subconditions(["RoutesReady"]);
        assert_eq!(pinned.terminal_subconditions(), vec!["RoutesReady"]);
    }

    #[test]
    fn with_condition_replaces_by_name() {
        let set = ConditionSet::new("Ready")
            .with("A", ConditionStatus::Unknown, "working")
            .with("A", true, "done");
        assert_eq!(set.conditions().len(), 1);
        assert_eq!(set.status("A"), ConditionStatus::True);
        assert_eq!(set.message("A"), "done");
    }

    #[test]
    fn freshness_from_generation() {
        let set = ConditionSet::new("Ready");
        assert!(set.clone().with_generation(3, Some(3)).is_fresh());
        assert!(!set.clone().with_generation(3, Some(2)).is_fresh());
        assert!(!set.with_generation(3, None).is_fresh());
    }

    #[test]
    fn status_display_is_lowercase() {
        assert_eq!(ConditionStatus::True.to_string(), "true");
        assert_eq!(ConditionStatus::Unknown.to_string(), "unknown");
    }
}
