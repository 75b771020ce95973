//! Final report rendering.

use std::fmt::Write;

use serde::Serialize;
use stagewatch_core::{ConditionSet, Error, Result, StageBook, StageState};

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub key: String,
    pub header: String,
    pub state: StageState,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub terminal: String,
    pub message: String,
    pub polls: usize,
    pub stages: Vec<StageReport>,
    pub conditions: ConditionSet,
}

impl RunReport {
    pub fn new(book: &StageBook, conditions: ConditionSet, polls: usize) -> Self {
        let stages = book
            .entries()
            .iter()
            .map(|entry| StageReport {
                key: entry.stage.key.clone(),
                header: entry.stage.header.clone(),
                state: entry.state,
                message: entry.message.clone(),
            })
            .collect();
        Self {
            terminal: conditions.terminal_condition().to_string(),
            message: conditions.descriptive_message().to_string(),
            polls,
            stages,
            conditions,
        }
    }

    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} is {} after {} poll(s)",
            self.terminal,
            self.conditions.status(&self.terminal),
            self.polls
        );
        let width = self.stages.iter().map(|s| s.key.len()).max().unwrap_or(0);
        for stage in &self.stages {
            let _ = write!(out, "  {:<width$}  {}", stage.key, stage.state);
            if !stage.message.is_empty() {
                let _ = write!(out, "  {}", stage.message);
            }
            let _ = writeln!(out);
        }
        if !self.message.is_empty() {
            let _ = writeln!(out, "{}", self.message);
        }
        out
    }

    pub fn render_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::serialization_failed(format!("failed to encode report: {e}"))
                .with_operation("output::render_json")
                .set_source(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stagewatch_core::Stage;

    fn report() -> RunReport {
        let mut book = StageBook::new(
            "Deploying...",
            [
                Stage::new("ConfigurationsReady", "Creating Revision..."),
                Stage::new("RoutesReady", "Routing traffic..."),
            ],
        );
        book.start("ConfigurationsReady");
        book.complete("ConfigurationsReady", None);
        book.start("RoutesReady");
        book.complete("RoutesReady", None);
        let conditions = ConditionSet::new("Ready").with("Ready", true, "");
        RunReport::new(&book, conditions, 3)
    }

    #[test]
    fn summary_lists_stages() {
        assert_eq!(
            report().render_summary(),
            "Ready is true after 3 poll(s)\n  ConfigurationsReady  complete\n  RoutesReady          complete\n"
        );
    }

    #[test]
    fn json_carries_conditions() {
        let json: serde_json::Value = serde_json::from_str(&report().render_json().unwrap()).unwrap();
        assert_eq!(json["terminal"], "Ready");
        assert_eq!(json["stages"][1]["state"], "complete");
        assert_eq!(json["conditions"]["conditions"][0]["status"], "true");
        assert!(json["stages"][0].get("message").is_none());
    }
}
