//! Scripted resource scenarios.
//!
//! A scenario describes the stages to track and the sequence of snapshots a
//! resource goes through. It is the stand-in for a live API when exercising
//! the poller from the command line.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use stagewatch_core::{
    Condition, ConditionSet, DependencyMap, Error, ResourceGetter, Result, Stage, service_stages,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageDecl {
    pub key: String,
    /// Display text, defaults to the key.
    #[serde(default)]
    pub header: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotDecl {
    /// The resource could not be fetched at this point.
    #[serde(default)]
    pub missing: bool,
    #[serde(default)]
    pub fresh: Option<bool>,
    #[serde(default)]
    pub generation: Option<i64>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub subconditions: Option<Vec<String>>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl SnapshotDecl {
    fn to_condition_set(&self, terminal: &str) -> Option<ConditionSet> {
        if self.missing {
            return None;
        }
        let mut set = self
            .conditions
            .iter()
            .cloned()
            .fold(ConditionSet::new(terminal), ConditionSet::with_condition);
        if let Some(names) = &self.subconditions {
            set = set.with_subconditions(names.iter().cloned());
        }
        if let Some(generation) = self.generation {
            set = set.with_generation(generation, self.observed_generation);
        }
        if let Some(fresh) = self.fresh {
            set = set.with_fresh(fresh);
        }
        Some(set)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub terminal: Option<String>,
    #[serde(default)]
    pub stages: Option<Vec<StageDecl>>,
    #[serde(default)]
    pub dependencies: Option<DependencyMap>,
    #[serde(default)]
    pub snapshots: Vec<SnapshotDecl>,
}

/// Stages, dependencies and terminal condition resolved against the service preset.
#[derive(Debug, Clone)]
pub struct Layout {
    pub header: String,
    pub stages: Vec<Stage>,
    pub dependencies: DependencyMap,
    pub terminal: String,
}

impl Scenario {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let scenario: Self = toml::from_str(text).map_err(|e| {
            Error::deserialization_failed(format!("invalid scenario: {}", e.message()))
                .with_operation("scenario::from_toml_str")
                .set_source(e)
        })?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let scenario: Self = serde_json::from_str(text).map_err(|e| {
            Error::deserialization_failed(format!("invalid scenario: {}", e))
                .with_operation("scenario::from_json_str")
                .set_source(e)
        })?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Stage keys must be non-empty and unique, and every key in the
    /// dependency map must name a declared stage.
    pub fn validate(&self) -> Result<()> {
        let layout = self.layout();
        let mut declared: HashSet<&str> = HashSet::new();
        for stage in &layout.stages {
            if stage.key.is_empty() {
                return Err(Error::invalid_argument("stage key must not be empty")
                    .with_operation("scenario::validate"));
            }
            if !declared.insert(stage.key.as_str()) {
                return Err(Error::invalid_argument(format!(
                    "stage '{}' is declared twice",
                    stage.key
                ))
                .with_operation("scenario::validate")
                .with_context("stage", stage.key.as_str()));
            }
        }
        for (stage, blockers) in layout.dependencies.iter() {
            let unknown = std::iter::once(stage)
                .chain(blockers.iter().map(String::as_str))
                .find(|key| !declared.contains(key));
            if let Some(key) = unknown {
                return Err(Error::unknown_stage(key).with_operation("scenario::validate"));
            }
        }
        Ok(())
    }

    /// Load a scenario; `.json` files are read as JSON, everything else as TOML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            Error::from(e)
                .with_operation("scenario::from_path")
                .with_context("path", path.display().to_string())
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let scenario = if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_toml_str(&text)
        };
        scenario.map_err(|e| e.with_context("path", path.display().to_string()))
    }

    /// Fill in whatever the scenario leaves out from the service preset.
    pub fn layout(&self) -> Layout {
        let preset = service_stages();
        let stages = match &self.stages {
            Some(decls) => decls
                .iter()
                .map(|decl| {
                    let header = decl.header.clone().unwrap_or_else(|| decl.key.clone());
                    Stage::new(decl.key.clone(), header)
                })
                .collect(),
            None => preset.stages,
        };
        let dependencies = match (&self.dependencies, &self.stages) {
            (Some(map), _) => map.clone(),
            // custom stages without a map have no ordering
            (None, Some(_)) => DependencyMap::new(),
            (None, None) => preset.dependencies,
        };
        Layout {
            header: self.header.clone().unwrap_or(preset.header),
            stages,
            dependencies,
            terminal: self.terminal.clone().unwrap_or(preset.terminal),
        }
    }

    pub fn resource(&self) -> ScriptedResource {
        let terminal = self.layout().terminal;
        ScriptedResource::new(
            self.snapshots
                .iter()
                .map(|decl| decl.to_condition_set(&terminal))
                .collect(),
        )
    }
}

/// Hands out snapshots in order, then repeats the last one as stale.
#[derive(Debug, Clone)]
pub struct ScriptedResource {
    queue: VecDeque<Option<ConditionSet>>,
    last: Option<ConditionSet>,
    fetches: usize,
}

impl ScriptedResource {
    pub fn new(snapshots: Vec<Option<ConditionSet>>) -> Self {
        Self {
            queue: snapshots.into(),
            last: None,
            fetches: 0,
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches
    }
}

impl ResourceGetter for ScriptedResource {
    fn get(&mut self) -> Result<Option<ConditionSet>> {
        self.fetches += 1;
        match self.queue.pop_front() {
            Some(next) => {
                tracing::debug!(fetch = self.fetches, present = next.is_some(), "scripted snapshot");
                if next.is_some() {
                    self.last = next.clone();
                }
                Ok(next)
            }
            None => Ok(self.last.clone().map(|set| set.with_fresh(false))),
        }
    }
}
