//! Dependency bookkeeping between stages.
//!
//! Each entry maps a stage key to the set of condition keys that must all be
//! true before the stage may start. The poller "checks off" blockers as their
//! stages complete; an entry disappears once its set is empty, so a stage is
//! blocked exactly when it still has an entry.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use stagewatch_error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyMap {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `stage` may only start once every key in `blockers` is true.
    ///
    /// Repeated calls for the same stage accumulate blockers.
    pub fn insert<I, S>(&mut self, stage: impl Into<String>, blockers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .entry(stage.into())
            .or_default()
            .extend(blockers.into_iter().map(Into::into));
    }

    pub fn with<I, S>(mut self, stage: impl Into<String>, blockers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(stage, blockers);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_blocked(&self, stage: &str) -> bool {
        self.entries.contains_key(stage)
    }

    pub fn blockers(&self, stage: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(stage)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keep only what matters for the tracked stages.
    ///
    /// Entries for untracked stages are dropped, blockers that are not tracked
    /// stages are dropped (nothing would ever check them off), and entries
    /// left with no blockers are removed. Cycles among what remains are an
    /// error.
    pub fn restrict_to(&self, tracked: &HashSet<&str>) -> Result<DependencyMap> {
        let mut entries = BTreeMap::new();
        for (stage, blockers) in &self.entries {
            if !tracked.contains(stage.as_str()) {
                tracing::debug!(stage = %stage, "dropping dependencies of untracked stage");
                continue;
            }
            let kept: BTreeSet<String> = blockers
                .iter()
                .filter(|blocker| tracked.contains(blocker.as_str()))
                .cloned()
                .collect();
            if !kept.is_empty() {
                entries.insert(stage.clone(), kept);
            }
        }

        let restricted = DependencyMap { entries };
        if let Some(cycle) = restricted.find_cycle() {
            return Err(Error::circular_dependency(&cycle).with_operation("deps::restrict_to"));
        }
        Ok(restricted)
    }

    /// Check `resolved` off every entry and return the stages it unblocked.
    pub fn resolve(&mut self, resolved: &str) -> Vec<String> {
        let mut unblocked = Vec::new();
        for (stage, blockers) in self.entries.iter_mut() {
            if blockers.remove(resolved) && blockers.is_empty() {
                unblocked.push(stage.clone());
            }
        }
        for stage in &unblocked {
            self.entries.remove(stage);
        }
        unblocked
    }

    /// Find one dependency cycle, returned as the path that closes on itself.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            map: &'a BTreeMap<String, BTreeSet<String>>,
            node: &'a str,
            marks: &mut BTreeMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            match marks.get(node) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|n| *n == node).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(node.to_string());
                    return Some(cycle);
                }
                None => {}
            }

            marks.insert(node, Mark::Visiting);
            path.push(node);
            if let Some(blockers) = map.get(node) {
                for blocker in blockers {
                    if let Some(cycle) = visit(map, blocker, marks, path) {
                        return Some(cycle);
                    }
                }
            }
            path.pop();
            marks.insert(node, Mark::Done);
            None
        }

        let mut marks = BTreeMap::new();
        let mut path = Vec::new();
        for stage in self.entries.keys() {
            if let Some(cycle) = visit(&self.entries, stage, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }
}

impl<K, I> FromIterator<(K, I)> for DependencyMap
where
    K: Into<String>,
    I: IntoIterator,
    I::Item: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let mut map = DependencyMap::new();
        for (stage, blockers) in iter {
            map.insert(stage, blockers);
        }
        map
    }
}
