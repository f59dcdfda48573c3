//! What a scheduler run produced

use crate::cache::BuildResult;
use crate::module::CacheKey;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// How a (module, variant) unit reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    /// The build hook ran and recorded no errors
    Built,
    /// A cached result was reused without running the hook
    Reused,
    /// The build hook ran and recorded errors
    Failed,
    /// Never built because a dependency failed
    DependencyFailed,
}

impl UnitOutcome {
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::DependencyFailed)
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Built => "built",
            Self::Reused => "cached",
            Self::Failed => "failed",
            Self::DependencyFailed => "dependency failed",
        })
    }
}

/// Progress notifications emitted while a run is in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// A build hook is about to run
    Started(CacheKey),
    Finished { key: CacheKey, outcome: UnitOutcome },
}

/// Per-key outcomes of one `build` call
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub results: BTreeMap<CacheKey, BuildResult>,
    pub outcomes: BTreeMap<CacheKey, UnitOutcome>,
    /// Units never started because the run was cancelled
    pub skipped: Vec<CacheKey>,
    pub cancelled: bool,
    /// Number of (module, variant) units the run was asked to produce
    pub planned: usize,
}

impl BuildReport {
    pub(crate) fn record(&mut self, key: CacheKey, result: BuildResult, outcome: UnitOutcome) {
        self.outcomes.insert(key.clone(), outcome);
        self.results.insert(key, result);
    }

    pub fn get(&self, key: &CacheKey) -> Option<&BuildResult> {
        self.results.get(key)
    }

    pub fn outcome(&self, key: &CacheKey) -> Option<UnitOutcome> {
        self.outcomes.get(key).copied()
    }

    fn count(&self, outcome: UnitOutcome) -> usize {
        self.outcomes.values().filter(|o| **o == outcome).count()
    }

    pub fn built(&self) -> usize {
        self.count(UnitOutcome::Built)
    }

    pub fn reused(&self) -> usize {
        self.count(UnitOutcome::Reused)
    }

    pub fn failed(&self) -> usize {
        self.count(UnitOutcome::Failed)
    }

    pub fn dependency_failed(&self) -> usize {
        self.count(UnitOutcome::DependencyFailed)
    }

    /// Every planned unit has a result and none failed
    pub fn is_success(&self) -> bool {
        !self.cancelled
            && self.skipped.is_empty()
            && self.results.len() == self.planned
            && self.results.values().all(BuildResult::is_ok)
    }

    /// Results produced by a hook during this run, successful ones only
    pub fn newly_built(&self) -> impl Iterator<Item = (&CacheKey, &BuildResult)> {
        self.results
            .iter()
            .filter(|(k, _)| self.outcomes.get(*k) == Some(&UnitOutcome::Built))
    }

    /// Results with errors, in key order
    pub fn failures(&self) -> impl Iterator<Item = (&CacheKey, &BuildResult)> {
        self.results.iter().filter(|(_, r)| r.is_failed())
    }
}
