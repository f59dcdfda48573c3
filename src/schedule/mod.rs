//! Build scheduling
//!
//! Walks a [`ResolvedGraph`] once per matrix variant, dependencies strictly
//! before dependents. Independent units run in parallel on a bounded pool of
//! blocking worker threads; the coordinating task alone reads and writes the
//! [`ResultCache`], so no unit is ever started twice.
//!
//! A unit whose dependency failed for the same variant is recorded as
//! [`BuildError::DependencyFailed`] without calling its build hook. Failures
//! never abort unrelated branches.

mod cancel;
mod report;

pub use cancel::CancelFlag;
pub use report::{BuildEvent, BuildReport, UnitOutcome};

use crate::cache::{BuildError, BuildResult, ResultCache};
use crate::error::{KilnError, KilnResult};
use crate::formula::{BuildContext, DepInstall, Formula, FormulaRegistry};
use crate::module::{CacheKey, MatrixVariant, ModuleRef};
use crate::resolve::ResolvedGraph;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Tunables for a scheduler run
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    /// Maximum number of build hooks running at once
    pub jobs: usize,
    /// Per-hook limit; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Install trees land in `<install_root>/<path>/<version>/<variant>`
    pub install_root: PathBuf,
}

impl ScheduleOptions {
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            jobs: std::thread::available_parallelism().map_or(1, |n| n.get()),
            timeout: None,
            install_root: install_root.into(),
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Install directory for one (module, variant)
    pub fn output_dir(&self, key: &CacheKey) -> PathBuf {
        self.install_root
            .join(&key.module.path)
            .join(&key.module.version)
            .join(key.variant.as_str())
    }
}

/// A unit whose hook is ready to run
struct Job {
    key: CacheKey,
    formula: Arc<dyn Formula>,
    ctx: BuildContext,
    output_dir: PathBuf,
}

/// What to do with a unit whose dependencies are all terminal
enum Step {
    Done(BuildResult, UnitOutcome),
    Run(Job),
}

pub struct Scheduler<'a> {
    registry: &'a FormulaRegistry,
    cache: &'a ResultCache,
    options: ScheduleOptions,
    cancel: CancelFlag,
    events: Option<mpsc::UnboundedSender<BuildEvent>>,
}

impl<'a> Scheduler<'a> {
    pub fn new(registry: &'a FormulaRegistry, cache: &'a ResultCache, options: ScheduleOptions) -> Self {
        Self {
            registry,
            cache,
            options,
            cancel: CancelFlag::new(),
            events: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send progress notifications to `tx`
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<BuildEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Build every node of `graph` for every variant.
    ///
    /// Returns `Err` only for internal faults; build failures are recorded in
    /// the report.
    pub async fn build(
        &self,
        graph: &ResolvedGraph,
        variants: &[MatrixVariant],
    ) -> KilnResult<BuildReport> {
        let mut seen = HashSet::new();
        let variants: Vec<&MatrixVariant> = variants.iter().filter(|v| seen.insert(*v)).collect();

        let mut dependents: HashMap<&ModuleRef, Vec<&ModuleRef>> = HashMap::new();
        let mut remaining: HashMap<CacheKey, usize> = HashMap::new();
        let mut ready: VecDeque<CacheKey> = VecDeque::new();
        let mut all_units: Vec<CacheKey> = Vec::new();

        for node in graph.topo_order() {
            dependents.insert(&node.module, graph.dependents(&node.module));
        }
        for variant in &variants {
            for node in graph.topo_order() {
                let key = CacheKey::new(node.module.clone(), (*variant).clone());
                if node.deps.is_empty() {
                    ready.push_back(key.clone());
                }
                remaining.insert(key.clone(), node.deps.len());
                all_units.push(key);
            }
        }

        info!(
            modules = graph.len(),
            variants = variants.len(),
            jobs = self.options.jobs,
            "Starting build"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.jobs.max(1)));
        let mut in_flight: HashSet<CacheKey> = HashSet::new();
        let mut tasks: JoinSet<(CacheKey, BuildResult)> = JoinSet::new();
        let mut report = BuildReport {
            planned: all_units.len(),
            ..Default::default()
        };

        loop {
            while !self.cancel.is_cancelled() {
                let Some(key) = ready.pop_front() else {
                    break;
                };
                if in_flight.contains(&key) || report.results.contains_key(&key) {
                    continue;
                }

                match self.plan(graph, &key)? {
                    Step::Done(result, outcome) => {
                        self.finish(&key, result, outcome, &mut report)?;
                        self.release(&key, &dependents, &mut remaining, &mut ready);
                    }
                    Step::Run(job) => {
                        in_flight.insert(key);
                        tasks.spawn(run_job(
                            job,
                            semaphore.clone(),
                            self.options.timeout,
                            self.events.clone(),
                        ));
                    }
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (key, result) =
                joined.map_err(|e| KilnError::Internal(format!("build task failed: {}", e)))?;
            in_flight.remove(&key);

            let outcome = if result.is_ok() {
                UnitOutcome::Built
            } else {
                UnitOutcome::Failed
            };
            self.finish(&key, result, outcome, &mut report)?;
            self.release(&key, &dependents, &mut remaining, &mut ready);
        }

        if self.cancel.is_cancelled() {
            report.cancelled = true;
            report.skipped = all_units
                .into_iter()
                .filter(|k| !report.results.contains_key(k))
                .collect();
            warn!(skipped = report.skipped.len(), "Build cancelled");
        } else if report.results.len() != report.planned {
            warn!(
                planned = report.planned,
                finished = report.results.len(),
                "Some units never became ready"
            );
        }

        info!(
            built = report.built(),
            reused = report.reused(),
            failed = report.failed(),
            dependency_failed = report.dependency_failed(),
            "Build finished"
        );
        Ok(report)
    }

    /// Decide a unit's fate once all of its dependencies are terminal
    fn plan(&self, graph: &ResolvedGraph, key: &CacheKey) -> KilnResult<Step> {
        if let Some(cached) = self.cache.get(key) {
            debug!(unit = %key, "Reusing cached result");
            return Ok(Step::Done(cached, UnitOutcome::Reused));
        }

        let output_dir = self.options.output_dir(key);
        let node = graph
            .get(&key.module)
            .ok_or_else(|| KilnError::Internal(format!("{} is not in the graph", key.module)))?;

        for dep in &node.deps {
            if self.dep_result(dep, &key.variant)?.is_failed() {
                debug!(unit = %key, dependency = %dep, "Dependency failed, skipping hook");
                return Ok(Step::Done(
                    BuildResult::dependency_failed(output_dir, dep.clone()),
                    UnitOutcome::DependencyFailed,
                ));
            }
        }

        let Some(formula) = self.registry.select(&key.module) else {
            let mut result = BuildResult::new(output_dir);
            result.add_err(BuildError::hook(format!("no formula for {}", key.module)));
            return Ok(Step::Done(result, UnitOutcome::Failed));
        };

        let mut deps = Vec::new();
        for dep in graph.transitive_deps(&key.module) {
            let built = self.dep_result(dep, &key.variant)?;
            deps.push(DepInstall {
                module: dep.clone(),
                output_dir: built.output_dir,
                metadata: built.metadata,
                direct: node.deps.contains(dep),
            });
        }

        Ok(Step::Run(Job {
            key: key.clone(),
            formula,
            ctx: BuildContext {
                module: key.module.clone(),
                variant: key.variant.clone(),
                deps,
            },
            output_dir,
        }))
    }

    fn dep_result(&self, dep: &ModuleRef, variant: &MatrixVariant) -> KilnResult<BuildResult> {
        let key = CacheKey::new(dep.clone(), variant.clone());
        self.cache
            .get(&key)
            .ok_or_else(|| KilnError::Internal(format!("no result for dependency {}", key)))
    }

    fn finish(
        &self,
        key: &CacheKey,
        result: BuildResult,
        outcome: UnitOutcome,
        report: &mut BuildReport,
    ) -> KilnResult<()> {
        if outcome != UnitOutcome::Reused {
            self.cache.put(key.clone(), result.clone())?;
        }
        match outcome {
            UnitOutcome::Failed => {
                for err in &result.errs {
                    warn!(unit = %key, "Build failed: {}", err);
                }
            }
            _ => debug!(unit = %key, %outcome, "Unit finished"),
        }
        if let Some(tx) = &self.events {
            let _ = tx.send(BuildEvent::Finished {
                key: key.clone(),
                outcome,
            });
        }
        report.record(key.clone(), result, outcome);
        Ok(())
    }

    /// Mark `key` terminal and queue dependents that became ready
    fn release(
        &self,
        key: &CacheKey,
        dependents: &HashMap<&ModuleRef, Vec<&ModuleRef>>,
        remaining: &mut HashMap<CacheKey, usize>,
        ready: &mut VecDeque<CacheKey>,
    ) {
        let Some(parents) = dependents.get(&key.module) else {
            return;
        };
        for parent in parents {
            let parent_key = CacheKey::new((*parent).clone(), key.variant.clone());
            if let Some(count) = remaining.get_mut(&parent_key) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.push_back(parent_key);
                }
            }
        }
    }
}

/// Run one build hook on the blocking pool once a worker slot is free
async fn run_job(
    job: Job,
    semaphore: Arc<Semaphore>,
    timeout: Option<Duration>,
    events: Option<mpsc::UnboundedSender<BuildEvent>>,
) -> (CacheKey, BuildResult) {
    let Job {
        key,
        formula,
        ctx,
        output_dir,
    } = job;

    let permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return (key, hook_failure(&output_dir, e.to_string())),
    };
    if let Some(tx) = &events {
        let _ = tx.send(BuildEvent::Started(key.clone()));
    }
    debug!(unit = %key, "Running build hook");

    let dir = output_dir.clone();
    // The slot is held by the hook thread, so a timed-out hook still counts
    // against `jobs` until it really exits.
    let handle = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        let mut result = BuildResult::new(dir);
        formula.build(&ctx, &mut result);
        result
    });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                // The hook thread keeps running and keeps its slot; its result is discarded
                let mut result = BuildResult::new(output_dir);
                result.add_err(BuildError::Timeout {
                    secs: limit.as_secs(),
                });
                return (key, result);
            }
        },
        None => handle.await,
    };

    let result = match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            let mut result = BuildResult::new(output_dir);
            result.add_err(BuildError::Panicked {
                message: panic_message(e.into_panic()),
            });
            result
        }
        Err(e) => hook_failure(&output_dir, e.to_string()),
    };
    (key, result)
}

fn hook_failure(output_dir: &Path, message: String) -> BuildResult {
    let mut result = BuildResult::new(output_dir.to_path_buf());
    result.add_err(BuildError::hook(message));
    result
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
