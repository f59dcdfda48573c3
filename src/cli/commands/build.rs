//! Build command - resolve a module and build it for every matrix variant

use crate::cache::{BuildError, CacheStore, ResultCache};
use crate::cli::args::BuildArgs;
use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use crate::journal::Journal;
use crate::module::{CacheKey, MatrixVariant};
use crate::schedule::{BuildReport, CancelFlag, ScheduleOptions, Scheduler, UnitOutcome};
use crate::ui::{self, BuildProgress, TaskSpinner, UiContext};
use crate::workspace::Workspace;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> KilnResult<()> {
    let ctx = UiContext::detect();
    let state_dir = config.state_dir();
    let journal = Journal::new(&state_dir, config.general.journal);

    let ws = Workspace::load(config).await?;
    let root = ws.root_module(&args.module, args.version.as_deref())?;
    let variants = requested_variants(&args, config)?;

    ui::intro(&ctx, &format!("kiln build {}", root));

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Resolving dependencies...");
    let graph = match ws.resolver().resolve(&root) {
        Ok(graph) => graph,
        Err(e) => {
            spinner.stop_error("Dependency resolution failed");
            journal
                .log(
                    "resolve.finish",
                    &serde_json::json!({ "root": root, "ok": false, "error": e.to_string() }),
                )
                .await;
            return Err(e.into());
        }
    };
    spinner.stop(&format!("Resolved {} module(s)", graph.len()));
    journal
        .log(
            "resolve.finish",
            &serde_json::json!({ "root": root, "ok": true, "modules": graph.len() }),
        )
        .await;

    let store = CacheStore::new(&state_dir);
    let persist = config.build.persist_cache;
    let cache = if persist && !args.no_cache {
        let entries = store.load_valid().await?;
        if !entries.is_empty() {
            ui::step_info(&ctx, &format!("{} cached result(s) available", entries.len()));
        }
        ResultCache::with_entries(entries)
    } else {
        if args.no_cache {
            ui::step_warn(&ctx, "Ignoring cached results");
        }
        ResultCache::new()
    };

    let options = ScheduleOptions::new(&config.paths.install_root)
        .with_jobs(args.jobs.unwrap_or_else(|| config.build.jobs()))
        .with_timeout(
            args.timeout
                .or(config.build.timeout_secs)
                .map(Duration::from_secs),
        );
    let cancel = CancelFlag::new();
    cancel.cancel_on_ctrl_c();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress = BuildProgress::new(&ctx, (graph.len() * variants.len()) as u64);
    let scheduler = Scheduler::new(&ws.registry, &cache, options)
        .with_cancel(cancel)
        .with_events(tx);

    let report = {
        let mut run = std::pin::pin!(scheduler.build(&graph, &variants));
        loop {
            tokio::select! {
                result = &mut run => break result?,
                Some(event) = rx.recv() => progress.on_event(&event),
            }
        }
    };
    while let Ok(event) = rx.try_recv() {
        progress.on_event(&event);
    }
    progress.finish();

    if persist {
        for (key, result) in report.newly_built() {
            if let Err(e) = store.save(key, result).await {
                warn!("Failed to persist result for {}: {}", key, e);
            }
        }
    }

    for (key, outcome) in &report.outcomes {
        journal
            .log("build.finish", &unit_event(key, outcome, &report))
            .await;
    }
    journal
        .log(
            "run.finish",
            &serde_json::json!({
                "root": root,
                "variants": variants,
                "built": report.built(),
                "reused": report.reused(),
                "failed": report.failed(),
                "dependency_failed": report.dependency_failed(),
                "skipped": report.skipped.len(),
                "cancelled": report.cancelled,
            }),
        )
        .await;

    print_report(&ctx, &report, &root, &variants)
}

/// `--matrix` wins over the configured matrix
fn requested_variants(args: &BuildArgs, config: &Config) -> KilnResult<Vec<MatrixVariant>> {
    if args.matrix.is_empty() {
        return config.build.variants();
    }
    args.matrix.iter().map(|v| MatrixVariant::parse(v)).collect()
}

fn unit_event(key: &CacheKey, outcome: &UnitOutcome, report: &BuildReport) -> serde_json::Value {
    let errors: Vec<String> = report
        .get(key)
        .map(|r| r.errs.iter().map(ToString::to_string).collect())
        .unwrap_or_default();
    serde_json::json!({
        "module": key.module,
        "variant": key.variant,
        "outcome": outcome,
        "errors": errors,
    })
}

fn print_report(
    ctx: &UiContext,
    report: &BuildReport,
    root: &crate::module::ModuleRef,
    variants: &[MatrixVariant],
) -> KilnResult<()> {
    if report.failures().next().is_some() {
        ui::section(ctx, "Failures");
    }
    for (key, result) in report.failures() {
        match result.errs.first() {
            Some(BuildError::DependencyFailed { dependency }) if result.is_dependency_failed() => {
                ui::step_blocked(ctx, &key.to_string(), &dependency.to_string());
            }
            _ => {
                let detail = result
                    .errs
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                ui::step_error_detail(ctx, &key.to_string(), &detail);
            }
        }
    }

    let summary = format!(
        "{} built, {} cached, {} failed, {} blocked",
        report.built(),
        report.reused(),
        report.failed(),
        report.dependency_failed()
    );
    debug!("{}", summary);

    if report.cancelled {
        ui::outro_warn(ctx, &format!("Cancelled: {}", summary));
        return Err(KilnError::Cancelled {
            skipped: report.skipped.len(),
        });
    }

    if !report.is_success() {
        ui::outro_error(ctx, &summary);
        return Err(KilnError::BuildFailed {
            failed: report.failures().count(),
            total: report.results.len(),
        });
    }

    for variant in variants {
        let key = CacheKey::new(root.clone(), variant.clone());
        if let Some(result) = report.get(&key) {
            ui::key_value(ctx, variant.as_str(), &result.output_dir.display().to_string());
        }
    }
    ui::outro_success(ctx, &summary);
    Ok(())
}
