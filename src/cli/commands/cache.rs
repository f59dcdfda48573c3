//! Cache command - inspect or clear persisted build results

use crate::cache::{CacheStore, CachedResult};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::KilnResult;
use crate::ui::{self, UiContext};
use console::style;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> KilnResult<()> {
    let store = CacheStore::new(&config.state_dir());

    match args.action {
        CacheAction::List { format } => list_results(&store, format).await,
        CacheAction::Clear { yes } => clear_results(&store, yes).await,
    }
}

async fn list_results(store: &CacheStore, format: OutputFormat) -> KilnResult<()> {
    let entries = store.list().await?;

    match format {
        OutputFormat::Json => print_results_json(&entries)?,
        _ if entries.is_empty() => println!("No cached build results."),
        OutputFormat::Table => print_results_table(&entries),
        OutputFormat::Plain => print_results_plain(&entries),
    }

    Ok(())
}

fn print_results_table(entries: &[CachedResult]) {
    println!(
        "{:<36} {:<16} {:<10} {:<18} {}",
        "MODULE", "VARIANT", "STATE", "BUILT", "OUTPUT"
    );
    println!("{}", "-".repeat(100));

    for entry in entries {
        let state = if entry.is_valid() {
            style("valid").green().to_string()
        } else {
            style("stale").yellow().to_string()
        };

        println!(
            "{:<36} {:<16} {:<10} {:<18} {}",
            entry.key.module.to_string(),
            entry.key.variant.as_str(),
            state,
            entry.built_at.format("%Y-%m-%d %H:%M"),
            entry.result.output_dir.display()
        );
    }

    println!();
    println!("Total: {} result(s)", entries.len());
}

fn print_results_json(entries: &[CachedResult]) -> KilnResult<()> {
    #[derive(serde::Serialize)]
    struct ResultJson<'a> {
        module: &'a str,
        version: &'a str,
        variant: &'a str,
        output_dir: String,
        metadata: &'a str,
        built_at: String,
        valid: bool,
    }

    let rows: Vec<ResultJson> = entries
        .iter()
        .map(|e| ResultJson {
            module: &e.key.module.path,
            version: &e.key.module.version,
            variant: e.key.variant.as_str(),
            output_dir: e.result.output_dir.display().to_string(),
            metadata: &e.result.metadata,
            built_at: e.built_at.to_rfc3339(),
            valid: e.is_valid(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn print_results_plain(entries: &[CachedResult]) {
    for entry in entries {
        println!("{}", entry.key);
    }
}

async fn clear_results(store: &CacheStore, yes: bool) -> KilnResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);
    let entries = store.list().await?;

    if entries.is_empty() {
        println!("No cached build results to clear.");
        return Ok(());
    }

    let prompt = format!("Remove {} cached result(s)?", entries.len());
    if !ui::confirm(&ctx, &prompt, false).await? {
        ui::step_warn_hint(&ctx, "Nothing removed", "Pass --yes to skip the prompt");
        return Ok(());
    }

    let removed = store.clear().await?;
    ui::step_ok(&ctx, &format!("Cleared {} cached result(s)", removed));
    Ok(())
}
