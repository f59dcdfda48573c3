//! Progress indicators with CI fallback

use super::context::UiContext;
use crate::schedule::{BuildEvent, UnitOutcome};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Progress over (module, variant) units of a build.
///
/// An indicatif bar in interactive mode; one line per finished unit in CI.
pub struct BuildProgress {
    bar: Option<ProgressBar>,
}

impl BuildProgress {
    pub fn new(ctx: &UiContext, units: u64) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(units);
            let template = "  {spinner:.cyan} Building  {bar:24.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}";
            let style = ProgressStyle::default_bar()
                .template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                .progress_chars("━╸─");
            bar.set_style(style);
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };
        Self { bar }
    }

    pub fn on_event(&self, event: &BuildEvent) {
        match (event, &self.bar) {
            (BuildEvent::Started(key), Some(bar)) => bar.set_message(key.to_string()),
            (BuildEvent::Started(_), None) => {}
            (BuildEvent::Finished { .. }, Some(bar)) => bar.inc(1),
            (BuildEvent::Finished { key, outcome }, None) => {
                let tag = match outcome {
                    UnitOutcome::Built | UnitOutcome::Reused => style("[OK]").green(),
                    UnitOutcome::Failed => style("[FAIL]").red(),
                    UnitOutcome::DependencyFailed => style("[-]").dim(),
                };
                println!("  {} {} {}", tag, key, style(outcome).dim());
            }
        }
    }

    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}
