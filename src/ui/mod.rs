//! Terminal output for the kiln CLI
//!
//! Uses `cliclack` for interactive sessions and falls back to plain,
//! line-oriented output in CI or when stdout is not a terminal.
//!
//! ```rust,ignore
//! use kiln::ui::{self, BuildProgress, UiContext};
//!
//! let ctx = UiContext::detect();
//! ui::intro(&ctx, "kiln build madler/zlib@1.3.1");
//!
//! let progress = BuildProgress::new(&ctx, units);
//! // feed BuildEvents from the scheduler
//! progress.finish();
//!
//! ui::outro_success(&ctx, "4 built, 2 cached");
//! ```

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_error, outro_success, outro_warn, remark, section, step_blocked,
    step_error_detail, step_info, step_ok, step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::{BuildProgress, TaskSpinner};
pub use prompts::confirm;
