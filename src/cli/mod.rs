//! Command-line interface for storyflow
//!
//! - `args`: clap argument definitions
//! - `run`: entry point and command dispatch
//! - `commands`: command implementations
//! - `progress`: stderr progress sink for `generate`

pub mod args;
pub mod commands;
mod progress;
mod run;

pub use args::{Cli, Commands};
pub use commands::{GenerateOptions, execute_generate_command, render_outcome};
pub use progress::ProgressPrinter;
pub use run::run;
