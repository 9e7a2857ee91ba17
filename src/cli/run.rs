//! CLI entry point and dispatch logic
//!
//! `run()` parses arguments, discovers configuration, creates the tokio
//! runtime and dispatches to the command handlers. It prints every error
//! itself; `main` only turns the returned code into a process exit.

use std::io::{IsTerminal, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::args::{Cli, Commands};
use super::commands::{self, GenerateOptions};
use super::progress::ProgressPrinter;
use crate::{CliArgs, Config, ExitCode, init_tracing};

/// Main CLI execution function.
///
/// Returns `Err(ExitCode)` after the error has already been printed.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("✗ Failed to initialize logging: {e}");
    }

    let (profile, no_coalesce) = match &cli.command {
        Commands::Generate {
            profile,
            no_coalesce,
            ..
        } => (profile.clone(), *no_coalesce),
        _ => (None, false),
    };
    let cli_args = CliArgs {
        config_path: cli.config.clone(),
        model: cli.model.clone(),
        profile,
        base_url: cli.base_url.clone(),
        no_coalesce,
    };

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("✗ Configuration error: {err:#}");
            return Err(ExitCode::CONFIGURATION);
        }
    };

    match cli.command {
        Commands::Generate {
            subject,
            input,
            domain,
            timeout,
            artifact_only,
            ..
        } => {
            let raw_text = match read_input(input.as_deref()) {
                Ok(text) => text,
                Err(err) => {
                    eprintln!("✗ {err:#}");
                    return Err(ExitCode::CONFIGURATION);
                }
            };
            let options = GenerateOptions {
                subject,
                domain,
                timeout: timeout.map(Duration::from_secs),
            };
            run_generate(&config, &options, raw_text, artifact_only)
        }
        Commands::Sanitize { report } => {
            let mut input = String::new();
            let result = std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")
                .and_then(|_| {
                    commands::execute_sanitize_command(
                        &input,
                        report,
                        &mut std::io::stdout(),
                        &mut std::io::stderr(),
                    )
                });
            result.map_err(|err| {
                eprintln!("✗ {err:#}");
                ExitCode::INTERNAL
            })
        }
        Commands::Config { json } => {
            commands::execute_config_command(&config, json, &mut std::io::stdout()).map_err(
                |err| {
                    eprintln!("✗ {err:#}");
                    ExitCode::INTERNAL
                },
            )
        }
    }
}

fn run_generate(
    config: &Config,
    options: &GenerateOptions,
    raw_text: String,
    artifact_only: bool,
) -> Result<(), ExitCode> {
    let backend = match storyflow_llm::from_config(config) {
        Ok(backend) => backend,
        Err(err) => {
            let err = storyflow_orchestrator::GenerationError::Configuration(err.to_string());
            eprint!("{}", err.display_for_user());
            return Err(err.to_exit_code());
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling generation");
                on_interrupt.cancel();
            }
        });

        let notifier = Arc::new(ProgressPrinter::new(std::io::stderr()));
        commands::execute_generate_command(config, backend, options, raw_text, notifier, &cancel)
            .await
    });

    match result {
        Ok(outcome) => {
            let rendered = commands::render_outcome(&outcome, artifact_only);
            match serde_json::to_string_pretty(&rendered) {
                Ok(text) => {
                    println!("{text}");
                    Ok(())
                }
                Err(e) => {
                    eprintln!("✗ Failed to serialize artifact: {e}");
                    Err(ExitCode::INTERNAL)
                }
            }
        }
        Err(err) => {
            eprint!("{}", err.display_for_user());
            Err(err.to_exit_code())
        }
    }
}

/// Requirement text from `path`, or from stdin when no path is given.
fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?,
        None => {
            let stdin = std::io::stdin();
            if stdin.is_terminal() {
                eprintln!("Reading requirement text from stdin (end with Ctrl-D)...");
            }
            let mut text = String::new();
            stdin
                .lock()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            text
        }
    };

    if text.trim().is_empty() {
        anyhow::bail!("Requirement text is empty");
    }
    Ok(text)
}
