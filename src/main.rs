//! afx - main entry point

use afx::cli::{Cli, Commands, StateCommands};
use afx::commands;
use afx::context::{self, Context, Paths};
use afx::env::ConsolePrompter;
use afx::process_guard;
use anyhow::{Context as _, Result};
use std::fs::OpenOptions;
use std::io::{stderr, stdout};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing.
///
/// The filter comes from `AFX_LOG` (falling back to `RUST_LOG`, then `warn`).
/// Output goes to `AFX_LOG_PATH` when set, stderr otherwise.
fn init_logging() -> Result<()> {
    let filter = std::env::var("AFX_LOG")
        .ok()
        .filter(|v| !v.is_empty())
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match std::env::var("AFX_LOG_PATH").ok().filter(|v| !v.is_empty()) {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(stderr).init(),
    }
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;
    info!("afx starting up");

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!(error = %e, "Failed to initialize signal handlers");
    }

    let cli = Cli::parse_args();
    debug!(?cli, "CLI arguments parsed");

    let mut paths = Paths::detect()?;
    if let Some(root) = cli.config_root {
        paths = paths.with_config_root(root);
    }

    let mut prompter = ConsolePrompter;
    let mut ctx = Context::init(&paths, &context::process_env(), &mut prompter)
        .context("failed to initialize afx")?;
    ctx.env.clone().install()?;

    let mut out = stdout().lock();
    match cli.command {
        Commands::Show => commands::show(&ctx, &mut out),
        Commands::Select => commands::select(&ctx, &mut out),
        Commands::State { action } => match action {
            StateCommands::List => commands::state_list(&ctx, &mut out),
            StateCommands::Refresh { force } => commands::state_refresh(&mut ctx, force, &mut out),
            StateCommands::Remove { names } => {
                commands::state_remove(&mut ctx, &names, &mut prompter, &mut stderr())
            }
        },
    }
}
