//! Toolbelt - small network tools
//!
//! Main entry point for the application.

mod cli;
mod repl;
mod terminal_sink;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, SshArgs};
use once_cell::sync::Lazy;
use remote_shell::{
    ConnectRequest, Credential, SessionController, SessionOptions, SessionState, Ssh2Backend,
};
use settings::SshConfig;
use std::sync::Arc;
use std::time::Instant;
use terminal_sink::TerminalSink;
use tracing::{debug, info, warn};

/// Application startup time for performance monitoring
static STARTUP_TIME: Lazy<Instant> = Lazy::new(Instant::now);

/// Environment variable holding the SSH password for non-interactive use.
const PASSWORD_ENV: &str = "TOOLBELT_SSH_PASSWORD";

/// Check if debug mode is enabled via environment variable.
fn is_debug_mode() -> bool {
    std::env::var("TOOLBELT_DEBUG").is_ok()
}

/// Initialize the logging system.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // In debug mode, enable trace logging for our crates
    let default_filter = if is_debug_mode() {
        "toolbelt=trace,remote_shell=trace,settings=debug,info"
    } else {
        "toolbelt=info,remote_shell=info,warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();

    if is_debug_mode() {
        info!(
            "Toolbelt v{} starting up (DEBUG MODE ENABLED)",
            env!("CARGO_PKG_VERSION")
        );
        info!("Set RUST_LOG for custom log levels, e.g. RUST_LOG=remote_shell=trace");
    } else {
        debug!("Toolbelt v{} starting up", env!("CARGO_PKG_VERSION"));
    }
}

/// Apply `--config` and load the config file, creating it on first launch.
fn init_config(cli: &Cli) -> SshConfig {
    if let Some(dir) = &cli.config {
        if !toolbelt_paths::set_config_dir(dir.clone()) {
            warn!("Config directory already initialized, ignoring {:?}", dir);
        }
    }
    if settings::ensure_config_file().is_none() {
        warn!(
            "Could not create {:?}, using built-in defaults",
            settings::config_path()
        );
    }
    settings::load_config().ssh
}

fn credential(args: &SshArgs) -> Result<Credential> {
    if args.agent {
        return Ok(Credential::Agent);
    }
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        debug!("Using password from {}", PASSWORD_ENV);
        return Ok(Credential::password(password));
    }
    let prompt = format!("{}@{}'s password: ", args.user, args.host);
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Credential::password(password))
}

fn run_ssh(args: SshArgs, config: SshConfig) -> Result<()> {
    let credential = credential(&args)?;
    let port = args.port.unwrap_or(config.port);
    let request = ConnectRequest::new(&args.host, &args.user, credential).with_port(port);
    let address = request.address();

    let controller = SessionController::new(
        Arc::new(Ssh2Backend::from_config(&config)),
        Arc::new(TerminalSink::stdio()),
        SessionOptions::from_config(&config),
    );
    controller.connect(request)?;
    debug!("Session started {:?} after launch", STARTUP_TIME.elapsed());

    let result = repl::run(&controller, std::io::stderr());
    controller.stop();
    result?;

    if controller.state() == SessionState::Failed {
        anyhow::bail!("SSH session to {} failed", address);
    }
    Ok(())
}

fn main() -> Result<()> {
    Lazy::force(&STARTUP_TIME);
    init_logging();

    let cli = Cli::parse();
    let config = init_config(&cli);

    match cli.command {
        Commands::Ssh(args) => run_ssh(args, config),
    }
}
