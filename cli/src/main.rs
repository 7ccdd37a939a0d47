// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Conduit CLI
//!
//! The `conduit` binary hosts the agent engine.
//!
//! ## Architecture
//!
//! - **Default mode**: CLI commands delegate to the daemon if running, else embed the engine
//! - **Daemon mode**: `conduit --daemon` runs the scheduler, propagation and cleanup loops
//!   behind the HTTP API
//! - **Detection**: PID file + HTTP health check
//!
//! ## Commands
//!
//! - `conduit daemon start|stop|status` - Manage daemon lifecycle
//! - `conduit schedule run` - Run the agents due at a minute
//! - `conduit propagate` - Run one propagation cycle
//! - `conduit agent ...` - Agent, link and run management
//! - `conduit events cleanup` - Delete expired events
//! - `conduit user deactivate|activate` - Account switches
//! - `conduit config show|validate|generate` - Configuration management
//! - `conduit update` - Apply database migrations

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use conduit_core::domain::engine_config::EngineConfigManifest;
use conduit_orchestrator::commands::{
    self, AgentCommand, ConfigCommand, DaemonCommand, EventsCommand, PropagateCommand,
    ScheduleCommand, UpdateCommand, UserCommand,
};
use conduit_orchestrator::daemon;

const DEFAULT_PORT: u16 = 8000;

/// Conduit - scheduled agents wired together by event links
#[derive(Parser)]
#[command(name = "conduit")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Run as background daemon service
    #[arg(long, global = true)]
    daemon: bool,

    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "CONDUIT_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// HTTP API port (default: spec.api.port, then 8000)
    #[arg(long, global = true, env = "CONDUIT_PORT")]
    port: Option<u16>,

    /// HTTP API host (default: 127.0.0.1)
    #[arg(long, global = true, env = "CONDUIT_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CONDUIT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage daemon lifecycle
    #[command(name = "daemon")]
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Scheduler operations
    #[command(name = "schedule")]
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommand,
    },

    /// Deliver pending events to every linked receiver
    #[command(name = "propagate")]
    Propagate {
        #[command(flatten)]
        command: PropagateCommand,
    },

    /// Agent management
    #[command(name = "agent")]
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Event store maintenance
    #[command(name = "events")]
    Events {
        #[command(subcommand)]
        command: EventsCommand,
    },

    /// User account switches
    #[command(name = "user")]
    User {
        #[command(subcommand)]
        command: UserCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Update the Conduit database
    #[command(name = "update")]
    Update {
        #[command(flatten)]
        command: UpdateCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Read once for logging and port defaults; commands load it again and report errors.
    let file_config = EngineConfigManifest::load_or_default(cli.config.clone()).ok();
    let log_format = file_config
        .as_ref()
        .and_then(|c| c.spec.observability.as_ref())
        .and_then(|o| o.logging.as_ref())
        .map(|l| l.format.clone())
        .unwrap_or_else(|| "compact".to_string());
    let port = cli
        .port
        .or_else(|| file_config.as_ref().map(|c| c.spec.api.port))
        .unwrap_or(DEFAULT_PORT);

    init_logging(&cli.log_level, &log_format)?;

    if cli.daemon {
        info!("Starting Conduit in daemon mode");
        return daemon::start_daemon(cli.config, port).await;
    }

    match cli.command {
        Some(Commands::Daemon { command }) => {
            commands::daemon::handle_command(command, cli.config, &cli.host, port).await
        }
        Some(Commands::Schedule { command }) => {
            commands::schedule::handle_command(command, cli.config, &cli.host, port).await
        }
        Some(Commands::Propagate { command }) => {
            commands::propagate::execute(command, cli.config, &cli.host, port).await
        }
        Some(Commands::Agent { command }) => {
            commands::agent::handle_command(command, cli.config, &cli.host, port).await
        }
        Some(Commands::Events { command }) => {
            commands::events::handle_command(command, cli.config, &cli.host, port).await
        }
        Some(Commands::User { command }) => {
            commands::user::handle_command(command, cli.config, &cli.host, port).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Update { command }) => commands::update::execute(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
