// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use conduit_core::domain::engine_config::{EngineConfigManifest, StorageKind};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output path (default: ./conduit-config.yaml)
        #[arg(short, long, default_value = "./conduit-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, force } => generate(output, force),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = EngineConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. CONDUIT_CONFIG_PATH: {}",
            std::env::var("CONDUIT_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./conduit-config.yaml");
        println!("  4. ~/.conduit/config.yaml");
        println!("  5. /etc/conduit/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Scheduler:".bold());
    println!("  Enabled: {}", spec.scheduler.enabled);
    println!("  Tick: {}s", spec.scheduler.tick_seconds);
    println!("  UTC offset: {}", spec.scheduler.utc_offset);
    println!();

    println!("{}", "Propagation:".bold());
    println!("  Enabled: {}", spec.propagation.enabled);
    println!("  Interval: {}s", spec.propagation.interval_seconds);
    println!("  Propagate on emit: {}", spec.propagation.propagate_on_emit);
    println!();

    println!("{}", "Dispatcher:".bold());
    println!("  Max concurrency: {}", spec.dispatcher.max_concurrency);
    println!("  Logs kept per agent: {}", spec.logs.max_per_agent);
    println!();

    println!("{}", "Storage:".bold());
    match spec.storage.backend {
        StorageKind::Memory => println!("  Backend: memory"),
        StorageKind::Postgres => {
            println!("  Backend: postgres");
            // Connection strings may carry credentials.
            let url = spec.storage.database_url.as_deref().unwrap_or("(not set)");
            let shown = if url.starts_with("env:") { url } else { "(set)" };
            println!("  Database URL: {}", shown);
            println!("  Max connections: {}", spec.storage.max_connections);
        }
    }
    println!();

    println!("{}", "API:".bold());
    println!("  Bind: {}:{}", spec.api.bind_address, spec.api.port);

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = EngineConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    EngineConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_writes_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conduit-config.yaml");

        generate(path.clone(), false).unwrap();
        let config = EngineConfigManifest::from_yaml_file(&path).unwrap();
        config.validate().unwrap();

        assert!(generate(path.clone(), false).is_err());
        generate(path, true).unwrap();
    }
}
