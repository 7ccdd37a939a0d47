// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Event store commands
//!
//! Commands: cleanup

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use super::Backend;

#[derive(Subcommand)]
pub enum EventsCommand {
    /// Delete events whose retention has expired
    Cleanup,
}

pub async fn handle_command(
    command: EventsCommand,
    config_path: Option<PathBuf>,
    host: &str,
    port: u16,
) -> Result<()> {
    match command {
        EventsCommand::Cleanup => {
            let backend = Backend::connect(config_path, host, port).await?;
            let body = backend.cleanup_events().await?;
            let removed = body["removed"].as_u64().unwrap_or(0);
            println!("{}", format!("✓ Removed {} expired event(s)", removed).green());
            Ok(())
        }
    }
}
