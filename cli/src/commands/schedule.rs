// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Scheduler commands
//!
//! Commands: run

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use super::{print_json, print_tally, Backend};

#[derive(Subcommand)]
pub enum ScheduleCommand {
    /// Run every agent whose schedule matches the given minute
    Run {
        /// Minute to evaluate (RFC 3339, default: now)
        #[arg(long, value_name = "TIMESTAMP")]
        at: Option<DateTime<Utc>>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(
    command: ScheduleCommand,
    config_path: Option<PathBuf>,
    host: &str,
    port: u16,
) -> Result<()> {
    match command {
        ScheduleCommand::Run { at, json } => {
            let backend = Backend::connect(config_path, host, port).await?;
            let report = backend.run_schedule(at).await?;
            if json {
                return print_json(&report);
            }

            let due = report["due"].as_u64().unwrap_or(0);
            if due == 0 {
                println!("{}", "No agents due".dimmed());
                return Ok(());
            }
            print_tally(&format!("{} agent(s) due", due), &report);
            Ok(())
        }
    }
}
