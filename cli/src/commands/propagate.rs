// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Propagation command: deliver pending events to every linked receiver once

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::{print_json, print_tally, Backend};

#[derive(Args)]
pub struct PropagateCommand {
    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(
    cmd: PropagateCommand,
    config_path: Option<PathBuf>,
    host: &str,
    port: u16,
) -> Result<()> {
    let backend = Backend::connect(config_path, host, port).await?;
    let report = backend.propagate().await?;
    if cmd.json {
        return print_json(&report);
    }

    let receivers = report["receivers"].as_u64().unwrap_or(0);
    if receivers == 0 {
        println!("{}", "Nothing to propagate".dimmed());
        return Ok(());
    }
    let delivered = report["events_delivered"].as_u64().unwrap_or(0);
    print_tally(
        &format!("{} event(s) delivered to {} receiver(s)", delivered, receivers),
        &report,
    );
    Ok(())
}
