// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Account-level switches
//!
//! Commands: deactivate, activate

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use uuid::Uuid;

use super::Backend;

#[derive(Subcommand)]
pub enum UserCommand {
    /// Stop scheduling and propagating to every agent the user owns
    Deactivate {
        #[arg(value_name = "USER_ID")]
        user_id: Uuid,
    },

    /// Re-enable a deactivated user's agents
    Activate {
        #[arg(value_name = "USER_ID")]
        user_id: Uuid,
    },
}

pub async fn handle_command(
    command: UserCommand,
    config_path: Option<PathBuf>,
    host: &str,
    port: u16,
) -> Result<()> {
    let backend = Backend::connect(config_path, host, port).await?;
    match command {
        UserCommand::Deactivate { user_id } => {
            let body = backend.deactivate_user(user_id).await?;
            println!(
                "{}",
                format!("✓ Deactivated {} agent(s) of user {}", body["agents"], user_id).green()
            );
        }
        UserCommand::Activate { user_id } => {
            let body = backend.activate_user(user_id).await?;
            println!(
                "{}",
                format!("✓ Activated {} agent(s) of user {}", body["agents"], user_id).green()
            );
        }
    }
    Ok(())
}
