// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Agent Repository
//!
//! Production `AgentRepository` backed by the `agents` table. Configuration
//! writes (`save`) and run-state writes (`record_run`) touch disjoint column
//! sets, so an operator edit racing a dispatched run cannot clobber either.
//!
//! `record_run` locks the row (`SELECT ... FOR UPDATE`) and applies the
//! domain transition in [`Agent::apply_run`], keeping the cursor
//! compare-and-advance rule in one place.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::agent::{Agent, AgentId, CursorAdvance, RunRecord, UserId};
use crate::domain::document::{document, Document};
use crate::domain::event::EventId;
use crate::domain::repository::{AgentRepository, RepositoryError};
use crate::domain::schedule::Schedule;

const AGENT_COLUMNS: &str = r#"
    id, user_id, name, agent_type, options, memory, schedule, disabled,
    deactivated, keep_events_for_days, last_checked_event_id, last_check_at,
    last_receive_at, last_event_at, last_error_log_at, consecutive_failures,
    events_count, created_at, updated_at
"#;

pub struct PostgresAgentRepository {
    pool: PgPool,
}

impl PostgresAgentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(super) fn event_id_from_db(value: Option<i64>) -> Option<EventId> {
    value.map(|v| EventId(v as u64))
}

pub(super) fn event_id_to_db(id: Option<EventId>) -> Option<i64> {
    id.map(|e| e.0 as i64)
}

fn row_to_agent(row: &PgRow) -> Result<Agent, RepositoryError> {
    let schedule: String = row.get("schedule");
    let schedule = schedule
        .parse::<Schedule>()
        .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
    let options: serde_json::Value = row.get("options");
    let memory: serde_json::Value = row.get("memory");
    let keep_events_for_days: i32 = row.get("keep_events_for_days");
    let consecutive_failures: i32 = row.get("consecutive_failures");
    let events_count: i64 = row.get("events_count");

    Ok(Agent {
        id: AgentId(row.get("id")),
        user_id: UserId(row.get("user_id")),
        name: row.get("name"),
        agent_type: row.get("agent_type"),
        options: document(options),
        memory: document(memory),
        schedule,
        disabled: row.get("disabled"),
        deactivated: row.get("deactivated"),
        keep_events_for_days: keep_events_for_days.max(0) as u32,
        last_checked_event_id: event_id_from_db(row.get("last_checked_event_id")),
        last_check_at: row.get("last_check_at"),
        last_receive_at: row.get("last_receive_at"),
        last_event_at: row.get("last_event_at"),
        last_error_log_at: row.get("last_error_log_at"),
        consecutive_failures: consecutive_failures.max(0) as u32,
        events_count: events_count.max(0) as u64,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn rows_to_agents(rows: Vec<PgRow>) -> Result<Vec<Agent>, RepositoryError> {
    rows.iter().map(row_to_agent).collect()
}

#[async_trait]
impl AgentRepository for PostgresAgentRepository {
    async fn save(&self, agent: &Agent) -> Result<(), RepositoryError> {
        let options = serde_json::Value::Object(agent.options.clone());
        let memory = serde_json::Value::Object(agent.memory.clone());

        // Run-state columns only take the inserted values on first save.
        sqlx::query(
            r#"
            INSERT INTO agents (
                id, user_id, name, agent_type, options, memory, schedule,
                disabled, deactivated, keep_events_for_days,
                last_checked_event_id, consecutive_failures, events_count,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, 0, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                options = EXCLUDED.options,
                schedule = EXCLUDED.schedule,
                disabled = EXCLUDED.disabled,
                keep_events_for_days = EXCLUDED.keep_events_for_days,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(agent.id.0)
        .bind(agent.user_id.0)
        .bind(&agent.name)
        .bind(agent.agent_type())
        .bind(options)
        .bind(memory)
        .bind(agent.schedule.to_string())
        .bind(agent.disabled)
        .bind(agent.deactivated)
        .bind(agent.keep_events_for_days as i32)
        .bind(event_id_to_db(agent.last_checked_event_id))
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to save agent: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: AgentId) -> Result<Option<Agent>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM agents WHERE id = $1", AGENT_COLUMNS))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_agent).transpose()
    }

    async fn find_by_ids(&self, ids: &[AgentId]) -> Result<Vec<Agent>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<uuid::Uuid> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query(&format!("SELECT {} FROM agents WHERE id = ANY($1)", AGENT_COLUMNS))
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        rows_to_agents(rows)
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Agent>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM agents WHERE user_id = $1 ORDER BY created_at DESC",
            AGENT_COLUMNS
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows_to_agents(rows)
    }

    async fn list_all(&self) -> Result<Vec<Agent>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {} FROM agents ORDER BY created_at DESC", AGENT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows_to_agents(rows)
    }

    async fn find_scheduled(&self) -> Result<Vec<Agent>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM agents WHERE NOT disabled AND NOT deactivated AND schedule <> 'never'",
            AGENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows_to_agents(rows)
    }

    async fn record_run(&self, id: AgentId, record: &RunRecord) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("SELECT {} FROM agents WHERE id = $1 FOR UPDATE", AGENT_COLUMNS))
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("agent {}", id)))?;

        let mut agent = row_to_agent(&row)?;
        let advanced = agent.apply_run(record);

        sqlx::query(
            r#"
            UPDATE agents SET
                memory = $2,
                last_checked_event_id = $3,
                last_check_at = $4,
                last_receive_at = $5,
                last_event_at = $6,
                last_error_log_at = $7,
                consecutive_failures = $8,
                events_count = $9
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(serde_json::Value::Object(agent.memory))
        .bind(event_id_to_db(agent.last_checked_event_id))
        .bind(agent.last_check_at)
        .bind(agent.last_receive_at)
        .bind(agent.last_event_at)
        .bind(agent.last_error_log_at)
        .bind(agent.consecutive_failures.min(i32::MAX as u32) as i32)
        .bind(agent.events_count.min(i64::MAX as u64) as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(advanced)
    }

    async fn advance_cursor(&self, id: AgentId, advance: CursorAdvance) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE agents
            SET last_checked_event_id = $3
            WHERE id = $1
              AND last_checked_event_id IS NOT DISTINCT FROM $2
              AND (last_checked_event_id IS NULL OR last_checked_event_id < $3)
            "#,
        )
        .bind(id.0)
        .bind(event_id_to_db(advance.expected))
        .bind(advance.to.0 as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn force_cursor(&self, id: AgentId, cursor: Option<EventId>) -> Result<(), RepositoryError> {
        // GREATEST ignores NULLs, so a NULL cursor is replaced by any id.
        sqlx::query(
            r#"
            UPDATE agents
            SET last_checked_event_id = GREATEST(last_checked_event_id, $2)
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(event_id_to_db(cursor))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_memory(&self, id: AgentId, memory: Document) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE agents SET memory = $2 WHERE id = $1")
            .bind(id.0)
            .bind(serde_json::Value::Object(memory))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("agent {}", id)));
        }
        Ok(())
    }

    async fn set_deactivated_for_user(&self, user_id: UserId, deactivated: bool) -> Result<u64, RepositoryError> {
        let result = sqlx::query("UPDATE agents SET deactivated = $2 WHERE user_id = $1")
            .bind(user_id.0)
            .bind(deactivated)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, id: AgentId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM agents WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
