// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Event Repository
//!
//! Append-only `events` table. Ids come from a `BIGSERIAL`, which gives the
//! strictly increasing assignment order cursors depend on.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use super::postgres_agent::event_id_to_db;
use crate::domain::agent::{AgentId, UserId};
use crate::domain::document::document;
use crate::domain::event::{Event, EventId, NewEvent};
use crate::domain::repository::{EventRepository, RepositoryError};

const EVENT_COLUMNS: &str = "id, agent_id, user_id, payload, created_at, expires_at";

pub struct PostgresEventRepository {
    pool: PgPool,
}

impl PostgresEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_event(row: &PgRow) -> Event {
    let id: i64 = row.get("id");
    let payload: serde_json::Value = row.get("payload");
    Event {
        id: EventId(id as u64),
        agent_id: AgentId(row.get("agent_id")),
        user_id: UserId(row.get("user_id")),
        payload: document(payload),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

#[async_trait]
impl EventRepository for PostgresEventRepository {
    async fn append(&self, event: NewEvent) -> Result<Event, RepositoryError> {
        let row = sqlx::query(
            r#"
            INSERT INTO events (agent_id, user_id, payload, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(event.agent_id.0)
        .bind(event.user_id.0)
        .bind(serde_json::Value::Object(event.payload.clone()))
        .bind(event.created_at)
        .bind(event.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to append event: {}", e)))?;

        let id: i64 = row.get("id");
        Ok(event.into_event(EventId(id as u64)))
    }

    async fn find_by_id(&self, id: EventId) -> Result<Option<Event>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS))
            .bind(id.0 as i64)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_event))
    }

    async fn find_by_ids(&self, ids: &[EventId]) -> Result<Vec<Event>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = ids.iter().map(|id| id.0 as i64).collect();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM events WHERE id = ANY($1) ORDER BY created_at, id",
            EVENT_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_event).collect())
    }

    async fn find_after(
        &self,
        sources: &[AgentId],
        after: Option<EventId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, RepositoryError> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let sources: Vec<uuid::Uuid> = sources.iter().map(|id| id.0).collect();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM events
            WHERE agent_id = ANY($1)
              AND id > $2
              AND (expires_at IS NULL OR expires_at > $3)
            ORDER BY created_at, id
            "#,
            EVENT_COLUMNS
        ))
        .bind(sources)
        .bind(event_id_to_db(after).unwrap_or(0))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_event).collect())
    }

    async fn latest_by_agent(&self, agent_id: AgentId, limit: usize) -> Result<Vec<Event>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM events WHERE agent_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
            EVENT_COLUMNS
        ))
        .bind(agent_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_event).collect())
    }

    async fn max_id(&self) -> Result<Option<EventId>, RepositoryError> {
        let row = sqlx::query("SELECT MAX(id) AS max_id FROM events")
            .fetch_one(&self.pool)
            .await?;

        let max: Option<i64> = row.get("max_id");
        Ok(max.map(|id| EventId(id as u64)))
    }

    async fn delete_by_agent(&self, agent_id: AgentId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM events WHERE agent_id = $1")
            .bind(agent_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM events WHERE expires_at IS NOT NULL AND expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn update_expiration(&self, agent_id: AgentId, retention: Option<Duration>) -> Result<u64, RepositoryError> {
        let result = match retention {
            Some(retention) => {
                sqlx::query(
                    "UPDATE events SET expires_at = created_at + make_interval(secs => $2) WHERE agent_id = $1",
                )
                .bind(agent_id.0)
                .bind(retention.num_seconds() as f64)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query("UPDATE events SET expires_at = NULL WHERE agent_id = $1")
                    .bind(agent_id.0)
                    .execute(&self.pool)
                    .await?
            }
        };

        Ok(result.rows_affected())
    }
}
