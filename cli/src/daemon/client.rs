// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for communicating with daemon API

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use conduit_core::application::agent::{CreateAgentRequest, UpdateAgentRequest};
use conduit_core::domain::agent::RunKind;

#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: Client,
    base_url: String,
}

impl DaemonClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}:{}", host, port)
        } else {
            format!("http://{}:{}", host, port)
        };

        Ok(Self { client, base_url })
    }

    /// Send a request and decode the JSON body. Empty bodies (204) decode to `null`.
    async fn send(&self, method: Method, path: &str, body: Option<Value>, action: &str) -> Result<Value> {
        let mut request = self.client.request(method, format!("{}{}", self.base_url, path));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to {}", action))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&error_text)
                .ok()
                .and_then(|v| v["error"].as_str().map(str::to_string))
                .unwrap_or(error_text);
            anyhow::bail!("Failed to {} ({}): {}", action, status, message);
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response to {}", action))
    }

    pub async fn run_schedule(&self, at: Option<DateTime<Utc>>) -> Result<Value> {
        self.send(Method::POST, "/v1/schedule/run", Some(json!({ "at": at })), "run schedule")
            .await
    }

    pub async fn propagate(&self) -> Result<Value> {
        self.send(Method::POST, "/v1/propagate", None, "propagate events").await
    }

    pub async fn cleanup_events(&self) -> Result<Value> {
        self.send(Method::POST, "/v1/events/cleanup", None, "clean up events").await
    }

    pub async fn list_agents(&self, user_id: Option<Uuid>) -> Result<Value> {
        let path = match user_id {
            Some(user_id) => format!("/v1/agents?user_id={}", user_id),
            None => "/v1/agents".to_string(),
        };
        self.send(Method::GET, &path, None, "list agents").await
    }

    pub async fn get_agent(&self, agent_id: Uuid) -> Result<Value> {
        self.send(Method::GET, &format!("/v1/agents/{}", agent_id), None, "get agent")
            .await
    }

    pub async fn create_agent(&self, request: &CreateAgentRequest) -> Result<Value> {
        let body = serde_json::to_value(request).context("Failed to encode agent")?;
        self.send(Method::POST, "/v1/agents", Some(body), "create agent").await
    }

    pub async fn update_agent(&self, agent_id: Uuid, request: &UpdateAgentRequest) -> Result<Value> {
        let body = serde_json::to_value(request).context("Failed to encode agent update")?;
        self.send(Method::PATCH, &format!("/v1/agents/{}", agent_id), Some(body), "update agent")
            .await
    }

    pub async fn delete_agent(&self, agent_id: Uuid, delete_events: bool) -> Result<()> {
        self.send(
            Method::DELETE,
            &format!("/v1/agents/{}?delete_events={}", agent_id, delete_events),
            None,
            "delete agent",
        )
        .await?;
        Ok(())
    }

    pub async fn run_agent(&self, agent_id: Uuid, kind: RunKind, event_ids: Option<Vec<u64>>) -> Result<Value> {
        self.send(
            Method::POST,
            &format!("/v1/agents/{}/run", agent_id),
            Some(json!({ "kind": kind, "event_ids": event_ids })),
            "run agent",
        )
        .await
    }

    pub async fn agent_health(&self, agent_id: Uuid) -> Result<Value> {
        self.send(Method::GET, &format!("/v1/agents/{}/health", agent_id), None, "get agent health")
            .await
    }

    pub async fn agent_events(&self, agent_id: Uuid, limit: usize) -> Result<Value> {
        self.send(
            Method::GET,
            &format!("/v1/agents/{}/events?limit={}", agent_id, limit),
            None,
            "list agent events",
        )
        .await
    }

    pub async fn remove_agent_events(&self, agent_id: Uuid) -> Result<Value> {
        self.send(Method::DELETE, &format!("/v1/agents/{}/events", agent_id), None, "remove events")
            .await
    }

    pub async fn agent_logs(&self, agent_id: Uuid, limit: usize) -> Result<Value> {
        self.send(
            Method::GET,
            &format!("/v1/agents/{}/logs?limit={}", agent_id, limit),
            None,
            "get agent logs",
        )
        .await
    }

    pub async fn clear_memory(&self, agent_id: Uuid) -> Result<()> {
        self.send(Method::DELETE, &format!("/v1/agents/{}/memory", agent_id), None, "clear memory")
            .await?;
        Ok(())
    }

    pub async fn drop_pending(&self, agent_id: Uuid) -> Result<Value> {
        self.send(
            Method::DELETE,
            &format!("/v1/agents/{}/pending", agent_id),
            None,
            "drop pending events",
        )
        .await
    }

    pub async fn list_links(&self) -> Result<Value> {
        self.send(Method::GET, "/v1/links", None, "list links").await
    }

    pub async fn create_link(&self, source_id: Uuid, receiver_id: Uuid) -> Result<Value> {
        self.send(
            Method::POST,
            "/v1/links",
            Some(json!({ "source_id": source_id, "receiver_id": receiver_id })),
            "create link",
        )
        .await
    }

    pub async fn delete_link(&self, source_id: Uuid, receiver_id: Uuid) -> Result<()> {
        self.send(
            Method::DELETE,
            &format!("/v1/links/{}/{}", source_id, receiver_id),
            None,
            "delete link",
        )
        .await?;
        Ok(())
    }

    pub async fn deactivate_user(&self, user_id: Uuid) -> Result<Value> {
        self.send(Method::POST, &format!("/v1/users/{}/deactivate", user_id), None, "deactivate user")
            .await
    }

    pub async fn activate_user(&self, user_id: Uuid) -> Result<Value> {
        self.send(Method::POST, &format!("/v1/users/{}/activate", user_id), None, "activate user")
            .await
    }
}
