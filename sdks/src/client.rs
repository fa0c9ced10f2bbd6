// Copyright (c) 2026 Meridian Contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{bail, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use meridian_registry_core::application::registry::RegistryStats;
use meridian_registry_core::domain::events::{ExecutionId, NodeId, StepStatus, WorkflowId};
use meridian_registry_core::domain::registration::{
    EntityId, EntityKind, NewRegistration, RegistrationRecord,
};

/// Outcome of a heartbeat call.
///
/// `Unknown` means the registry no longer holds the record, usually because
/// it was swept while this provider was unreachable. The provider should
/// re-register rather than keep heartbeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAck {
    Acknowledged,
    Unknown,
}

/// Client for interacting with a Meridian registry.
pub struct RegistryClient {
    base_url: String,
    client: Client,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct RemovedBody {
    removed: bool,
}

#[derive(Deserialize)]
struct DeliveredBody {
    delivered: usize,
}

impl RegistryClient {
    /// Create a client for the registry at `base_url`, e.g.
    /// `http://localhost:8700`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    /// Register (or re-register) a provider. Returns the stored record.
    pub async fn register(&self, registration: &NewRegistration) -> Result<RegistrationRecord> {
        let url = format!("{}/registry/register", self.base_url);
        let response = self.client.post(&url).json(registration).send().await?;

        if !response.status().is_success() {
            bail!("registration rejected: {}", Self::error_text(response).await);
        }
        Ok(response.json().await?)
    }

    /// Report liveness for `id`.
    pub async fn heartbeat(&self, id: &EntityId) -> Result<HeartbeatAck> {
        let url = format!("{}/registry/heartbeat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "id": id }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(HeartbeatAck::Acknowledged),
            StatusCode::NOT_FOUND => Ok(HeartbeatAck::Unknown),
            _ => bail!("heartbeat failed: {}", Self::error_text(response).await),
        }
    }

    /// Remove the registration for `id`. Returns whether a record existed.
    pub async fn unregister(&self, id: &EntityId) -> Result<bool> {
        let url = format!("{}/registry/unregister/{}", self.base_url, id);
        let response = self.client.delete(&url).send().await?;

        if !response.status().is_success() {
            bail!("unregister failed: {}", Self::error_text(response).await);
        }
        let body: RemovedBody = response.json().await?;
        Ok(body.removed)
    }

    /// List live registrations, optionally filtered by kind and tag.
    pub async fn discover(
        &self,
        kind: Option<EntityKind>,
        tag: Option<&str>,
    ) -> Result<Vec<RegistrationRecord>> {
        let url = format!("{}/registry/discover", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(kind) = kind {
            let kind = match kind {
                EntityKind::Agent => "agent",
                EntityKind::Tool => "tool",
            };
            request = request.query(&[("kind", kind)]);
        }
        if let Some(tag) = tag {
            request = request.query(&[("tag", tag)]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            bail!("discover failed: {}", Self::error_text(response).await);
        }
        Ok(response.json().await?)
    }

    /// Fetch one registration by id, whether or not it is currently live.
    pub async fn discover_one(&self, id: &EntityId) -> Result<Option<RegistrationRecord>> {
        let url = format!("{}/registry/discover/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            status if status.is_success() => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => bail!("discover failed: {}", Self::error_text(response).await),
        }
    }

    /// Live providers of `capability`, in registration order.
    pub async fn discover_by_capability(
        &self,
        capability: &str,
    ) -> Result<Vec<RegistrationRecord>> {
        let url = format!(
            "{}/registry/discover/capability/{}",
            self.base_url, capability
        );
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            bail!("discover failed: {}", Self::error_text(response).await);
        }
        Ok(response.json().await?)
    }

    /// Registry-wide counters.
    pub async fn stats(&self) -> Result<RegistryStats> {
        let url = format!("{}/registry/stats", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            bail!("stats failed: {}", Self::error_text(response).await);
        }
        Ok(response.json().await?)
    }

    /// Publish one step-progress event for an execution. Returns the number
    /// of connections the event was delivered to; zero means no dashboard is
    /// watching, which is not an error.
    pub async fn publish_event(
        &self,
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        node_id: &NodeId,
        status: StepStatus,
        message: Option<&str>,
        data: Option<serde_json::Value>,
    ) -> Result<usize> {
        let url = format!("{}/executions/{}/events", self.base_url, execution_id);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "workflow_id": workflow_id,
                "node_id": node_id,
                "status": status,
                "message": message,
                "data": data,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("publish failed: {}", Self::error_text(response).await);
        }
        let body: DeliveredBody = response.json().await?;
        Ok(body.delivered)
    }

    async fn error_text(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => format!("{status}: {}", body.error),
            Err(_) => status.to_string(),
        }
    }
}
