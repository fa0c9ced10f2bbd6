// Copyright (c) 2026 Meridian Contributors
// SPDX-License-Identifier: AGPL-3.0

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::RegistryError;

/// Caller-supplied identifier for a registered agent or tool.
///
/// Unique across the whole store regardless of kind; immutable for the
/// record's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Agent,
    Tool,
}

/// A named operation an agent or tool exposes, with declared parameter and
/// return shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// JSON schema for the capability's parameters.
    #[serde(default)]
    pub parameters: serde_json::Value,

    /// JSON schema for the capability's return value.
    #[serde(default)]
    pub returns: serde_json::Value,
}

/// Network address used to construct the provider's callable URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Liveness policy for a registration.
///
/// Externally-registered providers with no heartbeat source are `Exempt` and
/// never swept; everything else is `Tracked` and must heartbeat within the
/// liveness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Liveness {
    Tracked { last_heartbeat: DateTime<Utc> },
    Exempt,
}

impl Liveness {
    pub fn is_exempt(&self) -> bool {
        matches!(self, Liveness::Exempt)
    }
}

/// One registered agent or tool instance. The store holds only current state;
/// no historical versions are retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    pub description: String,
    pub version: String,
    pub capabilities: Vec<Capability>,
    pub endpoint: Endpoint,
    pub tags: BTreeSet<String>,
    pub liveness: Liveness,
    pub registered_at: DateTime<Utc>,
}

impl RegistrationRecord {
    /// Whether the record counts as live at `now` for the given window.
    pub fn is_live(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match self.liveness {
            Liveness::Exempt => true,
            Liveness::Tracked { last_heartbeat } => now - last_heartbeat <= window,
        }
    }

    /// Update the heartbeat timestamp. A no-op for exempt records.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if let Liveness::Tracked { .. } = self.liveness {
            self.liveness = Liveness::Tracked {
                last_heartbeat: now,
            };
        }
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == name)
    }
}

/// Registration request from a provider. A request whose `id` already exists
/// fully replaces the stored metadata; it is an update, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRegistration {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_version")]
    pub version: String,

    pub capabilities: Vec<Capability>,
    pub endpoint: Endpoint,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Exclude this record from liveness tracking entirely (providers that
    /// cannot be heartbeat-monitored).
    #[serde(default)]
    pub exempt: bool,

    /// On re-registration, whether the heartbeat clock restarts. Heartbeat
    /// calls themselves never alter metadata.
    #[serde(default = "default_true")]
    pub reset_heartbeat: bool,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_true() -> bool {
    true
}

impl NewRegistration {
    /// Validate the request before it touches the store.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.id.as_str().is_empty() {
            return Err(RegistryError::InvalidRecord("id must not be empty".into()));
        }
        if self.capabilities.is_empty() {
            return Err(RegistryError::InvalidRecord(
                "at least one capability is required".into(),
            ));
        }
        if self.capabilities.iter().any(|c| c.name.is_empty()) {
            return Err(RegistryError::InvalidRecord(
                "capability name must not be empty".into(),
            ));
        }
        if self.endpoint.host.is_empty() {
            return Err(RegistryError::InvalidRecord(
                "endpoint host must not be empty".into(),
            ));
        }
        if self.endpoint.port == 0 {
            return Err(RegistryError::InvalidRecord(
                "endpoint port must not be zero".into(),
            ));
        }
        Ok(())
    }

    /// Materialize the stored record. `previous` is the record being replaced,
    /// if any; its heartbeat timestamp is carried over when the caller asked
    /// not to reset it.
    pub fn into_record(
        self,
        previous: Option<&RegistrationRecord>,
        now: DateTime<Utc>,
    ) -> RegistrationRecord {
        let liveness = if self.exempt {
            Liveness::Exempt
        } else {
            match (self.reset_heartbeat, previous.map(|p| p.liveness)) {
                (false, Some(Liveness::Tracked { last_heartbeat })) => {
                    Liveness::Tracked { last_heartbeat }
                }
                _ => Liveness::Tracked {
                    last_heartbeat: now,
                },
            }
        };

        RegistrationRecord {
            id: self.id,
            kind: self.kind,
            name: self.name,
            description: self.description,
            version: self.version,
            capabilities: self.capabilities,
            endpoint: self.endpoint,
            tags: self.tags,
            liveness,
            registered_at: previous.map(|p| p.registered_at).unwrap_or(now),
        }
    }
}
