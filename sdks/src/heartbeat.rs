// Copyright (c) 2026 Meridian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Background task that keeps a registration alive.
//!
//! Registers on start, then heartbeats on a fixed cadence. When the registry
//! answers that the record is gone (it was swept while we were unreachable,
//! or the registry restarted), the task re-registers and carries on. Network
//! errors are logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use meridian_registry_core::domain::registration::NewRegistration;

use crate::client::{HeartbeatAck, RegistryClient};

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Heartbeat cadence. Half the registry's default liveness window, so a
    /// single dropped request does not expire the record.
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Owns one provider's registration for the lifetime of the process.
pub struct HeartbeatTask {
    client: Arc<RegistryClient>,
    registration: NewRegistration,
    config: HeartbeatConfig,
    shutdown_token: CancellationToken,
}

impl HeartbeatTask {
    pub fn new(
        client: Arc<RegistryClient>,
        registration: NewRegistration,
        config: HeartbeatConfig,
    ) -> Self {
        Self {
            client,
            registration,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Register, then spawn the heartbeat loop. Fails if the initial
    /// registration is rejected; transport problems after that point are
    /// retried rather than surfaced.
    pub async fn start(self) -> anyhow::Result<tokio::task::JoinHandle<()>> {
        self.client.register(&self.registration).await?;
        info!(id = %self.registration.id, "Registered with registry");

        Ok(tokio::spawn(async move {
            self.run().await;
        }))
    }

    async fn run(&self) {
        let mut tick = interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it, we just registered.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => self.beat().await,
                _ = self.shutdown_token.cancelled() => {
                    info!(id = %self.registration.id, "Shutdown signal received, stopping heartbeat task");
                    break;
                }
            }
        }
    }

    async fn beat(&self) {
        match self.client.heartbeat(&self.registration.id).await {
            Ok(HeartbeatAck::Acknowledged) => {
                debug!(id = %self.registration.id, "Heartbeat acknowledged");
            }
            Ok(HeartbeatAck::Unknown) => {
                warn!(id = %self.registration.id, "Registration lost, re-registering");
                if let Err(err) = self.client.register(&self.registration).await {
                    warn!(id = %self.registration.id, error = %err, "Re-registration failed");
                }
            }
            Err(err) => {
                warn!(id = %self.registration.id, error = %err, "Heartbeat failed, will retry");
            }
        }
    }
}
