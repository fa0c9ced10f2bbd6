// Copyright (c) 2026 Meridian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Liveness Sweeper — background task that expires stale registrations.
//!
//! Distinct from explicit unregister only in who initiates the removal; the
//! store path is the same, so capability-index consistency holds either way.
//! Expirations are expected steady-state behaviour: they are logged and
//! counted, never surfaced to a caller as an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::registry::RegistryService;

/// Configuration for the sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to scan for stale records.
    pub interval: Duration,

    /// Whether sweeping is enabled.
    pub enabled: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            enabled: true,
        }
    }
}

/// Background task that periodically expires records whose heartbeat age
/// exceeds the registry's liveness window.
pub struct LivenessSweeper {
    registry: Arc<RegistryService>,
    config: SweeperConfig,
    shutdown_token: CancellationToken,
}

impl LivenessSweeper {
    pub fn new(registry: Arc<RegistryService>, config: SweeperConfig) -> Self {
        Self {
            registry,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start the sweeper background task.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the sweep loop with graceful shutdown support.
    ///
    /// Ticks never overlap: the loop awaits each cycle, and a tick that fires
    /// while a sweep is still running is skipped rather than queued.
    async fn run(&self) {
        if !self.config.enabled {
            info!("Liveness sweeper is disabled");
            return;
        }

        info!(
            interval_secs = self.config.interval.as_secs(),
            window_secs = self.registry.liveness_window().num_seconds(),
            "Starting liveness sweeper background task"
        );

        let mut tick = interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let expired = self.registry.sweep(Utc::now());
                    if expired.is_empty() {
                        debug!("Sweep cycle completed, nothing stale");
                    } else {
                        info!(expired = expired.len(), "Sweep cycle expired stale entities");
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping liveness sweeper");
                    break;
                }
            }
        }

        info!("Liveness sweeper background task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::RegistryConfig;
    use crate::domain::registration::{Capability, Endpoint, EntityId, EntityKind, NewRegistration};
    use std::collections::BTreeSet;

    fn registry_with_window(window: Duration) -> Arc<RegistryService> {
        Arc::new(RegistryService::new(RegistryConfig {
            liveness_window: window,
        }))
    }

    fn request(id: &str) -> NewRegistration {
        NewRegistration {
            id: EntityId::new(id),
            kind: EntityKind::Tool,
            name: id.to_string(),
            description: String::new(),
            version: "1.0.0".to_string(),
            capabilities: vec![Capability {
                name: "add".to_string(),
                description: String::new(),
                parameters: serde_json::Value::Null,
                returns: serde_json::Value::Null,
            }],
            endpoint: Endpoint::new("localhost", 9000),
            tags: BTreeSet::new(),
            exempt: false,
            reset_heartbeat: true,
        }
    }

    #[tokio::test]
    async fn sweeper_expires_stale_records() {
        let registry = registry_with_window(Duration::from_millis(20));
        registry.register(request("calc-1")).unwrap();

        let sweeper = Arc::new(LivenessSweeper::new(
            Arc::clone(&registry),
            SweeperConfig {
                interval: Duration::from_millis(10),
                enabled: true,
            },
        ));
        let token = sweeper.shutdown_token();
        let handle = Arc::clone(&sweeper).start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        handle.await.unwrap();

        assert!(registry.get(&EntityId::new("calc-1")).is_err());
        assert!(registry.find_by_capability("add").is_empty());
    }

    #[tokio::test]
    async fn heartbeating_record_survives_sweeps() {
        let registry = registry_with_window(Duration::from_millis(80));
        registry.register(request("calc-1")).unwrap();

        let sweeper = Arc::new(LivenessSweeper::new(
            Arc::clone(&registry),
            SweeperConfig {
                interval: Duration::from_millis(10),
                enabled: true,
            },
        ));
        let token = sweeper.shutdown_token();
        let handle = Arc::clone(&sweeper).start();

        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            registry.heartbeat(&EntityId::new("calc-1")).unwrap();
        }

        token.cancel();
        handle.await.unwrap();

        assert!(registry.get(&EntityId::new("calc-1")).is_ok());
        assert_eq!(registry.find_by_capability("add").len(), 1);
    }

    #[tokio::test]
    async fn disabled_sweeper_exits_immediately() {
        let registry = registry_with_window(Duration::from_millis(1));
        registry.register(request("calc-1")).unwrap();

        let sweeper = Arc::new(LivenessSweeper::new(
            Arc::clone(&registry),
            SweeperConfig {
                interval: Duration::from_millis(5),
                enabled: false,
            },
        ));
        let handle = Arc::clone(&sweeper).start();
        handle.await.unwrap();

        // Nothing was swept; the record is merely stale.
        assert!(registry.get(&EntityId::new("calc-1")).is_ok());
    }
}
