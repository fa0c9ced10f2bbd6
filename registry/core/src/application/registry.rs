// Copyright (c) 2026 Meridian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Registry Store — authoritative mapping of entity id to registration record.
//!
//! The record map and the capability index live behind one lock, so every
//! mutation updates both in the same critical section: a reader can never
//! observe an index entry for a record that is gone, or a half-replaced
//! capability set. Reads take the shared lock and see either the pre- or
//! post-state of a record, never a torn intermediate.
//!
//! The process is the single logical authority for this state. There is no
//! replication: on restart everything is gone and providers re-establish
//! their registrations through their heartbeat loops.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::application::capability_index::CapabilityIndex;
use crate::domain::error::RegistryError;
use crate::domain::registration::{
    EntityId, EntityKind, Liveness, NewRegistration, RegistrationRecord,
};

/// Store configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum allowed gap between heartbeats before a tracked record is
    /// considered stale. Providers heartbeat roughly every 30s, so 60s
    /// tolerates one missed beat.
    pub liveness_window: StdDuration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            liveness_window: StdDuration::from_secs(60),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    records: HashMap<EntityId, RegistrationRecord>,
    index: CapabilityIndex,
}

/// Optional filters for [`RegistryService::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub kind: Option<EntityKind>,
    pub tag: Option<String>,
}

/// Point-in-time snapshot of the store, for the stats endpoint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub live: usize,
    pub agents: usize,
    pub tools: usize,
    pub exempt: usize,
    pub capabilities: usize,
}

pub struct RegistryService {
    state: RwLock<RegistryState>,
    window: Duration,
}

impl RegistryService {
    pub fn new(config: RegistryConfig) -> Self {
        let window = Duration::from_std(config.liveness_window)
            .unwrap_or_else(|_| Duration::seconds(60));
        Self {
            state: RwLock::new(RegistryState::default()),
            window,
        }
    }

    pub fn liveness_window(&self) -> Duration {
        self.window
    }

    /// Insert or fully replace the record keyed by the request id.
    ///
    /// An existing id is an update, not an error: metadata is replaced
    /// wholesale and the capability index is rebuilt for that id in the same
    /// critical section. Returns the stored record.
    pub fn register(
        &self,
        request: NewRegistration,
    ) -> Result<RegistrationRecord, RegistryError> {
        request.validate()?;

        let now = Utc::now();
        let mut state = self.state.write();

        let previous = state.records.get(&request.id).cloned();
        let record = request.into_record(previous.as_ref(), now);

        state.index.replace(&record.id, &record.capabilities);
        state.records.insert(record.id.clone(), record.clone());

        metrics::gauge!("registry_entities").set(state.records.len() as f64);
        info!(
            id = %record.id,
            kind = ?record.kind,
            capabilities = record.capabilities.len(),
            replaced = previous.is_some(),
            "Registered entity"
        );

        Ok(record)
    }

    /// Update the heartbeat timestamp only. Metadata is untouched.
    ///
    /// A record the sweeper has already removed is not resurrected: the call
    /// fails `NotFound` and the provider is expected to re-register. Exempt
    /// records acknowledge the call as a no-op.
    pub fn heartbeat(&self, id: &EntityId) -> Result<(), RegistryError> {
        let mut state = self.state.write();
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        record.touch(Utc::now());
        debug!(id = %id, "Heartbeat acknowledged");
        Ok(())
    }

    pub fn get(&self, id: &EntityId) -> Result<RegistrationRecord, RegistryError> {
        let state = self.state.read();
        state
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Records whose heartbeat is within the liveness window (or exempt),
    /// optionally filtered by kind and tag.
    pub fn list(&self, filter: &ListFilter) -> Vec<RegistrationRecord> {
        let now = Utc::now();
        let state = self.state.read();
        state
            .records
            .values()
            .filter(|r| r.is_live(self.window, now))
            .filter(|r| filter.kind.map_or(true, |k| r.kind == k))
            .filter(|r| {
                filter
                    .tag
                    .as_ref()
                    .map_or(true, |tag| r.tags.contains(tag))
            })
            .cloned()
            .collect()
    }

    /// Currently-live providers of `capability`, in registration order.
    ///
    /// The index carries no timestamps, so liveness is checked against the
    /// store here at query time. A stale provider disappears from the result
    /// the moment its window lapses, even before the sweeper runs.
    pub fn find_by_capability(&self, capability: &str) -> Vec<RegistrationRecord> {
        let now = Utc::now();
        let state = self.state.read();
        state
            .index
            .providers(capability)
            .iter()
            .filter_map(|id| state.records.get(id))
            .filter(|r| r.is_live(self.window, now))
            .cloned()
            .collect()
    }

    /// First-registered-wins tie-break for callers that need exactly one
    /// provider. Callers needing load distribution must round-robin over
    /// [`Self::find_by_capability`] themselves.
    pub fn first_provider(&self, capability: &str) -> Option<RegistrationRecord> {
        self.find_by_capability(capability).into_iter().next()
    }

    /// Remove the record and its index entries. Idempotent: removing an
    /// absent id reports `false` rather than an error.
    pub fn unregister(&self, id: &EntityId) -> bool {
        let mut state = self.state.write();
        let removed = Self::remove_locked(&mut state, id);
        if removed {
            metrics::gauge!("registry_entities").set(state.records.len() as f64);
            info!(id = %id, "Unregistered entity");
        }
        removed
    }

    /// Expire tracked records whose heartbeat age exceeds the window.
    ///
    /// Candidates are collected under a read lock; each is then re-checked
    /// and removed under its own short write lock, so a heartbeat racing the
    /// sweep wins and no global lock is held for the whole scan. Removal goes
    /// through the same path as explicit unregister, keeping the capability
    /// index consistent.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<EntityId> {
        let candidates: Vec<EntityId> = {
            let state = self.state.read();
            state
                .records
                .values()
                .filter(|r| !r.liveness.is_exempt() && !r.is_live(self.window, now))
                .map(|r| r.id.clone())
                .collect()
        };

        let mut expired = Vec::new();
        for id in candidates {
            let mut state = self.state.write();
            let still_stale = state
                .records
                .get(&id)
                .map(|r| !r.liveness.is_exempt() && !r.is_live(self.window, now))
                .unwrap_or(false);
            if still_stale && Self::remove_locked(&mut state, &id) {
                metrics::gauge!("registry_entities").set(state.records.len() as f64);
                info!(id = %id, "Expired stale entity");
                expired.push(id);
            }
        }

        if !expired.is_empty() {
            metrics::counter!("registry_expired_total").increment(expired.len() as u64);
        }
        expired
    }

    pub fn stats(&self) -> RegistryStats {
        let now = Utc::now();
        let state = self.state.read();
        let records = state.records.values();
        RegistryStats {
            total: state.records.len(),
            live: records.clone().filter(|r| r.is_live(self.window, now)).count(),
            agents: records
                .clone()
                .filter(|r| r.kind == EntityKind::Agent)
                .count(),
            tools: records
                .clone()
                .filter(|r| r.kind == EntityKind::Tool)
                .count(),
            exempt: records
                .filter(|r| matches!(r.liveness, Liveness::Exempt))
                .count(),
            capabilities: state.index.capability_count(),
        }
    }

    fn remove_locked(state: &mut RegistryState, id: &EntityId) -> bool {
        match state.records.remove(id) {
            Some(_) => {
                state.index.remove(id);
                true
            }
            None => false,
        }
    }
}

impl Default for RegistryService {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::registration::{Capability, Endpoint};
    use std::collections::BTreeSet;

    fn capability(name: &str) -> Capability {
        Capability {
            name: name.to_string(),
            description: String::new(),
            parameters: serde_json::Value::Null,
            returns: serde_json::Value::Null,
        }
    }

    fn request(id: &str, kind: EntityKind, caps: &[&str]) -> NewRegistration {
        NewRegistration {
            id: EntityId::new(id),
            kind,
            name: id.to_string(),
            description: String::new(),
            version: "1.0.0".to_string(),
            capabilities: caps.iter().map(|c| capability(c)).collect(),
            endpoint: Endpoint::new("localhost", 9000),
            tags: BTreeSet::new(),
            exempt: false,
            reset_heartbeat: true,
        }
    }

    fn short_window() -> RegistryService {
        RegistryService::new(RegistryConfig {
            liveness_window: StdDuration::from_secs(60),
        })
    }

    #[test]
    fn register_then_get() {
        let registry = short_window();
        let stored = registry
            .register(request("calc-1", EntityKind::Tool, &["add"]))
            .unwrap();
        assert_eq!(stored.id, EntityId::new("calc-1"));

        let fetched = registry.get(&EntityId::new("calc-1")).unwrap();
        assert_eq!(fetched, stored);
    }

    #[test]
    fn register_rejects_invalid_record() {
        let registry = short_window();
        let mut req = request("calc-1", EntityKind::Tool, &[]);
        req.capabilities.clear();
        assert!(matches!(
            registry.register(req),
            Err(RegistryError::InvalidRecord(_))
        ));
    }

    #[test]
    fn reregister_replaces_capabilities_atomically() {
        let registry = short_window();
        registry
            .register(request("calc-1", EntityKind::Tool, &["add", "subtract"]))
            .unwrap();
        registry
            .register(request("calc-1", EntityKind::Tool, &["multiply"]))
            .unwrap();

        assert!(registry.find_by_capability("add").is_empty());
        assert!(registry.find_by_capability("subtract").is_empty());
        let providers = registry.find_by_capability("multiply");
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].id, EntityId::new("calc-1"));
    }

    #[test]
    fn heartbeat_unknown_id_is_not_found() {
        let registry = short_window();
        assert!(matches!(
            registry.heartbeat(&EntityId::new("ghost")),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn unregister_is_idempotent_and_clears_index() {
        let registry = short_window();
        registry
            .register(request("calc-1", EntityKind::Tool, &["add"]))
            .unwrap();

        assert!(registry.unregister(&EntityId::new("calc-1")));
        assert!(!registry.unregister(&EntityId::new("calc-1")));
        assert!(registry.find_by_capability("add").is_empty());
        assert!(registry.get(&EntityId::new("calc-1")).is_err());
    }

    #[test]
    fn stale_provider_hidden_before_sweep() {
        let registry = RegistryService::new(RegistryConfig {
            liveness_window: StdDuration::from_secs(0),
        });
        registry
            .register(request("calc-1", EntityKind::Tool, &["add"]))
            .unwrap();

        std::thread::sleep(StdDuration::from_millis(5));
        // Window already lapsed; query-time liveness filtering hides the
        // record even though the sweeper has not run.
        assert!(registry.find_by_capability("add").is_empty());
        assert!(registry.list(&ListFilter::default()).is_empty());
        // The record itself is still present until swept.
        assert!(registry.get(&EntityId::new("calc-1")).is_ok());
    }

    #[test]
    fn sweep_removes_stale_records_and_index_entries() {
        let registry = short_window();
        registry
            .register(request("calc-1", EntityKind::Tool, &["add"]))
            .unwrap();
        registry
            .register(request("fresh", EntityKind::Agent, &["plan"]))
            .unwrap();

        let future = Utc::now() + Duration::seconds(120);
        // Keep "fresh" alive into the future sweep instant.
        {
            let mut state = registry.state.write();
            state
                .records
                .get_mut(&EntityId::new("fresh"))
                .unwrap()
                .touch(future);
        }

        let expired = registry.sweep(future);
        assert_eq!(expired, vec![EntityId::new("calc-1")]);
        assert!(registry.get(&EntityId::new("calc-1")).is_err());
        assert!(registry.find_by_capability("add").is_empty());
        assert!(registry.get(&EntityId::new("fresh")).is_ok());

        // Heartbeat after expiry is rejected; a fresh register succeeds.
        assert!(matches!(
            registry.heartbeat(&EntityId::new("calc-1")),
            Err(RegistryError::NotFound(_))
        ));
        assert!(registry
            .register(request("calc-1", EntityKind::Tool, &["add"]))
            .is_ok());
        assert_eq!(registry.find_by_capability("add").len(), 1);
    }

    #[test]
    fn sweep_never_touches_exempt_records() {
        let registry = short_window();
        let mut req = request("ext-tool", EntityKind::Tool, &["lookup"]);
        req.exempt = true;
        registry.register(req).unwrap();

        let far_future = Utc::now() + Duration::days(30);
        assert!(registry.sweep(far_future).is_empty());
        assert_eq!(registry.find_by_capability("lookup").len(), 1);
    }

    #[test]
    fn heartbeat_on_exempt_record_is_acknowledged() {
        let registry = short_window();
        let mut req = request("ext-tool", EntityKind::Tool, &["lookup"]);
        req.exempt = true;
        registry.register(req).unwrap();

        assert!(registry.heartbeat(&EntityId::new("ext-tool")).is_ok());
        let record = registry.get(&EntityId::new("ext-tool")).unwrap();
        assert_eq!(record.liveness, Liveness::Exempt);
    }

    #[test]
    fn list_filters_by_kind_and_tag() {
        let registry = short_window();
        let mut agent = request("planner", EntityKind::Agent, &["plan"]);
        agent.tags.insert("llm".to_string());
        registry.register(agent).unwrap();
        registry
            .register(request("calc-1", EntityKind::Tool, &["add"]))
            .unwrap();

        let agents = registry.list(&ListFilter {
            kind: Some(EntityKind::Agent),
            tag: None,
        });
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].id, EntityId::new("planner"));

        let tagged = registry.list(&ListFilter {
            kind: None,
            tag: Some("llm".to_string()),
        });
        assert_eq!(tagged.len(), 1);

        let missing = registry.list(&ListFilter {
            kind: None,
            tag: Some("gpu".to_string()),
        });
        assert!(missing.is_empty());
    }

    #[test]
    fn first_provider_is_first_registered() {
        let registry = short_window();
        registry
            .register(request("calc-1", EntityKind::Tool, &["add"]))
            .unwrap();
        registry
            .register(request("calc-2", EntityKind::Tool, &["add"]))
            .unwrap();

        let first = registry.first_provider("add").unwrap();
        assert_eq!(first.id, EntityId::new("calc-1"));
    }

    #[test]
    fn concurrent_writers_to_distinct_ids_stay_consistent() {
        use std::sync::Arc;

        let registry = Arc::new(short_window());
        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                let id = format!("worker-{i}");
                for _ in 0..50 {
                    registry
                        .register(request(&id, EntityKind::Agent, &["work"]))
                        .unwrap();
                    registry.heartbeat(&EntityId::new(&id)).unwrap();
                    registry.unregister(&EntityId::new(&id));
                }
                registry
                    .register(request(&id, EntityKind::Agent, &["work"]))
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let providers = registry.find_by_capability("work");
        assert_eq!(providers.len(), 8);
        let stats = registry.stats();
        assert_eq!(stats.total, 8);
        assert_eq!(stats.capabilities, 1);
    }

    #[test]
    fn stats_counts_kinds_and_exemptions() {
        let registry = short_window();
        registry
            .register(request("planner", EntityKind::Agent, &["plan"]))
            .unwrap();
        let mut ext = request("ext-tool", EntityKind::Tool, &["lookup"]);
        ext.exempt = true;
        registry.register(ext).unwrap();

        let stats = registry.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.agents, 1);
        assert_eq!(stats.tools, 1);
        assert_eq!(stats.exempt, 1);
        assert_eq!(stats.capabilities, 2);
    }
}
