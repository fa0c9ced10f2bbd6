// Copyright (c) 2026 Meridian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Capability Index — derived lookup from capability name to provider ids.
//!
//! Never authoritative on its own: rebuilt incrementally from registration
//! records and kept consistent with the store inside the store's own critical
//! section. Per-capability provider lists preserve registration order, which
//! is what makes the first-registered-wins tie-break possible for callers
//! that need exactly one provider.

use std::collections::HashMap;

use crate::domain::registration::{Capability, EntityId};

#[derive(Debug, Default)]
pub struct CapabilityIndex {
    /// capability name -> provider ids, in registration order.
    providers: HashMap<String, Vec<EntityId>>,
    /// provider id -> capability names it is currently indexed under.
    owned: HashMap<EntityId, Vec<String>>,
}

impl CapabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every index entry owned by `id` with the new capability set.
    ///
    /// Diff-based: entries for capabilities no longer present are dropped,
    /// new ones appended. An id already present under a retained capability
    /// keeps its original position.
    pub fn replace(&mut self, id: &EntityId, capabilities: &[Capability]) {
        let new_names: Vec<String> = capabilities.iter().map(|c| c.name.clone()).collect();
        let old_names = self.owned.remove(id).unwrap_or_default();

        for name in &old_names {
            if !new_names.contains(name) {
                self.drop_provider(name, id);
            }
        }

        for name in &new_names {
            let entry = self.providers.entry(name.clone()).or_default();
            if !entry.contains(id) {
                entry.push(id.clone());
            }
        }

        self.owned.insert(id.clone(), new_names);
    }

    /// Drop every entry owned by `id`. Idempotent.
    pub fn remove(&mut self, id: &EntityId) {
        if let Some(names) = self.owned.remove(id) {
            for name in names {
                self.drop_provider(&name, id);
            }
        }
    }

    /// Provider ids offering `name`, in registration order. Liveness is the
    /// store's concern; the index carries no timestamps.
    pub fn providers(&self, name: &str) -> &[EntityId] {
        self.providers.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct capability names currently indexed.
    pub fn capability_count(&self) -> usize {
        self.providers.len()
    }

    fn drop_provider(&mut self, name: &str, id: &EntityId) {
        if let Some(entry) = self.providers.get_mut(name) {
            entry.retain(|existing| existing != id);
            if entry.is_empty() {
                self.providers.remove(name);
            }
        }
    }
}
