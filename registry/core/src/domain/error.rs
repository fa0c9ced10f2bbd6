// Copyright (c) 2026 Meridian Contributors
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::registration::EntityId;

/// Errors surfaced to registry callers.
///
/// Sweeper expirations and connection shedding are internal steady-state
/// behaviour and deliberately absent here.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Entity not found: {0}")]
    NotFound(EntityId),

    #[error("Invalid registration: {0}")]
    InvalidRecord(String),

    /// Reserved for a future strict create-only registration mode; never
    /// produced under replace-on-register semantics.
    #[error("Conflict: {0}")]
    Conflict(String),
}
