// Copyright (c) 2026 Meridian Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod registration;
pub mod events;
pub mod error;

pub use registration::{
    Capability, Endpoint, EntityId, EntityKind, Liveness, NewRegistration, RegistrationRecord,
};
pub use events::{ExecutionEvent, ExecutionId, NodeId, StepStatus, WorkflowId};
pub use error::RegistryError;
