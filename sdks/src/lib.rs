//! Meridian Registry SDK
//!
//! Register agents and tools with a Meridian registry and keep the
//! registration alive from a background heartbeat task.

pub mod client;
pub mod heartbeat;

pub use client::{HeartbeatAck, RegistryClient};
pub use heartbeat::{HeartbeatConfig, HeartbeatTask};
pub use meridian_registry_core::domain::registration::{
    Capability, Endpoint, EntityId, EntityKind, NewRegistration, RegistrationRecord,
};
