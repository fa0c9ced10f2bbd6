// Copyright (c) 2026 Meridian Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Meridian Registry Core
//!
//! Liveness-tracked capability registry and execution event bus for the
//! Meridian agent framework.
//!
//! # Architecture
//!
//! - **domain** — registration records, capabilities, execution events
//! - **application** — registry service, capability index, liveness sweeper
//! - **infrastructure** — keyed event hub (fanout to dashboard connections)
//! - **presentation** — HTTP/SSE surface (axum)

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
