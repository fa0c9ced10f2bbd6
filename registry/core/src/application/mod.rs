// Copyright (c) 2026 Meridian Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod capability_index;
pub mod registry;
pub mod sweeper;

pub use capability_index::CapabilityIndex;
pub use registry::{ListFilter, RegistryConfig, RegistryService, RegistryStats};
pub use sweeper::{LivenessSweeper, SweeperConfig};
