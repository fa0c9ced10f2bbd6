// Copyright (c) 2026 Meridian Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod event_hub;

pub use event_hub::{EventHub, HubConfig, Subscription};
