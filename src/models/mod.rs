// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod activity;
pub mod integration;
pub mod stats;

pub use activity::{Activity, ActivityFilters, ActivityOrder};
pub use integration::{
    AthleteProfile, ConnectionStatus, Integration, IntegrationStatus, PendingAuthorization,
    TokenUpdate,
};
pub use stats::ActivityStats;
