// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod integration;
pub mod oauth;
pub mod scheduler;
pub mod strava;
pub mod sync;
pub mod webhook;

pub use integration::{ConnectOutcome, IntegrationService};
pub use oauth::OAuthClient;
pub use scheduler::SyncScheduler;
pub use strava::StravaClient;
pub use sync::{SyncEngine, SyncOutcome, SyncSummary};
pub use webhook::{WebhookEvent, WebhookHandler};
