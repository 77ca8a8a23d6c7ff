// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Coach-Sync API Server
//!
//! Connects mentee accounts to Strava and keeps their activities in sync
//! for the coaching platform.

use coach_sync::{
    clock::SystemClock,
    config::{Config, StorageBackend},
    db::{FirestoreDb, Storage},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Coach-Sync API");

    let storage = match config.storage_backend {
        StorageBackend::Firestore => Storage::firestore(FirestoreDb::new(&config.gcp_project_id).await?),
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Storage::memory()
        }
    };

    let state = Arc::new(AppState::build(
        config.clone(),
        storage,
        Arc::new(SystemClock),
    )?);

    if config.auto_sync_enabled {
        state.scheduler().spawn();
    } else {
        tracing::info!("Scheduled sync disabled");
    }

    let app = coach_sync::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("coach_sync=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
