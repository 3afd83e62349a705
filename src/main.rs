// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! PetPal-Tracker API Server
//!
//! Serves dog gamification records and accepts verified walks, crediting XP
//! through the anti-cheat ledger.

use petpal_tracker::{
    config::Config, db::FirestoreDb, time_utils::SystemClock, AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        day_offset_minutes = config.day_policy.offset_minutes(),
        store_timeout_ms = config.store_timeout.as_millis() as u64,
        "Starting PetPal-Tracker API"
    );

    let db = if config.use_in_memory_store {
        tracing::warn!("Using in-memory store; state is lost on restart");
        FirestoreDb::new_in_memory()
    } else {
        FirestoreDb::new(&config.gcp_project_id).await?
    };

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), db, Arc::new(SystemClock)));

    // Build router
    let app = petpal_tracker::routes::create_router(state);

    // Start server
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
                .add_directive("petpal_tracker=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .try_init()?;
    Ok(())
}
