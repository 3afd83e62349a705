// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! PetPal-Tracker: verified dog walks and anti-cheat XP
//!
//! This crate tracks walks from a device location stream, decides whether a
//! walk counts, and credits XP to a dog's gamification record under daily
//! caps that cannot be bypassed by the client.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::XpLedger;
use std::sync::Arc;
use time_utils::Clock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub ledger: XpLedger,
}

impl AppState {
    /// Wire the ledger to `db` using the day policy and timeout from `config`.
    pub fn new(config: Config, db: FirestoreDb, clock: Arc<dyn Clock>) -> Self {
        let ledger = XpLedger::new(
            db.clone(),
            clock,
            config.day_policy,
            config.store_timeout,
        );
        Self { config, db, ledger }
    }
}
