// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{DateTime, TimeZone, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use petpal_tracker::config::Config;
use petpal_tracker::db::FirestoreDb;
use petpal_tracker::middleware::auth::create_jwt;
use petpal_tracker::models::PositionSample;
use petpal_tracker::routes::create_router;
use petpal_tracker::services::{LocationPermission, LocationProvider, LocationSettings, XpLedger};
use petpal_tracker::time_utils::{DayPolicy, ManualClock};
use petpal_tracker::AppState;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// 2026-05-01 09:00 UTC, a fixed morning for clock-driven tests.
#[allow(dead_code)]
pub fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
}

/// Ledger over a fresh in-memory store with a manual clock.
#[allow(dead_code)]
pub fn test_ledger() -> (XpLedger, ManualClock) {
    let clock = ManualClock::new(morning());
    let ledger = XpLedger::new(
        FirestoreDb::new_in_memory(),
        Arc::new(clock.clone()),
        DayPolicy::utc(),
        Duration::from_secs(5),
    );
    (ledger, clock)
}

/// Create a test app backed by the in-memory store.
/// Returns the router, the shared state and the clock driving the ledger.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, ManualClock) {
    let config = Config::default();
    let clock = ManualClock::new(morning());
    let state = Arc::new(AppState::new(
        config,
        FirestoreDb::new_in_memory(),
        Arc::new(clock.clone()),
    ));

    (create_router(state.clone()), state, clock)
}

/// `Authorization` header value for `user_id` signed with the test key.
#[allow(dead_code)]
pub fn bearer(user_id: &str) -> String {
    let token = create_jwt(user_id, &Config::default().jwt_signing_key).unwrap();
    format!("Bearer {}", token)
}

/// Poll `check` until it holds or a second passes.
#[allow(dead_code)]
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

/// Scriptable location provider.
///
/// Fixes sent with `send` are delivered to every stream opened after the
/// call to `position_stream`.
#[allow(dead_code)]
pub struct FakeLocation {
    pub permission: Mutex<LocationPermission>,
    /// Result of the permission prompt
    pub prompt_result: Mutex<LocationPermission>,
    pub service_enabled: AtomicBool,
    pub prompts: AtomicUsize,
    pub streams_opened: AtomicUsize,
    fixes: broadcast::Sender<PositionSample>,
}

#[allow(dead_code)]
impl FakeLocation {
    pub fn granted() -> Arc<Self> {
        let (fixes, _) = broadcast::channel(256);
        Arc::new(Self {
            permission: Mutex::new(LocationPermission::Granted),
            prompt_result: Mutex::new(LocationPermission::Granted),
            service_enabled: AtomicBool::new(true),
            prompts: AtomicUsize::new(0),
            streams_opened: AtomicUsize::new(0),
            fixes,
        })
    }

    pub fn with_permission(permission: LocationPermission, prompt: LocationPermission) -> Arc<Self> {
        let fake = Self::granted();
        *fake.permission.lock().unwrap() = permission;
        *fake.prompt_result.lock().unwrap() = prompt;
        fake
    }

    pub fn send(&self, sample: PositionSample) {
        let _ = self.fixes.send(sample);
    }

    /// Position streams that are still subscribed.
    pub fn listeners(&self) -> usize {
        self.fixes.receiver_count()
    }
}

impl LocationProvider for FakeLocation {
    async fn check_permission(&self) -> LocationPermission {
        *self.permission.lock().unwrap()
    }

    async fn request_permission(&self) -> LocationPermission {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let result = *self.prompt_result.lock().unwrap();
        *self.permission.lock().unwrap() = result;
        result
    }

    async fn is_service_enabled(&self) -> bool {
        self.service_enabled.load(Ordering::SeqCst)
    }

    fn position_stream(&self, _settings: LocationSettings) -> BoxStream<'static, PositionSample> {
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        let rx = self.fixes.subscribe();
        stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(sample) => return Some((sample, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}
