// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Walk tracking session.
//!
//! A `WalkTracker` owns at most one walk at a time:
//! 1. `start()` checks the location service and permission, then subscribes
//!    to the position stream and starts a 1 s elapsed-time tick
//! 2. Fixes received while active are appended and their great-circle
//!    distance from the previous fix is added to the running total
//! 3. `pause()`/`resume()` freeze and unfreeze the clock; fixes that arrive
//!    while paused are dropped
//! 4. `complete()` tears the session down and hands back a `WalkResult`;
//!    `cancel()` tears it down and discards everything
//!
//! The stream subscription and the tick task are aborted on every exit path,
//! including drop.

use crate::models::{PositionSample, WalkResult};
use crate::services::location::{
    distance_between, LocationPermission, LocationProvider, LocationSettings,
};
use crate::time_utils::Clock;
use chrono::{DateTime, Duration, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Interval between elapsed-time notifications while active.
const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// Lifecycle of a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkStatus {
    #[default]
    Idle,
    Active,
    Paused,
    /// Only seen by listeners, as the final snapshot of a finished walk.
    Completed,
}

/// Point-in-time view of the session broadcast to listeners.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WalkSnapshot {
    pub status: WalkStatus,
    pub distance_meters: f64,
    pub position_count: usize,
    pub elapsed_seconds: i64,
}

/// Reasons a walk cannot start.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location permission permanently denied; enable it in system settings")]
    PermissionDeniedForever,

    #[error("Location services are disabled")]
    ServiceDisabled,
}

/// Mutable state of the walk in progress.
#[derive(Debug, Default)]
struct WalkState {
    status: WalkStatus,
    /// Incremented on every start so stale stream tasks can be ignored
    generation: u64,
    start_time: Option<DateTime<Utc>>,
    pause_time: Option<DateTime<Utc>>,
    total_paused: Duration,
    positions: Vec<PositionSample>,
    total_distance_meters: f64,
}

impl WalkState {
    fn begin(&mut self, now: DateTime<Utc>) {
        *self = Self {
            status: WalkStatus::Active,
            generation: self.generation + 1,
            start_time: Some(now),
            ..Default::default()
        };
    }

    fn reset(&mut self) {
        *self = Self {
            generation: self.generation,
            ..Default::default()
        };
    }

    /// Accumulate one fix. Returns `false` if it was ignored.
    fn record(&mut self, sample: PositionSample) -> bool {
        if self.status != WalkStatus::Active {
            return false;
        }
        if let Some(previous) = self.positions.last() {
            self.total_distance_meters += distance_between(previous, &sample);
        }
        self.positions.push(sample);
        true
    }

    fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let Some(start) = self.start_time else {
            return Duration::zero();
        };
        let until = match self.status {
            WalkStatus::Paused => self.pause_time.unwrap_or(now),
            _ => now,
        };
        (until - start - self.total_paused).max(Duration::zero())
    }

    fn snapshot(&self, now: DateTime<Utc>) -> WalkSnapshot {
        WalkSnapshot {
            status: self.status,
            distance_meters: self.total_distance_meters,
            position_count: self.positions.len(),
            elapsed_seconds: self.elapsed(now).num_seconds(),
        }
    }
}

/// Tracks one walk at a time from a device position stream.
pub struct WalkTracker<L: LocationProvider> {
    location: Arc<L>,
    clock: Arc<dyn Clock>,
    settings: LocationSettings,
    state: Arc<Mutex<WalkState>>,
    updates: Arc<watch::Sender<WalkSnapshot>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

fn lock(state: &Mutex<WalkState>) -> MutexGuard<'_, WalkState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<L: LocationProvider> WalkTracker<L> {
    pub fn new(location: Arc<L>, clock: Arc<dyn Clock>) -> Self {
        Self::with_settings(location, clock, LocationSettings::default())
    }

    pub fn with_settings(
        location: Arc<L>,
        clock: Arc<dyn Clock>,
        settings: LocationSettings,
    ) -> Self {
        let (updates, _) = watch::channel(WalkSnapshot::default());
        Self {
            location,
            clock,
            settings,
            state: Arc::new(Mutex::new(WalkState::default())),
            updates: Arc::new(updates),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start a walk.
    ///
    /// Calling this while a walk is already in progress succeeds without
    /// touching the current walk.
    pub async fn start(&self) -> Result<(), WalkError> {
        if self.status() != WalkStatus::Idle {
            return Ok(());
        }

        if !self.location.is_service_enabled().await {
            tracing::info!("Walk not started: location services disabled");
            return Err(WalkError::ServiceDisabled);
        }

        let permission = match self.location.check_permission().await {
            LocationPermission::Denied => self.location.request_permission().await,
            other => other,
        };
        match permission {
            LocationPermission::Granted => {}
            LocationPermission::Denied => {
                tracing::info!("Walk not started: location permission denied");
                return Err(WalkError::PermissionDenied);
            }
            LocationPermission::DeniedForever => {
                tracing::info!("Walk not started: location permission denied forever");
                return Err(WalkError::PermissionDeniedForever);
            }
        }

        let now = self.clock.now();
        let generation = {
            let mut state = lock(&self.state);
            // Another start() may have won while we awaited the provider
            if state.status != WalkStatus::Idle {
                return Ok(());
            }
            state.begin(now);
            self.updates.send_replace(state.snapshot(now));
            state.generation
        };

        self.abort_tasks();
        let positions = self.spawn_position_task(generation);
        let ticker = self.spawn_tick_task(generation);
        self.tasks_guard().extend([positions, ticker]);

        tracing::info!(generation, "Walk started");
        Ok(())
    }

    fn spawn_position_task(&self, generation: u64) -> JoinHandle<()> {
        let mut stream = self.location.position_stream(self.settings);
        let state = Arc::clone(&self.state);
        let updates = Arc::clone(&self.updates);
        let clock = Arc::clone(&self.clock);

        tokio::spawn(async move {
            while let Some(sample) = stream.next().await {
                let mut guard = lock(&state);
                if guard.generation != generation {
                    break;
                }
                if guard.record(sample) {
                    updates.send_replace(guard.snapshot(clock.now()));
                }
            }
            tracing::debug!(generation, "Position stream ended");
        })
    }

    fn spawn_tick_task(&self, generation: u64) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let updates = Arc::clone(&self.updates);
        let clock = Arc::clone(&self.clock);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                let guard = lock(&state);
                if guard.generation != generation {
                    break;
                }
                if guard.status == WalkStatus::Active {
                    updates.send_replace(guard.snapshot(clock.now()));
                }
            }
        })
    }

    /// Freeze the walk clock. Returns `false` unless a walk was active.
    pub fn pause(&self) -> bool {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        if state.status != WalkStatus::Active {
            return false;
        }
        state.status = WalkStatus::Paused;
        state.pause_time = Some(now);
        self.updates.send_replace(state.snapshot(now));
        tracing::debug!("Walk paused");
        true
    }

    /// Unfreeze the walk clock. Returns `false` unless a walk was paused.
    pub fn resume(&self) -> bool {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        if state.status != WalkStatus::Paused {
            return false;
        }
        if let Some(paused_at) = state.pause_time.take() {
            state.total_paused = state.total_paused + (now - paused_at).max(Duration::zero());
        }
        state.status = WalkStatus::Active;
        self.updates.send_replace(state.snapshot(now));
        tracing::debug!("Walk resumed");
        true
    }

    /// Finish the walk and return its result, or `None` if idle.
    pub fn complete(&self) -> Option<WalkResult> {
        let now = self.clock.now();
        let result = {
            let mut state = lock(&self.state);
            let start_time = match (state.status, state.start_time) {
                (WalkStatus::Active | WalkStatus::Paused, Some(start)) => start,
                _ => return None,
            };

            let result = WalkResult {
                distance_meters: state.total_distance_meters,
                duration_seconds: state.elapsed(now).num_seconds().max(0) as u64,
                position_count: state.positions.len(),
                start_time,
                end_time: now,
            };

            let mut last = state.snapshot(now);
            last.status = WalkStatus::Completed;
            state.reset();
            self.updates.send_replace(last);
            result
        };

        self.abort_tasks();
        tracing::info!(
            distance_meters = result.distance_meters,
            duration_seconds = result.duration_seconds,
            positions = result.position_count,
            verified = result.is_verified(),
            "Walk completed"
        );
        Some(result)
    }

    /// Abandon the walk without producing a result.
    pub fn cancel(&self) {
        let was_running = {
            let mut state = lock(&self.state);
            let was_running = state.status != WalkStatus::Idle;
            state.reset();
            self.updates.send_replace(WalkSnapshot::default());
            was_running
        };
        self.abort_tasks();
        if was_running {
            tracing::info!("Walk cancelled");
        }
    }

    pub fn status(&self) -> WalkStatus {
        lock(&self.state).status
    }

    /// Walking time so far, excluding pauses.
    pub fn elapsed(&self) -> Duration {
        let now = self.clock.now();
        lock(&self.state).elapsed(now)
    }

    pub fn distance_meters(&self) -> f64 {
        lock(&self.state).total_distance_meters
    }

    pub fn positions(&self) -> Vec<PositionSample> {
        lock(&self.state).positions.clone()
    }

    pub fn snapshot(&self) -> WalkSnapshot {
        let now = self.clock.now();
        lock(&self.state).snapshot(now)
    }

    /// Listen for status, distance and elapsed-time changes.
    pub fn subscribe(&self) -> watch::Receiver<WalkSnapshot> {
        self.updates.subscribe()
    }

    fn tasks_guard(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn abort_tasks(&self) {
        for task in self.tasks_guard().drain(..) {
            task.abort();
        }
    }
}

impl<L: LocationProvider> Drop for WalkTracker<L> {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}
