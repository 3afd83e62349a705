// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Walk session lifecycle tests.
//!
//! Drive a `WalkTracker` with a scripted location provider and a manual
//! clock to check permission handling, distance accumulation and pause
//! accounting.

mod common;

use chrono::Duration;
use common::{morning, wait_until, FakeLocation};
use petpal_tracker::models::PositionSample;
use petpal_tracker::services::location::distance_between;
use petpal_tracker::services::{LocationPermission, WalkError, WalkStatus, WalkTracker};
use petpal_tracker::time_utils::{Clock, ManualClock};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::timeout;

/// Longest wait for a tick-driven snapshot.
const TICK_WAIT: std::time::Duration = std::time::Duration::from_secs(3);

fn tracker(location: Arc<FakeLocation>) -> (WalkTracker<FakeLocation>, ManualClock) {
    let clock = ManualClock::new(morning());
    (WalkTracker::new(location, Arc::new(clock.clone())), clock)
}

fn fix(clock: &ManualClock, lat: f64, lon: f64) -> PositionSample {
    PositionSample::new(lat, lon, clock.now())
}

#[tokio::test]
async fn test_start_fails_when_service_disabled() {
    let location = FakeLocation::granted();
    location.service_enabled.store(false, Ordering::SeqCst);
    let (walk, _) = tracker(location.clone());

    assert_eq!(walk.start().await, Err(WalkError::ServiceDisabled));
    assert_eq!(walk.status(), WalkStatus::Idle);
    assert_eq!(location.streams_opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_start_prompts_once_when_denied() {
    let location =
        FakeLocation::with_permission(LocationPermission::Denied, LocationPermission::Denied);
    let (walk, _) = tracker(location.clone());

    assert_eq!(walk.start().await, Err(WalkError::PermissionDenied));
    assert_eq!(location.prompts.load(Ordering::SeqCst), 1);
    assert_eq!(walk.status(), WalkStatus::Idle);
}

#[tokio::test]
async fn test_start_after_prompt_granted() {
    let location =
        FakeLocation::with_permission(LocationPermission::Denied, LocationPermission::Granted);
    let (walk, _) = tracker(location.clone());

    assert_eq!(walk.start().await, Ok(()));
    assert_eq!(walk.status(), WalkStatus::Active);
    assert_eq!(location.prompts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_denied_forever_does_not_prompt() {
    let location = FakeLocation::with_permission(
        LocationPermission::DeniedForever,
        LocationPermission::Granted,
    );
    let (walk, _) = tracker(location.clone());

    assert_eq!(walk.start().await, Err(WalkError::PermissionDeniedForever));
    assert_eq!(location.prompts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let location = FakeLocation::granted();
    let (walk, clock) = tracker(location.clone());

    walk.start().await.unwrap();
    location.send(fix(&clock, 37.0, -122.0));
    assert!(wait_until(|| walk.positions().len() == 1).await);

    walk.start().await.unwrap();
    assert_eq!(walk.status(), WalkStatus::Active);
    assert_eq!(walk.positions().len(), 1);
    assert_eq!(location.streams_opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_distance_is_sum_of_segments() {
    let location = FakeLocation::granted();
    let (walk, clock) = tracker(location.clone());
    walk.start().await.unwrap();

    let path = [
        fix(&clock, 37.0, -122.0),
        fix(&clock, 37.0005, -122.0),
        fix(&clock, 37.0005, -122.0005),
    ];
    for sample in path {
        location.send(sample);
    }
    assert!(wait_until(|| walk.positions().len() == 3).await);

    let expected = distance_between(&path[0], &path[1]) + distance_between(&path[1], &path[2]);
    assert!((walk.distance_meters() - expected).abs() < 1e-6);
}

#[tokio::test]
async fn test_fixes_while_paused_are_dropped() {
    let location = FakeLocation::granted();
    let (walk, clock) = tracker(location.clone());
    walk.start().await.unwrap();

    location.send(fix(&clock, 37.0, -122.0));
    assert!(wait_until(|| walk.positions().len() == 1).await);

    assert!(walk.pause());
    // Far away; would add kilometers if it were counted
    location.send(fix(&clock, 38.0, -122.0));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(walk.positions().len(), 1);

    assert!(walk.resume());
    let next = fix(&clock, 37.0002, -122.0);
    location.send(next);
    assert!(wait_until(|| walk.positions().len() == 2).await);

    let first = walk.positions()[0];
    assert!((walk.distance_meters() - distance_between(&first, &next)).abs() < 1e-6);
}

#[tokio::test]
async fn test_elapsed_excludes_paused_time() {
    let (walk, clock) = tracker(FakeLocation::granted());
    walk.start().await.unwrap();

    clock.advance(Duration::seconds(120));
    assert!(walk.pause());

    clock.advance(Duration::seconds(600));
    assert_eq!(walk.elapsed(), Duration::seconds(120));

    assert!(walk.resume());
    clock.advance(Duration::seconds(30));
    assert_eq!(walk.elapsed(), Duration::seconds(150));

    let result = walk.complete().unwrap();
    assert_eq!(result.duration_seconds, 150);
    assert_eq!(result.start_time, morning());
    assert_eq!(result.end_time, morning() + Duration::seconds(750));
}

#[tokio::test]
async fn test_pause_and_resume_require_matching_state() {
    let (walk, _) = tracker(FakeLocation::granted());
    assert!(!walk.pause());
    assert!(!walk.resume());

    walk.start().await.unwrap();
    assert!(!walk.resume());
    assert!(walk.pause());
    assert!(!walk.pause());
    assert_eq!(walk.status(), WalkStatus::Paused);
}

#[tokio::test]
async fn test_complete_when_idle_is_none() {
    let (walk, _) = tracker(FakeLocation::granted());
    assert!(walk.complete().is_none());
}

#[tokio::test]
async fn test_complete_while_paused_returns_result() {
    let location = FakeLocation::granted();
    let (walk, clock) = tracker(location.clone());
    walk.start().await.unwrap();
    location.send(fix(&clock, 37.0, -122.0));
    assert!(wait_until(|| walk.positions().len() == 1).await);

    clock.advance(Duration::seconds(90));
    walk.pause();
    clock.advance(Duration::seconds(90));

    let result = walk.complete().unwrap();
    assert_eq!(result.duration_seconds, 90);
    assert_eq!(result.position_count, 1);
    assert_eq!(walk.status(), WalkStatus::Idle);
    assert!(walk.positions().is_empty());
}

#[tokio::test]
async fn test_complete_publishes_final_snapshot() {
    let location = FakeLocation::granted();
    let (walk, clock) = tracker(location.clone());
    let mut updates = walk.subscribe();

    walk.start().await.unwrap();
    location.send(fix(&clock, 37.0, -122.0));
    location.send(fix(&clock, 37.001, -122.0));
    assert!(wait_until(|| walk.positions().len() == 2).await);

    let result = walk.complete().unwrap();
    let last = updates.borrow_and_update().clone();
    assert_eq!(last.status, WalkStatus::Completed);
    assert_eq!(last.position_count, 2);
    assert!((last.distance_meters - result.distance_meters).abs() < 1e-9);
}

#[tokio::test]
async fn test_cancel_discards_walk() {
    let location = FakeLocation::granted();
    let (walk, clock) = tracker(location.clone());
    walk.start().await.unwrap();
    location.send(fix(&clock, 37.0, -122.0));
    assert!(wait_until(|| walk.positions().len() == 1).await);

    walk.cancel();
    assert_eq!(walk.status(), WalkStatus::Idle);
    assert!(walk.complete().is_none());

    // Old subscription is gone; fixes go nowhere
    assert!(wait_until(|| location.listeners() == 0).await);
    location.send(fix(&clock, 37.001, -122.0));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(walk.positions().is_empty());
    assert_eq!(walk.distance_meters(), 0.0);
}

#[tokio::test]
async fn test_restart_after_complete_starts_fresh() {
    let location = FakeLocation::granted();
    let (walk, clock) = tracker(location.clone());
    walk.start().await.unwrap();
    location.send(fix(&clock, 37.0, -122.0));
    assert!(wait_until(|| walk.positions().len() == 1).await);
    walk.complete().unwrap();

    clock.advance(Duration::minutes(10));
    walk.start().await.unwrap();
    assert_eq!(walk.elapsed(), Duration::zero());
    assert!(walk.positions().is_empty());
    assert_eq!(location.streams_opened.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_complete_releases_position_stream() {
    let location = FakeLocation::granted();
    let (walk, _) = tracker(location.clone());

    walk.start().await.unwrap();
    assert_eq!(location.listeners(), 1);

    walk.complete().unwrap();
    assert!(wait_until(|| location.listeners() == 0).await);
}

#[tokio::test]
async fn test_drop_releases_position_stream() {
    let location = FakeLocation::granted();
    let (walk, _) = tracker(location.clone());

    walk.start().await.unwrap();
    walk.pause();
    assert_eq!(location.listeners(), 1);

    drop(walk);
    assert!(wait_until(|| location.listeners() == 0).await);
}

#[tokio::test]
async fn test_restart_keeps_one_stream() {
    let location = FakeLocation::granted();
    let (walk, _) = tracker(location.clone());

    walk.start().await.unwrap();
    walk.cancel();
    walk.start().await.unwrap();

    assert!(wait_until(|| location.listeners() == 1).await);
    assert_eq!(location.streams_opened.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_tick_publishes_elapsed_while_active() {
    let location = FakeLocation::granted();
    let (walk, clock) = tracker(location.clone());
    let mut updates = walk.subscribe();

    walk.start().await.unwrap();
    clock.advance(Duration::seconds(5));

    // No fixes arrive, so only the tick can report the new elapsed time
    let snapshot = timeout(TICK_WAIT, updates.wait_for(|s| s.elapsed_seconds == 5))
        .await
        .expect("tick never published")
        .unwrap()
        .clone();
    assert_eq!(snapshot.status, WalkStatus::Active);
    assert_eq!(snapshot.position_count, 0);
}

#[tokio::test]
async fn test_tick_is_silent_while_paused_and_after_exit() {
    let location = FakeLocation::granted();
    let (walk, clock) = tracker(location.clone());
    let mut updates = walk.subscribe();

    walk.start().await.unwrap();
    clock.advance(Duration::seconds(5));
    assert!(walk.pause());
    updates.borrow_and_update();

    clock.advance(Duration::seconds(60));
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    assert!(!updates.has_changed().unwrap(), "tick published while paused");

    assert!(walk.resume());
    let resumed = timeout(TICK_WAIT, updates.wait_for(|s| s.status == WalkStatus::Active))
        .await
        .expect("resume never published")
        .unwrap()
        .clone();
    assert_eq!(resumed.elapsed_seconds, 5);

    walk.cancel();
    updates.borrow_and_update();
    clock.advance(Duration::seconds(60));
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    assert!(!updates.has_changed().unwrap(), "tick outlived the walk");
}
