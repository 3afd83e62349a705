// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Completed walk records.
//!
//! `WalkResult::earned_xp` is an estimate for display; the XP ledger
//! applies its own caps when the candidate amount is submitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::PositionSample;
use crate::services::location::path_distance_meters;

/// Minimum GPS fixes for a verified walk.
pub const MIN_VERIFIED_POSITIONS: usize = 3;
/// Minimum distance for a verified walk (meters).
pub const MIN_VERIFIED_DISTANCE_METERS: f64 = 20.0;
/// Minimum duration for a verified walk (seconds).
pub const MIN_VERIFIED_DURATION_SECS: u64 = 60;
/// Upper bound on XP estimated for a single walk.
pub const MAX_WALK_XP: u32 = 100;

/// Outcome of one completed walk.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkResult {
    pub distance_meters: f64,
    /// Walking time with pauses excluded.
    pub duration_seconds: u64,
    pub position_count: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl WalkResult {
    /// Rebuild a result from an uploaded GPS track.
    ///
    /// Samples outside `[start_time, end_time]` and samples older than the
    /// previously accepted one are dropped before distance is summed, so a
    /// replayed or reordered track cannot inflate the total.
    pub fn from_track(
        samples: &[PositionSample],
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        paused_seconds: u64,
    ) -> Self {
        let mut accepted: Vec<PositionSample> = Vec::with_capacity(samples.len());
        for sample in samples {
            if sample.timestamp < start_time || sample.timestamp > end_time {
                continue;
            }
            if accepted
                .last()
                .is_some_and(|prev| sample.timestamp < prev.timestamp)
            {
                continue;
            }
            accepted.push(*sample);
        }

        let wall_secs = (end_time - start_time).num_seconds().max(0) as u64;

        Self {
            distance_meters: path_distance_meters(&accepted),
            duration_seconds: wall_secs.saturating_sub(paused_seconds),
            position_count: accepted.len(),
            start_time,
            end_time,
        }
    }

    pub fn duration_minutes(&self) -> u64 {
        self.duration_seconds / 60
    }

    /// Enough fixes, distance and time to count as a real walk.
    pub fn is_verified(&self) -> bool {
        self.position_count >= MIN_VERIFIED_POSITIONS
            && self.distance_meters >= MIN_VERIFIED_DISTANCE_METERS
            && self.duration_seconds >= MIN_VERIFIED_DURATION_SECS
    }

    /// One XP per minute walked.
    pub fn base_xp(&self) -> u64 {
        self.duration_seconds / 60
    }

    /// One XP per 100 m.
    pub fn distance_bonus(&self) -> u64 {
        (self.distance_meters.max(0.0) / 100.0).floor() as u64
    }

    /// Candidate XP for this walk, clamped to `0..=100`.
    pub fn earned_xp(&self) -> u32 {
        if !self.is_verified() {
            return 0;
        }
        let total = self.base_xp().saturating_add(self.distance_bonus());
        total.min(MAX_WALK_XP as u64) as u32
    }

    pub fn to_record(&self) -> WalkRecord {
        WalkRecord {
            distance_meters: self.distance_meters,
            duration_minutes: self.duration_minutes(),
            duration_seconds: self.duration_seconds,
            position_count: self.position_count as u32,
            start_time: self.start_time,
            end_time: self.end_time,
            is_verified: self.is_verified(),
            earned_xp: self.earned_xp(),
        }
    }
}

/// Serializable form of a `WalkResult` with its derived fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkRecord {
    pub distance_meters: f64,
    pub duration_minutes: u64,
    pub duration_seconds: u64,
    pub position_count: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_verified: bool,
    pub earned_xp: u32,
}

/// Walk history entry stored per dog.
///
/// Stored at: `walks/{dog_key}:{start_unix}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredWalk {
    pub walk_id: String,
    /// Document key of the owning dog (see `DogRef::doc_id`)
    pub dog_key: String,
    /// RFC3339 start time; used for ordering
    pub started_at: String,
    pub record: WalkRecord,
    /// XP the ledger actually credited (0 when rejected or unverified)
    pub credited_xp: u32,
    /// Cap that rejected the award, if any
    pub rejected_by: Option<String>,
    pub recorded_at: String,
}
