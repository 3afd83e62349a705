// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Anti-cheat XP accrual.
//!
//! The ledger is the only writer of gamification records. Every mutation is
//! a read-modify-write that is:
//! - serialized per dog through an in-process async mutex, and
//! - written as a merge conditional on the version that was read, retried
//!   with fresh data if another writer got there first.
//!
//! Every persistence call is bounded by the configured timeout. A timed-out
//! write is reported as `AppError::Timeout` and never assumed to have
//! succeeded.
//!
//! Walks are settled at most once: the walk's start time is recorded on the
//! gamification record in the same versioned write that credits its XP, so
//! a replayed or retried upload finds it already settled.

use crate::db::{FirestoreDb, MergeOutcome};
use crate::error::{AppError, CapKind, Result};
use crate::models::gamification::{
    is_valid_achievement_id, ACHIEVEMENT_FIELDS, AWARD_FIELDS, MAX_AWARD_XP, STREAK_FIELDS,
    WALK_FIELDS,
};
use crate::models::{
    GamificationRecord, StoredWalk, StreakOutcome, WalkResult, XpAward, XpSource,
};
use crate::time_utils::{format_utc_rfc3339, Clock, DayPolicy};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

/// Attempts at a conditional merge before giving up.
const MAX_MERGE_ATTEMPTS: usize = 3;

/// Longest accepted dog id.
const MAX_DOG_ID_LEN: usize = 128;

/// Shared per-dog write locks.
pub type DogLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// A dog owned by an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DogRef {
    user_id: String,
    dog_id: String,
}

impl DogRef {
    /// Fails with `Unauthorized` when there is no user, and `BadRequest`
    /// when the dog id is unusable.
    pub fn new(user_id: impl Into<String>, dog_id: impl Into<String>) -> Result<Self> {
        let user_id = user_id.into();
        let dog_id = dog_id.into();

        if user_id.trim().is_empty() {
            return Err(AppError::Unauthorized);
        }
        if dog_id.trim().is_empty() || dog_id.len() > MAX_DOG_ID_LEN {
            return Err(AppError::BadRequest(format!(
                "Dog id must be 1..={} characters",
                MAX_DOG_ID_LEN
            )));
        }

        Ok(Self { user_id, dog_id })
    }

    /// Document id: `{user}:{dog}`. Both halves are URL-encoded, so a bare
    /// `:` or `/` can only be the separator.
    pub fn doc_id(&self) -> String {
        format!(
            "{}:{}",
            urlencoding::encode(&self.user_id),
            urlencoding::encode(&self.dog_id)
        )
    }

    /// Walk document id: `{doc_id}:{start_unix}`.
    pub fn walk_id(&self, start_unix: i64) -> String {
        format!("{}:{}", self.doc_id(), start_unix)
    }
}

/// Outcome of submitting a walk to the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct WalkSubmission {
    pub walk: StoredWalk,
    /// Present when XP was credited
    pub award: Option<XpAward>,
    /// The walk had already been settled; nothing new was credited
    pub duplicate: bool,
}

/// How the ledger settled a walk against the gamification record.
enum WalkCredit {
    Credited(XpAward),
    Capped(CapKind),
    Unverified,
    AlreadySettled,
}

/// Applies XP, streak and achievement updates to gamification records.
#[derive(Clone)]
pub struct XpLedger {
    db: FirestoreDb,
    clock: Arc<dyn Clock>,
    day_policy: DayPolicy,
    store_timeout: Duration,
    locks: DogLocks,
}

impl XpLedger {
    pub fn new(
        db: FirestoreDb,
        clock: Arc<dyn Clock>,
        day_policy: DayPolicy,
        store_timeout: Duration,
    ) -> Self {
        Self {
            db,
            clock,
            day_policy,
            store_timeout,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Today's `YYYY-MM-DD` key under the configured day policy.
    pub fn today_key(&self) -> String {
        self.day_policy.day_key(self.clock.now())
    }

    // ─── Public Operations ──────────────────────────────────────────

    /// Credit `xp` from `source` to a dog.
    ///
    /// Rejects amounts outside `1..=100` before touching storage, then
    /// enforces the per-source and aggregate daily caps against the stored
    /// record. The credited amount may be lower than requested when it would
    /// overflow the daily cap.
    pub async fn add_xp(&self, dog: &DogRef, xp: i64, source: XpSource) -> Result<XpAward> {
        if xp <= 0 || xp > MAX_AWARD_XP {
            tracing::info!(dog = %dog.doc_id(), xp, %source, "Rejected invalid XP amount");
            return Err(AppError::InvalidAward(xp));
        }

        let today = self.today_key();
        let result = self
            .update(dog, AWARD_FIELDS, |record| {
                record.apply_award(xp, &source, &today)
            })
            .await;

        match &result {
            Ok(award) => tracing::info!(
                dog = %dog.doc_id(),
                %source,
                requested = xp,
                credited = award.credited,
                level = award.level,
                daily_xp = award.daily_xp,
                "XP awarded"
            ),
            Err(AppError::CapExceeded(kind)) => tracing::info!(
                dog = %dog.doc_id(),
                %source,
                xp,
                cap = %kind,
                "XP award rejected by daily cap"
            ),
            Err(e) => tracing::warn!(dog = %dog.doc_id(), %source, xp, error = %e, "XP award failed"),
        }

        result
    }

    /// Count today towards the dog's consecutive-day streak.
    pub async fn update_streak(&self, dog: &DogRef) -> Result<StreakOutcome> {
        let today = self.day_policy.date(self.clock.now());
        let outcome = self
            .update_if(dog, STREAK_FIELDS, |record| {
                let outcome = record.apply_streak(today);
                let changed = outcome.change != crate::models::StreakChange::Unchanged;
                Ok((outcome, changed))
            })
            .await?;

        tracing::info!(
            dog = %dog.doc_id(),
            change = ?outcome.change,
            streak = outcome.streak,
            "Streak updated"
        );
        Ok(outcome)
    }

    /// Add an achievement. Returns `true` if it was not already unlocked.
    pub async fn unlock_achievement(&self, dog: &DogRef, id: &str) -> Result<bool> {
        if !is_valid_achievement_id(id) {
            return Err(AppError::BadRequest(format!("Invalid achievement id: {}", id)));
        }

        let added = self
            .update_if(dog, ACHIEVEMENT_FIELDS, |record| {
                let added = record.unlock_achievement(id);
                Ok((added, added))
            })
            .await?;

        if added {
            tracing::info!(dog = %dog.doc_id(), achievement = id, "Achievement unlocked");
        }
        Ok(added)
    }

    /// Current record, or a fresh level-1 record if none is stored.
    pub async fn get_record(&self, dog: &DogRef) -> Result<GamificationRecord> {
        let doc_id = dog.doc_id();
        Ok(self
            .bounded("gamification read", self.db.get_gamification(&doc_id))
            .await?
            .unwrap_or_default())
    }

    /// Live view of a dog's record.
    pub async fn subscribe(
        &self,
        dog: &DogRef,
    ) -> Result<watch::Receiver<Option<GamificationRecord>>> {
        let doc_id = dog.doc_id();
        self.bounded(
            "gamification subscribe",
            self.db.subscribe_gamification(&doc_id),
        )
        .await
    }

    /// Record a finished walk and submit its candidate XP.
    ///
    /// The walk is stored whether or not XP is credited. Cap rejections are
    /// recorded on the stored walk rather than failing the submission.
    /// Submitting a walk that was already settled credits nothing and hands
    /// back the stored walk.
    pub async fn submit_walk(&self, dog: &DogRef, result: &WalkResult) -> Result<WalkSubmission> {
        self.with_dog_lock(&dog.doc_id(), self.settle_walk(dog, result)).await
    }

    async fn settle_walk(&self, dog: &DogRef, result: &WalkResult) -> Result<WalkSubmission> {
        let doc_id = dog.doc_id();
        let record = result.to_record();
        let started = result.start_time.timestamp();
        let walk_id = dog.walk_id(started);

        if let Some(stored) = self.bounded("walk read", self.db.get_walk(&walk_id)).await? {
            tracing::info!(dog = %doc_id, walk = %walk_id, "Walk already recorded");
            return Ok(WalkSubmission {
                walk: stored,
                award: None,
                duplicate: true,
            });
        }

        let candidate_xp = (record.is_verified && record.earned_xp > 0)
            .then(|| i64::from(record.earned_xp));
        let today = self.today_key();

        let mut settle = |current: &mut GamificationRecord| {
            if !current.processed_walks.insert(started) {
                return Ok((WalkCredit::AlreadySettled, false));
            }
            let Some(xp) = candidate_xp else {
                return Ok((WalkCredit::Unverified, true));
            };

            let mut awarded = current.clone();
            match awarded.apply_award(xp, &XpSource::Walk, &today) {
                Ok(award) => {
                    *current = awarded;
                    Ok((WalkCredit::Credited(award), true))
                }
                Err(AppError::CapExceeded(kind)) => Ok((WalkCredit::Capped(kind), true)),
                Err(e) => Err(e),
            }
        };
        let credit = self
            .merge_with_retry(&doc_id, WALK_FIELDS, &mut settle)
            .await?;

        let (award, rejected_by, duplicate) = match credit {
            WalkCredit::Credited(award) => {
                tracing::info!(
                    dog = %doc_id,
                    walk = %walk_id,
                    credited = award.credited,
                    level = award.level,
                    daily_xp = award.daily_xp,
                    "Walk XP awarded"
                );
                (Some(award), None, false)
            }
            WalkCredit::Capped(kind) => {
                tracing::info!(
                    dog = %doc_id,
                    walk = %walk_id,
                    cap = %kind,
                    "Walk XP rejected by daily cap"
                );
                (None, Some(kind.to_string()), false)
            }
            WalkCredit::Unverified => {
                tracing::info!(
                    dog = %doc_id,
                    walk = %walk_id,
                    positions = record.position_count,
                    distance_meters = record.distance_meters,
                    duration_seconds = record.duration_seconds,
                    "Unverified walk; no XP submitted"
                );
                (None, None, false)
            }
            WalkCredit::AlreadySettled => {
                // Settled by an earlier upload whose walk write never landed
                tracing::warn!(
                    dog = %doc_id,
                    walk = %walk_id,
                    "Walk settled without a stored walk"
                );
                (None, Some("duplicate".to_string()), true)
            }
        };

        let walk = StoredWalk {
            walk_id,
            dog_key: doc_id,
            started_at: format_utc_rfc3339(result.start_time),
            credited_xp: award.as_ref().map_or(0, |a| a.credited),
            rejected_by,
            recorded_at: format_utc_rfc3339(self.clock.now()),
            record,
        };

        self.bounded("walk write", self.db.save_walk(&walk)).await?;

        Ok(WalkSubmission {
            walk,
            award,
            duplicate,
        })
    }

    /// A stored walk, by its start time.
    pub async fn get_walk(&self, dog: &DogRef, start_unix: i64) -> Result<StoredWalk> {
        let walk_id = dog.walk_id(start_unix);
        self.bounded("walk read", self.db.get_walk(&walk_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("walk started at {}", start_unix)))
    }

    /// Walk history, newest first.
    pub async fn list_walks(&self, dog: &DogRef, limit: u32) -> Result<Vec<StoredWalk>> {
        let doc_id = dog.doc_id();
        self.bounded("walk history read", self.db.list_walks(&doc_id, limit))
            .await
    }

    // ─── Read-Modify-Write ─────────────────────────────────────────

    /// Apply `op` and always persist on success.
    async fn update<T, F>(&self, dog: &DogRef, fields: &[&str], mut op: F) -> Result<T>
    where
        F: FnMut(&mut GamificationRecord) -> Result<T>,
    {
        self.update_if(dog, fields, |record| op(record).map(|value| (value, true)))
            .await
    }

    /// Apply `op` to a copy of the stored record and persist the copy if
    /// `op` reports a change.
    ///
    /// `op` may run more than once when a concurrent writer is detected, so
    /// it must derive everything from the record it is given.
    async fn update_if<T, F>(&self, dog: &DogRef, fields: &[&str], mut op: F) -> Result<T>
    where
        F: FnMut(&mut GamificationRecord) -> Result<(T, bool)>,
    {
        let doc_id = dog.doc_id();
        self.with_dog_lock(&doc_id, self.merge_with_retry(&doc_id, fields, &mut op)).await
    }

    /// Run `work` holding the dog's write lock.
    async fn with_dog_lock<T>(
        &self,
        doc_id: &str,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let lock = self
            .locks
            .entry(doc_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock().await;
            work.await
        };

        // Forget the lock once no other writer holds or awaits it
        drop(lock);
        self.locks.remove_if(doc_id, |_, held| Arc::strong_count(held) == 1);

        result
    }

    async fn merge_with_retry<T, F>(
        &self,
        doc_id: &str,
        fields: &[&str],
        op: &mut F,
    ) -> Result<T>
    where
        F: FnMut(&mut GamificationRecord) -> Result<(T, bool)>,
    {
        for attempt in 1..=MAX_MERGE_ATTEMPTS {
            let current = self
                .bounded("gamification read", self.db.get_gamification(doc_id))
                .await?
                .unwrap_or_default();

            let mut next = current.clone();
            let (value, changed) = op(&mut next)?;
            if !changed {
                return Ok(value);
            }
            next.version = current.version + 1;

            let outcome = self
                .bounded(
                    "gamification write",
                    self.db
                        .merge_gamification(doc_id, &next, fields, Some(current.version)),
                )
                .await?;

            match outcome {
                MergeOutcome::Applied => return Ok(value),
                MergeOutcome::VersionConflict => {
                    tracing::warn!(
                        dog = %doc_id,
                        attempt,
                        "Gamification record changed concurrently; retrying"
                    );
                }
            }
        }

        Err(AppError::Conflict(format!(
            "Gave up updating {} after {} attempts",
            doc_id, MAX_MERGE_ATTEMPTS
        )))
    }

    /// Run a persistence call under the configured timeout.
    async fn bounded<T>(
        &self,
        what: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    what,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Persistence call timed out"
                );
                Err(AppError::Timeout(what))
            }
        }
    }
}
