// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-dog gamification state and the arithmetic that mutates it.
//!
//! Everything here is pure: the ledger loads a record, applies one of these
//! operations to a copy and persists the copy only on success.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{AppError, CapKind};
use crate::time_utils::{format_day_key, parse_day_key};

/// Largest single award accepted.
pub const MAX_AWARD_XP: i64 = 100;
/// Aggregate XP creditable per day.
pub const DAILY_XP_CAP: u32 = 500;
pub const DAILY_MEAL_CAP: u32 = 10;
pub const DAILY_WALK_CAP: u32 = 5;
pub const DAILY_PHOTO_CAP: u32 = 20;
/// XP needed to leave level 1.
pub const LEVEL_ONE_XP: u32 = 1000;

/// Fields written by an XP award.
pub const AWARD_FIELDS: &[&str] = &[
    "level",
    "current_xp",
    "xp_for_next_level",
    "total_xp",
    "daily_xp",
    "daily_meals",
    "daily_walks",
    "daily_photos",
    "last_xp_date",
    "last_xp_source",
    "version",
];

/// Fields written by a streak update.
pub const STREAK_FIELDS: &[&str] = &["streak", "last_streak_date", "longest_streak", "version"];

/// Fields written when a submitted walk is settled.
pub const WALK_FIELDS: &[&str] = &[
    "level",
    "current_xp",
    "xp_for_next_level",
    "total_xp",
    "daily_xp",
    "daily_meals",
    "daily_walks",
    "daily_photos",
    "last_xp_date",
    "last_xp_source",
    "processed_walks",
    "version",
];

/// Fields written when an achievement is unlocked.
pub const ACHIEVEMENT_FIELDS: &[&str] = &["achievements", "version"];

/// XP required to advance past `level`, for levels reached by levelling up.
pub fn xp_for_level(level: u32) -> u32 {
    1000u32.saturating_add(level.saturating_mul(200))
}

/// XP needed to leave `level`.
fn threshold_for(level: u32) -> u32 {
    if level <= 1 {
        LEVEL_ONE_XP
    } else {
        xp_for_level(level)
    }
}

/// What earned an award; selects the per-source daily cap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum XpSource {
    Meal,
    Walk,
    Photo,
    /// Any other tag (e.g. `action`); only the aggregate cap applies.
    Other(String),
}

impl XpSource {
    pub fn as_str(&self) -> &str {
        match self {
            XpSource::Meal => "meal",
            XpSource::Walk => "walk",
            XpSource::Photo => "photo",
            XpSource::Other(tag) => tag,
        }
    }
}

impl From<String> for XpSource {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "meal" => XpSource::Meal,
            "walk" => XpSource::Walk,
            "photo" => XpSource::Photo,
            _ => XpSource::Other(tag),
        }
    }
}

impl From<&str> for XpSource {
    fn from(tag: &str) -> Self {
        XpSource::from(tag.to_string())
    }
}

impl From<XpSource> for String {
    fn from(source: XpSource) -> Self {
        source.as_str().to_string()
    }
}

impl fmt::Display for XpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gamification document for one dog.
///
/// Stored at: `gamification/{dog_key}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GamificationRecord {
    // ─── Progression ─────────────────────────────────────────────
    pub level: u32,
    /// XP inside the current level; always below `xp_for_next_level`
    pub current_xp: u32,
    pub xp_for_next_level: u32,
    /// Lifetime XP
    pub total_xp: u64,

    // ─── Streaks ─────────────────────────────────────────────────
    pub streak: u32,
    pub longest_streak: u32,
    /// `YYYY-MM-DD` of the last streak update
    pub last_streak_date: Option<String>,

    pub achievements: BTreeSet<String>,

    /// Start times (unix seconds) of walks already settled
    pub processed_walks: BTreeSet<i64>,

    // ─── Daily counters (reset on day rollover) ──────────────────
    pub daily_xp: u32,
    pub daily_meals: u32,
    pub daily_walks: u32,
    pub daily_photos: u32,
    /// `YYYY-MM-DD` the daily counters belong to
    pub last_xp_date: Option<String>,
    pub last_xp_source: Option<String>,

    // ─── Concurrency ─────────────────────────────────────────────
    /// Bumped on every write; conditional merges compare against it
    pub version: u64,
}

impl Default for GamificationRecord {
    fn default() -> Self {
        Self {
            level: 1,
            current_xp: 0,
            xp_for_next_level: LEVEL_ONE_XP,
            total_xp: 0,
            streak: 0,
            longest_streak: 0,
            last_streak_date: None,
            achievements: BTreeSet::new(),
            processed_walks: BTreeSet::new(),
            daily_xp: 0,
            daily_meals: 0,
            daily_walks: 0,
            daily_photos: 0,
            last_xp_date: None,
            last_xp_source: None,
            version: 0,
        }
    }
}

/// Result of a successful award.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XpAward {
    /// XP actually credited after the daily clamp
    pub credited: u32,
    pub levels_gained: u32,
    pub level: u32,
    pub current_xp: u32,
    pub xp_for_next_level: u32,
    pub total_xp: u64,
    pub daily_xp: u32,
}

/// How a streak update changed the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakChange {
    /// Already updated today
    Unchanged,
    /// Consecutive day
    Extended,
    /// Gap, or first ever update
    Reset,
}

/// Streak state after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreakOutcome {
    pub change: StreakChange,
    pub streak: u32,
    pub longest_streak: u32,
}

impl GamificationRecord {
    /// Restore the level threshold of a partial or damaged document.
    ///
    /// Documents written before the level fields existed come back with the
    /// level-1 default threshold whatever their level.
    pub fn normalized(mut self) -> Self {
        self.level = self.level.max(1);
        self.xp_for_next_level = threshold_for(self.level);
        self
    }

    /// Zero the daily counters if they belong to a day other than `today`.
    ///
    /// Returns `true` when a rollover happened.
    pub fn roll_over(&mut self, today: &str) -> bool {
        if self.last_xp_date.as_deref() == Some(today) {
            return false;
        }
        self.daily_xp = 0;
        self.daily_meals = 0;
        self.daily_walks = 0;
        self.daily_photos = 0;
        true
    }

    /// Credit `xp` from `source` on day `today`.
    ///
    /// On error the record may have had its daily counters rolled over but
    /// is otherwise untouched; callers discard it.
    pub fn apply_award(
        &mut self,
        xp: i64,
        source: &XpSource,
        today: &str,
    ) -> Result<XpAward, AppError> {
        if xp <= 0 || xp > MAX_AWARD_XP {
            return Err(AppError::InvalidAward(xp));
        }

        self.roll_over(today);

        match source {
            XpSource::Meal if self.daily_meals >= DAILY_MEAL_CAP => {
                return Err(AppError::CapExceeded(CapKind::DailyMeals))
            }
            XpSource::Walk if self.daily_walks >= DAILY_WALK_CAP => {
                return Err(AppError::CapExceeded(CapKind::DailyWalks))
            }
            XpSource::Photo if self.daily_photos >= DAILY_PHOTO_CAP => {
                return Err(AppError::CapExceeded(CapKind::DailyPhotos))
            }
            _ => {}
        }

        if self.daily_xp >= DAILY_XP_CAP {
            return Err(AppError::CapExceeded(CapKind::DailyXp));
        }

        let credited = (xp as u32).min(DAILY_XP_CAP - self.daily_xp);
        if credited == 0 {
            return Err(AppError::CapExceeded(CapKind::DailyXp));
        }

        let levels_gained = self.add_level_xp(credited);

        match source {
            XpSource::Meal => self.daily_meals += 1,
            XpSource::Walk => self.daily_walks += 1,
            XpSource::Photo => self.daily_photos += 1,
            XpSource::Other(_) => {}
        }

        self.total_xp = self.total_xp.saturating_add(credited as u64);
        self.daily_xp += credited;
        self.last_xp_date = Some(today.to_string());
        self.last_xp_source = Some(source.to_string());

        Ok(XpAward {
            credited,
            levels_gained,
            level: self.level,
            current_xp: self.current_xp,
            xp_for_next_level: self.xp_for_next_level,
            total_xp: self.total_xp,
            daily_xp: self.daily_xp,
        })
    }

    /// Add XP to the current level and level up as often as it overflows.
    fn add_level_xp(&mut self, xp: u32) -> u32 {
        if self.xp_for_next_level == 0 {
            // Damaged document; recover the threshold for the stored level.
            self.xp_for_next_level = threshold_for(self.level);
        }

        let mut gained = 0;
        self.current_xp = self.current_xp.saturating_add(xp);
        while self.current_xp >= self.xp_for_next_level {
            self.current_xp -= self.xp_for_next_level;
            self.level += 1;
            self.xp_for_next_level = xp_for_level(self.level);
            gained += 1;
        }
        gained
    }

    /// Record an interaction on `today` against the consecutive-day streak.
    ///
    /// A stored date later than `today` (clock or offset moved backwards)
    /// is treated like an update on the same day.
    pub fn apply_streak(&mut self, today: NaiveDate) -> StreakOutcome {
        let last = self.last_streak_date.as_deref().and_then(parse_day_key);

        let change = match last {
            Some(last) if (today - last).num_days() <= 0 => StreakChange::Unchanged,
            Some(last) if (today - last).num_days() == 1 => {
                self.streak = self.streak.saturating_add(1);
                StreakChange::Extended
            }
            _ => {
                self.streak = 1;
                StreakChange::Reset
            }
        };

        if change != StreakChange::Unchanged {
            self.last_streak_date = Some(format_day_key(today));
            self.longest_streak = self.longest_streak.max(self.streak);
        }

        StreakOutcome {
            change,
            streak: self.streak,
            longest_streak: self.longest_streak,
        }
    }

    /// Add an achievement id; returns `false` if it was already present.
    pub fn unlock_achievement(&mut self, id: &str) -> bool {
        self.achievements.insert(id.to_string())
    }
}

/// Achievement ids are short lowercase slugs.
pub fn is_valid_achievement_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}
