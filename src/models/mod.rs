// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod gamification;
pub mod position;
pub mod walk;

pub use gamification::{GamificationRecord, StreakChange, StreakOutcome, XpAward, XpSource};
pub use position::PositionSample;
pub use walk::{StoredWalk, WalkRecord, WalkResult};
