// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod location;
pub mod walk;
pub mod xp_ledger;

pub use location::{LocationPermission, LocationProvider, LocationSettings};
pub use walk::{WalkError, WalkSnapshot, WalkStatus, WalkTracker};
pub use xp_ledger::{DogRef, WalkSubmission, XpLedger};
