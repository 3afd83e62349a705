//! Database layer (Firestore, or process memory for tests and local dev).

pub mod feed;
pub mod firestore;
pub mod memory;

pub use feed::GamificationFeed;
pub use firestore::{FirestoreDb, MergeOutcome};
pub use memory::MemoryStore;

/// Collection names as constants.
pub mod collections {
    /// Gamification state (keyed by dog key)
    pub const GAMIFICATION: &str = "gamification";
    /// Walk history (keyed by dog key + start time)
    pub const WALKS: &str = "walks";
}
