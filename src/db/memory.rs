// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store with Firestore-like merge semantics.
//!
//! Documents are kept as JSON objects so that a merge with a field mask
//! leaves unlisted fields untouched, exactly like a masked Firestore update.

use crate::db::firestore::MergeOutcome;
use crate::error::AppError;
use crate::models::{GamificationRecord, StoredWalk};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct MemoryStore {
    gamification: Arc<DashMap<String, Value>>,
    walks: Arc<DashMap<String, StoredWalk>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_gamification(&self, dog_key: &str) -> Result<Option<GamificationRecord>, AppError> {
        self.gamification
            .get(dog_key)
            .map(|doc| serde_json::from_value(doc.value().clone()))
            .transpose()
            .map_err(|e| AppError::Database(format!("Corrupt gamification document: {}", e)))
    }

    /// Merge the listed `fields` of `record` into the stored document.
    ///
    /// With `expected_version`, the merge only applies if the stored
    /// `version` (0 when absent) still matches. The check and the write
    /// happen under the same shard lock.
    pub fn merge_gamification(
        &self,
        dog_key: &str,
        record: &GamificationRecord,
        fields: &[&str],
        expected_version: Option<u64>,
    ) -> Result<MergeOutcome, AppError> {
        let patch = match serde_json::to_value(record) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "Gamification record did not serialize to an object"
                )))
            }
            Err(e) => return Err(AppError::Internal(e.into())),
        };

        let mut doc = self
            .gamification
            .entry(dog_key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        if let Some(expected) = expected_version {
            let stored = doc.get("version").and_then(Value::as_u64).unwrap_or(0);
            if stored != expected {
                return Ok(MergeOutcome::VersionConflict);
            }
        }

        let Some(target) = doc.as_object_mut() else {
            return Err(AppError::Database(format!(
                "Gamification document {} is not an object",
                dog_key
            )));
        };
        for field in fields {
            if let Some(value) = patch.get(*field) {
                target.insert((*field).to_string(), value.clone());
            }
        }

        Ok(MergeOutcome::Applied)
    }

    pub fn save_walk(&self, walk: &StoredWalk) {
        self.walks.insert(walk.walk_id.clone(), walk.clone());
    }

    pub fn get_walk(&self, walk_id: &str) -> Option<StoredWalk> {
        self.walks.get(walk_id).map(|walk| walk.value().clone())
    }

    /// Walks for a dog, newest first.
    pub fn list_walks(&self, dog_key: &str, limit: u32) -> Vec<StoredWalk> {
        let mut walks: Vec<StoredWalk> = self
            .walks
            .iter()
            .filter(|entry| entry.dog_key == dog_key)
            .map(|entry| entry.value().clone())
            .collect();
        walks.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        walks.truncate(limit as usize);
        walks
    }
}
