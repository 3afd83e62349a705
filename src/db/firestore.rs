// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Gamification records (level, XP, daily counters, streaks)
//! - Walk history
//!
//! The same API is served from process memory when no Firestore project is
//! configured (tests, local development).

use crate::db::{collections, GamificationFeed, MemoryStore};
use crate::error::AppError;
use crate::models::{GamificationRecord, StoredWalk};
use tokio::sync::watch;

/// Result of a conditional merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied,
    /// The stored version moved since it was read.
    VersionConflict,
}

#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    Memory(MemoryStore),
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    backend: Backend,
    feed: GamificationFeed,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self::with_backend(Backend::Firestore(client)))
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self::with_backend(Backend::Firestore(client)))
    }

    /// Create a database held entirely in process memory.
    pub fn new_in_memory() -> Self {
        Self::with_backend(Backend::Memory(MemoryStore::new()))
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            feed: GamificationFeed::new(),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self.backend, Backend::Memory(_))
    }

    // ─── Gamification Operations ────────────────────────────────

    /// Get a dog's gamification record.
    ///
    /// Stored in `gamification` collection, keyed by dog key. Partial
    /// documents come back with their level threshold restored.
    pub async fn get_gamification(
        &self,
        dog_key: &str,
    ) -> Result<Option<GamificationRecord>, AppError> {
        let record = match &self.backend {
            Backend::Memory(store) => store.get_gamification(dog_key)?,
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::GAMIFICATION)
                .obj()
                .one(dog_key)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?,
        };
        Ok(record.map(GamificationRecord::normalized))
    }

    /// Merge selected fields of `record` into the stored document.
    ///
    /// Fields not listed in `fields` are left untouched. When
    /// `expected_version` is given the write is skipped, and
    /// `MergeOutcome::VersionConflict` returned, if the stored version has
    /// moved on. Successful merges are published to subscribers.
    pub async fn merge_gamification(
        &self,
        dog_key: &str,
        record: &GamificationRecord,
        fields: &[&str],
        expected_version: Option<u64>,
    ) -> Result<MergeOutcome, AppError> {
        let outcome = match &self.backend {
            Backend::Memory(store) => {
                store.merge_gamification(dog_key, record, fields, expected_version)?
            }
            Backend::Firestore(client) => {
                Self::merge_in_transaction(client, dog_key, record, fields, expected_version)
                    .await?
            }
        };

        if outcome == MergeOutcome::Applied {
            self.feed.publish(dog_key, record);
        }
        Ok(outcome)
    }

    async fn merge_in_transaction(
        client: &firestore::FirestoreDb,
        dog_key: &str,
        record: &GamificationRecord,
        fields: &[&str],
        expected_version: Option<u64>,
    ) -> Result<MergeOutcome, AppError> {
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        if let Some(expected) = expected_version {
            let current: Option<GamificationRecord> = client
                .fluent()
                .select()
                .by_id_in(collections::GAMIFICATION)
                .obj()
                .one(dog_key)
                .await
                .map_err(|e| {
                    AppError::Database(format!("Failed to read record in transaction: {}", e))
                })?;

            let stored = current.map(|r| r.version).unwrap_or(0);
            if stored != expected {
                tracing::debug!(dog_key, stored, expected, "Gamification version moved");
                let _ = transaction.rollback().await;
                return Ok(MergeOutcome::VersionConflict);
            }
        }

        client
            .fluent()
            .update()
            .fields(fields.iter().copied())
            .in_col(collections::GAMIFICATION)
            .document_id(dog_key)
            .object(record)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add merge to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Transaction commit failed: {}", e)))?;

        Ok(MergeOutcome::Applied)
    }

    /// Subscribe to a dog's record.
    ///
    /// The receiver is seeded from storage and then follows every merge made
    /// through this client. Writes from other processes are not observed.
    pub async fn subscribe_gamification(
        &self,
        dog_key: &str,
    ) -> Result<watch::Receiver<Option<GamificationRecord>>, AppError> {
        let rx = self.feed.subscribe(dog_key);
        if rx.borrow().is_none() {
            if let Some(record) = self.get_gamification(dog_key).await? {
                self.feed.seed(dog_key, &record);
            }
        }
        self.feed.prune();
        Ok(rx)
    }

    // ─── Walk History Operations ─────────────────────────────────

    /// Store a completed walk.
    pub async fn save_walk(&self, walk: &StoredWalk) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(store) => {
                store.save_walk(walk);
                Ok(())
            }
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::WALKS)
                    .document_id(&walk.walk_id)
                    .object(walk)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
        }
    }

    /// Get a stored walk by id.
    pub async fn get_walk(&self, walk_id: &str) -> Result<Option<StoredWalk>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.get_walk(walk_id)),
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::WALKS)
                .obj()
                .one(walk_id)
                .await
                .map_err(|e| AppError::Database(e.to_string())),
        }
    }

    /// Get a dog's walks, newest first.
    pub async fn list_walks(&self, dog_key: &str, limit: u32) -> Result<Vec<StoredWalk>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.list_walks(dog_key, limit)),
            Backend::Firestore(client) => {
                let dog_key = dog_key.to_string();
                client
                    .fluent()
                    .select()
                    .from(collections::WALKS)
                    .filter(move |q| q.for_all([q.field("dog_key").eq(dog_key.clone())]))
                    .order_by([("started_at", firestore::FirestoreQueryDirection::Descending)])
                    .limit(limit)
                    .obj()
                    .query()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))
            }
        }
    }
}
