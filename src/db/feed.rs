// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live gamification updates for subscribers in this process.

use crate::models::GamificationRecord;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;

type Slot = watch::Sender<Option<GamificationRecord>>;

/// One watch channel per dog key, created lazily.
#[derive(Clone, Default)]
pub struct GamificationFeed {
    channels: Arc<DashMap<String, Slot>>,
}

impl GamificationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a dog's record. The initial value is the last published
    /// record, or `None` if nothing has been published yet.
    pub fn subscribe(&self, dog_key: &str) -> watch::Receiver<Option<GamificationRecord>> {
        self.channels
            .entry(dog_key.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Publish a freshly written record to all subscribers.
    pub fn publish(&self, dog_key: &str, record: &GamificationRecord) {
        if let Some(slot) = self.channels.get(dog_key) {
            slot.send_replace(Some(record.clone()));
        }
    }

    /// Fill in a value loaded from storage, unless a newer write already
    /// published one.
    pub fn seed(&self, dog_key: &str, record: &GamificationRecord) {
        if let Some(slot) = self.channels.get(dog_key) {
            slot.send_if_modified(|current| {
                let stale = current
                    .as_ref()
                    .map_or(true, |existing| existing.version < record.version);
                if stale {
                    *current = Some(record.clone());
                }
                stale
            });
        }
    }

    /// Drop channels nobody listens to any more.
    pub fn prune(&self) {
        self.channels.retain(|_, slot| slot.receiver_count() > 0);
    }
}
