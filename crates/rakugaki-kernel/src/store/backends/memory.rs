//! In-memory checkpoint backend.
//!
//! The fallback when no durable backend is configured. All data is lost when
//! the store is dropped.

use std::time::SystemTime;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;

use rakugaki_types::{Checkpoint, CheckpointData, CheckpointId};

use crate::store::ops::{CheckpointStore, StoreLimits, encode_payload, parse_id};
use crate::store::StoreResult;

#[derive(Debug, Clone)]
struct Entry {
    data: CheckpointData,
    saved_at: SystemTime,
}

/// In-memory checkpoint backend.
///
/// Entries are kept in write order; a re-save moves the id to the back.
/// The mutex keeps eviction counting consistent under concurrent writers.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<IndexMap<CheckpointId, Entry>>,
    limits: StoreLimits,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with default limits.
    pub fn new() -> Self {
        Self::with_limits(StoreLimits::default())
    }

    pub fn with_limits(limits: StoreLimits) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            limits,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn save(&self, id: &str, data: &CheckpointData) -> StoreResult<()> {
        let id = parse_id(id)?;
        encode_payload(data, &self.limits)?;

        let mut entries = self.entries.lock();
        entries.shift_remove(&id);
        entries.insert(
            id,
            Entry {
                data: data.clone(),
                saved_at: SystemTime::now(),
            },
        );

        let surplus = entries.len().saturating_sub(self.limits.max_entries);
        if surplus > 0 {
            entries.drain(..surplus);
            tracing::debug!(evicted = surplus, "memory store evicted oldest checkpoints");
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> StoreResult<Option<Checkpoint>> {
        let id = parse_id(id)?;
        let entries = self.entries.lock();
        Ok(entries.get(&id).map(|entry| Checkpoint {
            id: id.clone(),
            data: entry.data.clone(),
            saved_at: Some(entry.saved_at),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use rakugaki_types::{DiagramElement, Rect};
    use serde_json::json;

    fn data(tag: &str) -> CheckpointData {
        CheckpointData::new(
            vec![DiagramElement::from_value(json!({"type": "rectangle", "id": tag})).unwrap()],
            Some(Rect::new(0.0, 0.0, 400.0, 300.0)),
        )
    }

    fn small(max_entries: usize) -> MemoryStore {
        MemoryStore::with_limits(StoreLimits {
            max_entries,
            ..StoreLimits::default()
        })
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MemoryStore::new();
        store.save("cp-1", &data("a")).await.unwrap();

        let cp = store.load("cp-1").await.unwrap().unwrap();
        assert_eq!(cp.id.as_str(), "cp-1");
        assert_eq!(cp.data, data("a"));
        assert!(cp.saved_at.is_some());
    }

    #[tokio::test]
    async fn test_load_missing() {
        let store = MemoryStore::new();
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_id_leaves_store_untouched() {
        let store = MemoryStore::new();
        let err = store.save("../escape", &data("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidId { .. }));
        assert!(store.is_empty());

        let long = "x".repeat(65);
        assert!(store.save(&long, &data("a")).await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let store = MemoryStore::with_limits(StoreLimits {
            max_entries: 10,
            max_payload_bytes: 16,
        });
        let err = store.save("big", &data("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::TooLarge { limit: 16, .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryStore::new();
        store.save("cp", &data("first")).await.unwrap();
        store.save("cp", &data("second")).await.unwrap();

        assert_eq!(store.len(), 1);
        let cp = store.load("cp").await.unwrap().unwrap();
        assert_eq!(cp.data, data("second"));
    }

    #[tokio::test]
    async fn test_evicts_oldest_write() {
        let store = small(3);
        for i in 0..4 {
            store.save(&format!("cp-{i}"), &data("a")).await.unwrap();
        }
        assert_eq!(store.len(), 3);
        assert!(store.load("cp-0").await.unwrap().is_none());
        assert!(store.load("cp-3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_resave_refreshes_write_time_not_reads() {
        let store = small(2);
        store.save("a", &data("a")).await.unwrap();
        store.save("b", &data("b")).await.unwrap();

        // Reading does not protect an entry.
        store.load("a").await.unwrap();
        store.save("c", &data("c")).await.unwrap();
        assert!(store.load("a").await.unwrap().is_none());

        // Re-writing does.
        store.save("b", &data("b2")).await.unwrap();
        store.save("d", &data("d")).await.unwrap();
        assert!(store.load("c").await.unwrap().is_none());
        assert!(store.load("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_default_ceiling_keeps_latest_hundred() {
        let store = MemoryStore::new();
        for i in 0..101 {
            store.save(&format!("cp-{i}"), &data("a")).await.unwrap();
        }
        assert_eq!(store.len(), 100);
        assert!(store.load("cp-0").await.unwrap().is_none());
        for i in 1..101 {
            assert!(store.load(&format!("cp-{i}")).await.unwrap().is_some());
        }
    }
}
