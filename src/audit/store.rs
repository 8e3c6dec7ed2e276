//! Capped audit log keyed by fingerprint.
//!
//! `AuditLog` is the plain data structure (insert-if-absent, FIFO-by-age
//! eviction, batch counter). `AuditStore` wraps it behind a mutex and owns the
//! durable storage: every 5th insert schedules a background save, `persist`
//! and `clear` write through and wait.

use std::sync::{Arc, Mutex};

use metrics::{counter, gauge};
use tracing::{debug, warn};

use super::entry::AuditEntry;
use super::storage::{AuditMap, AuditStorage};
use crate::error::StorageError;

pub const DEFAULT_MAX_ENTRIES: usize = 400;
pub const DEFAULT_SAVE_EVERY: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOutcome {
    pub inserted: bool,
    /// The stored entry when `id` was already present.
    pub existing: Option<AuditEntry>,
    /// Ids dropped by the capacity policy during this insert.
    pub evicted: Vec<String>,
}

#[derive(Debug)]
pub struct AuditLog {
    entries: AuditMap,
    max_entries: usize,
    save_every: usize,
    unsaved_inserts: usize,
    generation: u64,
}

impl AuditLog {
    pub fn new(max_entries: usize, save_every: usize) -> Self {
        Self::from_entries(AuditMap::new(), max_entries, save_every)
    }

    pub fn from_entries(entries: AuditMap, max_entries: usize, save_every: usize) -> Self {
        let mut log = Self {
            entries,
            max_entries: max_entries.max(1),
            save_every: save_every.max(1),
            unsaved_inserts: 0,
            generation: 0,
        };
        log.evict_over_capacity();
        log
    }

    /// Idempotency gate: never overwrites an existing id.
    pub fn insert_if_absent(&mut self, id: &str, entry: AuditEntry) -> InsertOutcome {
        if let Some(existing) = self.entries.get(id) {
            return InsertOutcome {
                inserted: false,
                existing: Some(existing.clone()),
                evicted: Vec::new(),
            };
        }
        self.entries.insert(id.to_string(), entry);
        self.unsaved_inserts += 1;
        self.generation += 1;
        let evicted = self.evict_over_capacity();
        InsertOutcome {
            inserted: true,
            existing: None,
            evicted,
        }
    }

    /// Drop the oldest entries (by timestamp, ties by id) until at capacity.
    pub fn evict_over_capacity(&mut self) -> Vec<String> {
        let excess = self.entries.len().saturating_sub(self.max_entries);
        if excess == 0 {
            return Vec::new();
        }
        let mut by_age: Vec<(_, &String)> = self
            .entries
            .values()
            .map(|e| (e.timestamp, &e.id))
            .collect();
        by_age.sort();
        let doomed: Vec<String> = by_age
            .into_iter()
            .take(excess)
            .map(|(_, id)| id.clone())
            .collect();
        for id in &doomed {
            self.entries.remove(id);
        }
        self.generation += 1;
        doomed
    }

    /// True once `save_every` inserts have accumulated since the last save;
    /// resets the counter.
    pub fn take_due_batch(&mut self) -> bool {
        if self.unsaved_inserts >= self.save_every {
            self.unsaved_inserts = 0;
            true
        } else {
            false
        }
    }

    pub fn mark_saved(&mut self) {
        self.unsaved_inserts = 0;
    }

    pub fn get(&self, id: &str) -> Option<&AuditEntry> {
        self.entries.get(id)
    }

    /// Unordered.
    pub fn all(&self) -> Vec<AuditEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.unsaved_inserts = 0;
        self.generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> AuditMap {
        self.entries.clone()
    }
}

/// Shared audit store with injected durable storage.
pub struct AuditStore {
    log: Mutex<AuditLog>,
    storage: Arc<dyn AuditStorage>,
    /// Generation of the last snapshot written; orders concurrent saves.
    saved_generation: Arc<tokio::sync::Mutex<u64>>,
}

impl AuditStore {
    pub fn new(storage: Arc<dyn AuditStorage>, max_entries: usize) -> Self {
        Self::with_log(storage, AuditLog::new(max_entries, DEFAULT_SAVE_EVERY))
    }

    pub fn with_log(storage: Arc<dyn AuditStorage>, log: AuditLog) -> Self {
        gauge!("audit_entries").set(log.len() as f64);
        Self {
            log: Mutex::new(log),
            storage,
            saved_generation: Arc::new(tokio::sync::Mutex::new(0)),
        }
    }

    /// Reload the last persisted state.
    pub async fn load(
        storage: Arc<dyn AuditStorage>,
        max_entries: usize,
    ) -> Result<Self, StorageError> {
        let entries = storage.load().await?;
        debug!(entries = entries.len(), "audit log loaded");
        let log = AuditLog::from_entries(entries, max_entries, DEFAULT_SAVE_EVERY);
        Ok(Self::with_log(storage, log))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AuditLog> {
        self.log.lock().expect("audit log mutex poisoned")
    }

    /// Insert unless present. A due batch is saved in the background; failures
    /// are only logged.
    pub fn insert_if_absent(&self, id: &str, entry: AuditEntry) -> InsertOutcome {
        let (outcome, due) = {
            let mut log = self.lock();
            let outcome = log.insert_if_absent(id, entry);
            gauge!("audit_entries").set(log.len() as f64);
            let due = if outcome.inserted && log.take_due_batch() {
                Some((log.generation(), log.snapshot()))
            } else {
                None
            };
            (outcome, due)
        };

        if !outcome.evicted.is_empty() {
            counter!("audit_evictions_total").increment(outcome.evicted.len() as u64);
            debug!(evicted = outcome.evicted.len(), "audit log over capacity");
        }

        if let Some((generation, snapshot)) = due {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let storage = Arc::clone(&self.storage);
                    let saved = Arc::clone(&self.saved_generation);
                    handle.spawn(async move {
                        if let Err(e) = write_snapshot(&*storage, &saved, generation, &snapshot).await
                        {
                            warn!(error = %e, "batched audit save failed");
                        }
                    });
                }
                Err(_) => warn!("no runtime for batched audit save; deferring to next flush"),
            }
        }
        outcome
    }

    pub fn get(&self, id: &str) -> Option<AuditEntry> {
        self.lock().get(id).cloned()
    }

    pub fn all(&self) -> Vec<AuditEntry> {
        self.lock().all()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Write the current state and wait for it.
    pub async fn persist(&self) -> Result<(), StorageError> {
        let (generation, snapshot) = {
            let mut log = self.lock();
            log.mark_saved();
            (log.generation(), log.snapshot())
        };
        write_snapshot(&*self.storage, &self.saved_generation, generation, &snapshot).await
    }

    /// Remove every entry and persist the empty state immediately.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let generation = {
            let mut log = self.lock();
            log.clear();
            gauge!("audit_entries").set(0.0);
            log.generation()
        };
        write_snapshot(&*self.storage, &self.saved_generation, generation, &AuditMap::new()).await
    }
}

/// Skips snapshots older than what is already on disk.
async fn write_snapshot(
    storage: &dyn AuditStorage,
    saved_generation: &tokio::sync::Mutex<u64>,
    generation: u64,
    snapshot: &AuditMap,
) -> Result<(), StorageError> {
    let mut saved = saved_generation.lock().await;
    if generation < *saved {
        return Ok(());
    }
    storage.save(snapshot).await?;
    *saved = generation;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::{ApiProvider, FilterStrength, Platform, Verdict};
    use crate::audit::storage::MemoryStorage;
    use chrono::{Duration, TimeZone, Utc};

    fn entry(id: &str, minute: i64) -> AuditEntry {
        AuditEntry {
            id: id.to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap()
                + Duration::minutes(minute),
            content: format!("post {id}"),
            poster: "alice".into(),
            platform: Platform::Twitter,
            filter_strength: FilterStrength::Medium,
            api_provider: ApiProvider::OpenAi,
            ai_model: "gpt-4o-mini".into(),
            prompt: "prompt".into(),
            response: Some(Verdict::new(true, 7.0, "fine")),
            error: None,
        }
    }

    #[test]
    fn insert_is_idempotent() {
        let mut log = AuditLog::new(10, 5);
        let first = log.insert_if_absent("a", entry("a", 0));
        assert!(first.inserted);

        let mut other = entry("a", 5);
        other.content = "overwrite attempt".into();
        let second = log.insert_if_absent("a", other);
        assert!(!second.inserted);
        assert_eq!(second.existing.unwrap().content, "post a");
        assert_eq!(log.len(), 1);
        assert_eq!(log.get("a").unwrap().content, "post a");
    }

    #[test]
    fn evicts_oldest_by_timestamp_not_insert_order() {
        let mut log = AuditLog::new(3, 5);
        log.insert_if_absent("mid", entry("mid", 10));
        log.insert_if_absent("old", entry("old", 0));
        log.insert_if_absent("new", entry("new", 20));
        let out = log.insert_if_absent("newest", entry("newest", 30));
        assert_eq!(out.evicted, vec!["old".to_string()]);
        assert_eq!(log.len(), 3);
        assert!(log.get("old").is_none());
        assert!(log.get("mid").is_some());
    }

    #[test]
    fn cap_of_400_keeps_400_after_401_inserts() {
        let mut log = AuditLog::new(DEFAULT_MAX_ENTRIES, DEFAULT_SAVE_EVERY);
        for i in 0..=400 {
            let id = format!("id{i}");
            log.insert_if_absent(&id, entry(&id, i as i64));
        }
        assert_eq!(log.len(), 400);
        assert!(log.get("id0").is_none());
        assert!(log.get("id1").is_some());
        assert!(log.get("id400").is_some());
    }

    #[test]
    fn batch_comes_due_every_fifth_insert() {
        let mut log = AuditLog::new(100, 5);
        let mut due = Vec::new();
        for i in 0..10 {
            let id = format!("b{i}");
            log.insert_if_absent(&id, entry(&id, i));
            due.push(log.take_due_batch());
        }
        let hits: Vec<usize> = due
            .iter()
            .enumerate()
            .filter(|(_, d)| **d)
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(hits, vec![5, 10]);

        // duplicates do not count toward the batch
        for _ in 0..5 {
            log.insert_if_absent("b0", entry("b0", 0));
        }
        assert!(!log.take_due_batch());
    }

    #[test]
    fn loading_oversized_state_trims_to_cap() {
        let mut map = AuditMap::new();
        for i in 0..6 {
            let id = format!("x{i}");
            map.insert(id.clone(), entry(&id, i));
        }
        let log = AuditLog::from_entries(map, 4, 5);
        assert_eq!(log.len(), 4);
        assert!(log.get("x0").is_none() && log.get("x1").is_none());
    }

    #[tokio::test]
    async fn store_load_trims_persisted_state() {
        let map: AuditMap = (0..6)
            .map(|i| {
                let id = format!("p{i}");
                (id.clone(), entry(&id, i))
            })
            .collect();
        let storage = Arc::new(MemoryStorage::with_entries(map));
        let store = AuditStore::load(storage, 4).await.unwrap();
        assert_eq!(store.len(), 4);
        assert!(store.get("p0").is_none());
        assert!(store.get("p5").is_some());
    }

    #[tokio::test]
    async fn store_saves_in_batches_and_reloads() {
        let storage = Arc::new(MemoryStorage::new());
        let store = AuditStore::new(storage.clone(), 50);

        for i in 0..4 {
            let id = format!("s{i}");
            store.insert_if_absent(&id, entry(&id, i));
        }
        tokio::task::yield_now().await;
        assert_eq!(storage.save_count(), 0);

        store.insert_if_absent("s4", entry("s4", 4));
        for _ in 0..50 {
            if storage.save_count() > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(storage.save_count(), 1);
        assert_eq!(storage.persisted().unwrap().len(), 5);

        // a sixth insert is not persisted until the next batch or flush
        store.insert_if_absent("s5", entry("s5", 5));
        let reloaded = AuditStore::load(storage.clone(), 50).await.unwrap();
        assert_eq!(reloaded.len(), 5);

        store.persist().await.unwrap();
        let reloaded = AuditStore::load(storage.clone(), 50).await.unwrap();
        assert_eq!(reloaded.len(), 6);
    }

    #[tokio::test]
    async fn clear_persists_empty_state_immediately() {
        let storage = Arc::new(MemoryStorage::new());
        let store = AuditStore::new(storage.clone(), 50);
        store.insert_if_absent("c", entry("c", 0));
        store.persist().await.unwrap();

        store.clear().await.unwrap();
        assert!(store.is_empty());
        assert_eq!(storage.persisted().unwrap().len(), 0);
    }
}
