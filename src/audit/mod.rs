//! Audit log: entry types, the capped store, and its durable storage.

pub mod entry;
pub mod storage;
pub mod store;

pub use entry::{ApiProvider, AuditEntry, FilterStrength, Platform, Verdict, UNKNOWN_POSTER};
pub use storage::{AuditMap, AuditStorage, JsonFileStorage, MemoryStorage};
pub use store::{AuditLog, AuditStore, InsertOutcome, DEFAULT_MAX_ENTRIES, DEFAULT_SAVE_EVERY};
