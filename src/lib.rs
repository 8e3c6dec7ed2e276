// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analytics;
pub mod api;
pub mod audit;
pub mod classify;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod message;
pub mod metrics;
pub mod parser;
pub mod prompt;
pub mod rate_limit;
pub mod search;
pub mod service;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::audit::{AuditEntry, AuditStore, Verdict};
pub use crate::error::{ConfigError, FilterError, TransportError};
pub use crate::message::{dispatch, Request, Response};
pub use crate::service::{AuditQuery, FilterService, PostMeta};
