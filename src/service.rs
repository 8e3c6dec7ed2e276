//! Analyze-and-record orchestration plus the read side of the audit log.
//!
//! Flow for `analyze`: fingerprint -> cached entry short-circuit -> rate limit ->
//! settings check -> classify -> parse -> record. Requests for the same
//! fingerprint are serialised, so a second request arriving while the first is
//! waiting on the model reuses its recorded result instead of calling again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::analytics::{self, PosterAnalytics};
use crate::audit::{AuditEntry, AuditStore, Platform, Verdict, UNKNOWN_POSTER};
use crate::classify::{request_for, DynClassifier};
use crate::config::SettingsProvider;
use crate::error::{ConfigError, FilterError};
use crate::fingerprint::{fingerprint, CONTENT_PREFIX_CHARS};
use crate::parser;
use crate::prompt;
use crate::rate_limit::RateLimiter;
use crate::search::{self, AuditSummary, EntryFilter, Since, StatusFilter};

pub const DEFAULT_AUDIT_LIMIT: usize = 50;
pub const ALREADY_ANALYZED_REASON: &str = "Already analyzed";
pub const ANALYSIS_FAILED_REASON: &str = "Analysis failed";

/// Scraper-supplied metadata for a post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostMeta {
    #[serde(default)]
    pub poster: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

impl PostMeta {
    pub fn new(poster: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            poster: Some(poster.into()),
            platform: Some(platform.into()),
        }
    }

    /// Kept as scraped; only a missing or empty name becomes the sentinel.
    fn poster(&self) -> &str {
        self.poster
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(UNKNOWN_POSTER)
    }

    fn platform(&self) -> Platform {
        self.platform
            .as_deref()
            .map(Platform::from_tag)
            .unwrap_or_default()
    }
}

fn default_limit() -> usize {
    DEFAULT_AUDIT_LIMIT
}

/// Audit log request: fuzzy search, structured filters, newest-first limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    #[serde(default, alias = "q")]
    pub search_query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub status: Option<StatusFilter>,
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default)]
    pub provider: Option<crate::audit::ApiProvider>,
    #[serde(default)]
    pub since: Option<Since>,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            search_query: String::new(),
            limit: DEFAULT_AUDIT_LIMIT,
            status: None,
            platform: None,
            provider: None,
            since: None,
        }
    }
}

impl AuditQuery {
    pub fn search(query: impl Into<String>, limit: usize) -> Self {
        Self {
            search_query: query.into(),
            limit,
            ..Default::default()
        }
    }

    pub fn filter(&self) -> EntryFilter {
        EntryFilter {
            status: self.status,
            platform: self.platform,
            provider: self.provider,
            since: self.since,
        }
    }
}

/// Per-fingerprint locks for requests currently waiting on the classifier.
#[derive(Default)]
struct InFlight {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

struct InFlightGuard<'a> {
    registry: &'a InFlight,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl InFlight {
    async fn acquire(&self, id: &str) -> InFlightGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().expect("in-flight mutex poisoned");
            Arc::clone(slots.entry(id.to_string()).or_default())
        };
        let guard = slot.lock_owned().await;
        InFlightGuard {
            registry: self,
            id: id.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().expect("in-flight mutex poisoned").len()
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self.registry.slots.lock().expect("in-flight mutex poisoned");
        if slots.get(&self.id).is_some_and(|s| Arc::strong_count(s) == 1) {
            slots.remove(&self.id);
        }
    }
}

pub struct FilterService {
    store: Arc<AuditStore>,
    limiter: RateLimiter,
    settings: Arc<dyn SettingsProvider>,
    classifier: DynClassifier,
    in_flight: InFlight,
}

impl FilterService {
    pub fn new(
        store: Arc<AuditStore>,
        settings: Arc<dyn SettingsProvider>,
        classifier: DynClassifier,
    ) -> Self {
        Self::with_limiter(store, settings, classifier, RateLimiter::default())
    }

    pub fn with_limiter(
        store: Arc<AuditStore>,
        settings: Arc<dyn SettingsProvider>,
        classifier: DynClassifier,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            store,
            limiter,
            settings,
            classifier,
            in_flight: InFlight::default(),
        }
    }

    pub fn store(&self) -> &AuditStore {
        &self.store
    }

    /// Classify a post, or return the verdict already recorded for it.
    ///
    /// Only configuration and rate-limit failures are errors; transport
    /// failures are recorded and answered with a permissive verdict.
    pub async fn analyze(&self, content: &str, meta: &PostMeta) -> Result<Verdict, FilterError> {
        counter!("analyze_requests_total").increment(1);
        let poster = meta.poster();
        let platform = meta.platform();
        let id = fingerprint(content, poster, platform.as_str());

        if let Some(existing) = self.store.get(&id) {
            return Ok(cached_verdict(&id, existing));
        }

        let _slot = self.in_flight.acquire(&id).await;
        if let Some(existing) = self.store.get(&id) {
            return Ok(cached_verdict(&id, existing));
        }

        if !self.limiter.admit() {
            counter!("analyze_rate_limited_total").increment(1);
            warn!(fingerprint = %id, "rate limit exceeded");
            return Err(FilterError::RateLimited);
        }

        let settings = self.settings.current();
        if !settings.enabled {
            return Err(ConfigError::Disabled.into());
        }
        if !settings.has_api_key() {
            return Err(ConfigError::MissingApiKey.into());
        }

        let model = settings.model();
        let prompt = prompt::build_prompt(
            content,
            settings.filter_strength,
            settings.custom_prompt.as_deref(),
        );
        let mut entry = AuditEntry {
            id: id.clone(),
            timestamp: Utc::now(),
            content: content.chars().take(CONTENT_PREFIX_CHARS).collect(),
            poster: poster.to_string(),
            platform,
            filter_strength: settings.filter_strength,
            api_provider: settings.api_provider,
            ai_model: model.clone(),
            prompt,
            response: None,
            error: None,
        };

        let outcome = self
            .classifier
            .classify(request_for(&settings, &model, &entry.prompt))
            .await;
        let verdict = match outcome {
            Ok(raw) => {
                let verdict = parser::parse(&raw);
                entry.response = Some(verdict.clone());
                verdict
            }
            Err(e) => {
                counter!("analyze_transport_errors_total").increment(1);
                warn!(fingerprint = %id, provider = %settings.api_provider, error = %e, "classification failed");
                entry.error = Some(e.to_string());
                Verdict::permissive(ANALYSIS_FAILED_REASON)
            }
        };

        info!(
            fingerprint = %id,
            poster,
            platform = %platform,
            show = verdict.should_show,
            "post analyzed"
        );
        self.store.insert_if_absent(&id, entry);
        Ok(verdict)
    }

    /// Matching entries, newest first, at most `query.limit`.
    pub async fn audit_log(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        let mut out = self.matching_entries(query).await;
        out.truncate(query.limit);
        out
    }

    /// Totals over every entry matching `query` (ignores the limit).
    pub async fn audit_summary(&self, query: &AuditQuery) -> AuditSummary {
        AuditSummary::from_entries(&self.matching_entries(query).await)
    }

    async fn matching_entries(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        self.flush().await;
        let mut entries = self.store.all();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        let entries = search::search(entries, &query.search_query);
        let filter = query.filter();
        if filter.is_empty() {
            entries
        } else {
            filter.apply(entries, Utc::now())
        }
    }

    pub async fn poster_analytics(&self) -> PosterAnalytics {
        self.flush().await;
        analytics::aggregate(&self.store.all())
    }

    /// Irreversible.
    pub async fn clear_audit_log(&self) -> Result<(), FilterError> {
        self.store.clear().await?;
        info!("audit log cleared");
        Ok(())
    }

    pub fn default_prompt(&self) -> String {
        prompt::default_prompt_template()
    }

    async fn flush(&self) {
        if let Err(e) = self.store.persist().await {
            warn!(error = %e, "audit flush failed");
        }
    }
}

fn cached_verdict(id: &str, existing: AuditEntry) -> Verdict {
    counter!("analyze_cache_hits_total").increment(1);
    debug!(fingerprint = %id, "post already analyzed");
    existing
        .response
        .unwrap_or_else(|| Verdict::permissive(ALREADY_ANALYZED_REASON))
}
