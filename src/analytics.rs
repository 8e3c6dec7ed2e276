//! Poster analytics, recomputed from the full audit log on every request.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditEntry, Platform, UNKNOWN_POSTER};
use crate::search::round1;

/// Posters need at least this many posts to be classified.
pub const MIN_POSTS_FOR_CLASSIFICATION: u32 = 5;
pub const TOXIC_FILTERED_RATIO: f64 = 0.5;
pub const HEALTHY_ALLOWED_RATIO: f64 = 0.8;
pub const HEALTHY_MIN_AVERAGE: f64 = 6.0;
pub const BUCKET_LIMIT: usize = 20;
/// Score assumed for entries without one.
pub const DEFAULT_SCORE: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PosterStats {
    pub username: String,
    pub post_count: u32,
    pub allowed: u32,
    pub filtered: u32,
    pub total_score: f64,
    pub average_score: f64,
    /// Platform of the most recently processed entry for this poster.
    pub platform: Platform,
}

impl PosterStats {
    fn new(username: &str, platform: Platform) -> Self {
        Self {
            username: username.to_string(),
            post_count: 0,
            allowed: 0,
            filtered: 0,
            total_score: 0.0,
            average_score: 0.0,
            platform,
        }
    }

    pub fn filtered_ratio(&self) -> f64 {
        if self.post_count == 0 {
            0.0
        } else {
            self.filtered as f64 / self.post_count as f64
        }
    }

    pub fn allowed_ratio(&self) -> f64 {
        if self.post_count == 0 {
            0.0
        } else {
            self.allowed as f64 / self.post_count as f64
        }
    }

    pub fn is_toxic(&self) -> bool {
        self.post_count >= MIN_POSTS_FOR_CLASSIFICATION
            && self.filtered_ratio() > TOXIC_FILTERED_RATIO
    }

    pub fn is_healthy(&self) -> bool {
        self.post_count >= MIN_POSTS_FOR_CLASSIFICATION
            && self.allowed_ratio() > HEALTHY_ALLOWED_RATIO
            && self.average_score > HEALTHY_MIN_AVERAGE
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PosterAnalytics {
    pub all: Vec<PosterStats>,
    pub toxic: Vec<PosterStats>,
    pub healthy: Vec<PosterStats>,
    pub total_posters: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_posters: usize,
    pub total_posts: u64,
    pub total_filtered: u64,
    /// Mean of per-poster averages.
    pub average_score: f64,
    pub toxic_posters: usize,
    pub healthy_posters: usize,
}

impl PosterAnalytics {
    pub fn summary(&self) -> AnalyticsSummary {
        let average_score = if self.all.is_empty() {
            0.0
        } else {
            round1(self.all.iter().map(|p| p.average_score).sum::<f64>() / self.all.len() as f64)
        };
        AnalyticsSummary {
            total_posters: self.total_posters,
            total_posts: self.all.iter().map(|p| p.post_count as u64).sum(),
            total_filtered: self.all.iter().map(|p| p.filtered as u64).sum(),
            average_score,
            toxic_posters: self.toxic.len(),
            healthy_posters: self.healthy.len(),
        }
    }
}

fn is_unknown_poster(poster: &str) -> bool {
    poster.is_empty() || poster == UNKNOWN_POSTER
}

/// Single pass over `entries`; entries without a verdict count as filtered.
pub fn aggregate<'a, I>(entries: I) -> PosterAnalytics
where
    I: IntoIterator<Item = &'a AuditEntry>,
{
    let mut order: Vec<String> = Vec::new();
    let mut stats: HashMap<String, PosterStats> = HashMap::new();

    for entry in entries {
        if is_unknown_poster(&entry.poster) {
            continue;
        }
        let s = stats.entry(entry.poster.clone()).or_insert_with(|| {
            order.push(entry.poster.clone());
            PosterStats::new(&entry.poster, entry.platform)
        });

        s.post_count += 1;
        s.platform = entry.platform;
        s.total_score += entry
            .response
            .as_ref()
            .and_then(|v| v.score)
            .unwrap_or(DEFAULT_SCORE);
        if entry.is_allowed() {
            s.allowed += 1;
        } else {
            s.filtered += 1;
        }
        s.average_score = round1(s.total_score / s.post_count as f64);
    }

    let total_posters = stats.len();
    let mut all: Vec<PosterStats> = order
        .into_iter()
        .filter_map(|name| stats.remove(&name))
        .collect();
    // stable: ties keep first-seen order
    all.sort_by(|a, b| b.post_count.cmp(&a.post_count));

    let mut toxic: Vec<PosterStats> = all.iter().filter(|p| p.is_toxic()).cloned().collect();
    toxic.sort_by(|a, b| desc(a.filtered_ratio(), b.filtered_ratio()));
    toxic.truncate(BUCKET_LIMIT);

    let mut healthy: Vec<PosterStats> = all.iter().filter(|p| p.is_healthy()).cloned().collect();
    healthy.sort_by(|a, b| desc(a.average_score, b.average_score));
    healthy.truncate(BUCKET_LIMIT);

    PosterAnalytics {
        all,
        toxic,
        healthy,
        total_posters,
    }
}

fn desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}
