//! Fuzzy search over audit entries plus the audit page's structured filters.
//!
//! Search is a conjunctive filter, not a ranking: every whitespace-separated
//! term must match, either as a literal substring of the entry's searchable text
//! or with up to `len / 4` substituted characters at some alignment.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{ApiProvider, AuditEntry, Platform};

/// Keep the entries matching every term of `query`, in input order.
pub fn search(entries: Vec<AuditEntry>, query: &str) -> Vec<AuditEntry> {
    let terms = terms(query);
    if terms.is_empty() {
        return entries;
    }
    entries
        .into_iter()
        .filter(|e| matches_all(&searchable_text(e), &terms))
        .collect()
}

fn terms(query: &str) -> Vec<Vec<char>> {
    query
        .split_whitespace()
        .map(|t| t.to_lowercase().chars().collect())
        .collect()
}

fn matches_all(text: &str, terms: &[Vec<char>]) -> bool {
    let chars: Vec<char> = text.chars().collect();
    terms.iter().all(|term| {
        let needle: String = term.iter().collect();
        text.contains(&needle) || fuzzy_match(&chars, term)
    })
}

/// Lower-cased content, poster, platform, verdict reason and error, space-joined.
pub fn searchable_text(entry: &AuditEntry) -> String {
    let reason = entry.response.as_ref().map(|v| v.reason.as_str()).unwrap_or("");
    let error = entry.error.as_deref().unwrap_or("");
    [
        entry.content.as_str(),
        entry.poster.as_str(),
        entry.platform.as_str(),
        reason,
        error,
    ]
    .join(" ")
    .to_lowercase()
}

/// Greedy lock-step comparison at every alignment; mismatches count as
/// substitutions and both cursors always advance.
pub fn fuzzy_match(text: &[char], term: &[char]) -> bool {
    if term.is_empty() {
        return true;
    }
    let max_errors = term.len() / 4;
    let last_start = (text.len() + max_errors).saturating_sub(term.len());
    if text.len() + max_errors < term.len() {
        return false;
    }

    for start in 0..=last_start {
        let mut errors = 0usize;
        let mut j = 0usize;
        let mut k = start;
        while k < text.len() && j < term.len() {
            if text[k] != term[j] {
                errors += 1;
                if errors > max_errors {
                    break;
                }
            }
            j += 1;
            k += 1;
        }
        if j == term.len() && errors <= max_errors {
            return true;
        }
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    Allowed,
    Filtered,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Since {
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "24h")]
    LastDay,
    #[serde(rename = "7d")]
    LastWeek,
}

impl Since {
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Since::LastHour => now - Duration::hours(1),
            Since::LastDay => now - Duration::days(1),
            Since::LastWeek => now - Duration::days(7),
        }
    }
}

/// Structured filters applied after the text search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryFilter {
    #[serde(default)]
    pub status: Option<StatusFilter>,
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default)]
    pub provider: Option<ApiProvider>,
    #[serde(default)]
    pub since: Option<Since>,
}

impl EntryFilter {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.platform.is_none()
            && self.provider.is_none()
            && self.since.is_none()
    }

    pub fn apply(&self, entries: Vec<AuditEntry>, now: DateTime<Utc>) -> Vec<AuditEntry> {
        let cutoff = self.since.map(|s| s.cutoff(now));
        entries
            .into_iter()
            .filter(|e| match self.status {
                Some(StatusFilter::Allowed) => e.is_allowed(),
                Some(StatusFilter::Filtered) => e.is_filtered(),
                Some(StatusFilter::Error) => e.is_error(),
                None => true,
            })
            .filter(|e| self.platform.is_none_or(|p| e.platform == p))
            .filter(|e| self.provider.is_none_or(|p| e.api_provider == p))
            .filter(|e| cutoff.is_none_or(|c| e.timestamp >= c))
            .collect()
    }
}

/// Totals shown above the audit list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub total_entries: usize,
    pub allowed: usize,
    pub filtered: usize,
    pub errors: usize,
    pub average_score: f64,
}

impl AuditSummary {
    pub fn from_entries(entries: &[AuditEntry]) -> Self {
        let scored: Vec<f64> = entries
            .iter()
            .filter_map(|e| e.response.as_ref())
            .map(|v| v.score.unwrap_or(0.0))
            .collect();
        let average_score = if scored.is_empty() {
            0.0
        } else {
            round1(scored.iter().sum::<f64>() / scored.len() as f64)
        };
        Self {
            total_entries: entries.len(),
            allowed: entries.iter().filter(|e| e.is_allowed()).count(),
            filtered: entries.iter().filter(|e| e.is_filtered()).count(),
            errors: entries.iter().filter(|e| e.is_error()).count(),
            average_score,
        }
    }
}

pub(crate) fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{FilterStrength, Verdict};
    use chrono::TimeZone;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn entry(id: &str, content: &str, poster: &str) -> AuditEntry {
        AuditEntry {
            id: id.into(),
            timestamp: Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap(),
            content: content.into(),
            poster: poster.into(),
            platform: Platform::Reddit,
            filter_strength: FilterStrength::Medium,
            api_provider: ApiProvider::OpenAi,
            ai_model: "gpt-4o-mini".into(),
            prompt: String::new(),
            response: Some(Verdict::new(true, 8.0, "upbeat")),
            error: None,
        }
    }

    #[test]
    fn fuzzy_allows_one_substitution_per_four_chars() {
        let text = chars("i love kittens");
        assert!(fuzzy_match(&text, &chars("kittans")));
        assert!(!fuzzy_match(&text, &chars("kottans")));
        // 3-char terms get no slack
        assert!(!fuzzy_match(&text, &chars("lxv")));
    }

    #[test]
    fn fuzzy_has_no_insertions_or_deletions() {
        // "kitens" against "kittens" would need a deletion
        let text = chars("kittens");
        assert!(!fuzzy_match(&text, &chars("kitensxy")));
    }

    #[test]
    fn fuzzy_term_longer_than_text() {
        assert!(!fuzzy_match(&chars("ab"), &chars("abcdefgh")));
        assert!(fuzzy_match(&chars(""), &chars("")));
    }

    #[test]
    fn search_is_conjunctive_and_order_preserving() {
        let entries = vec![
            entry("1", "positive vibes only", "alice"),
            entry("2", "positive thinking", "bob"),
            entry("3", "good vibes", "carol"),
            entry("4", "more positive vibes here", "dave"),
        ];
        let hits = search(entries, "posi vibe");
        let ids: Vec<&str> = hits.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "4"]);
    }

    #[test]
    fn search_covers_poster_reason_and_error() {
        let mut e = entry("1", "nothing", "zed");
        e.response = None;
        e.error = Some("OpenAI API error: 500".into());
        let found = search(vec![e.clone()], "ZED 500");
        assert_eq!(found.len(), 1);
        assert!(search(vec![e], "upbeat").is_empty());
    }

    #[test]
    fn blank_query_returns_everything() {
        let entries = vec![entry("1", "a", "x"), entry("2", "b", "y")];
        assert_eq!(search(entries, "   ").len(), 2);
    }

    #[test]
    fn filters_narrow_by_status_platform_and_age() {
        let now = Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap();
        let mut old = entry("old", "x", "a");
        old.timestamp = now - Duration::days(3);
        let mut blocked = entry("blocked", "y", "b");
        blocked.response = Some(Verdict::new(false, 2.0, "rude"));
        blocked.timestamp = now - Duration::minutes(5);
        let mut other = entry("fb", "z", "c");
        other.platform = Platform::Facebook;
        other.timestamp = now - Duration::minutes(10);

        let all = vec![old, blocked, other];
        let f = EntryFilter {
            since: Some(Since::LastDay),
            ..Default::default()
        };
        assert_eq!(f.apply(all.clone(), now).len(), 2);

        let f = EntryFilter {
            status: Some(StatusFilter::Filtered),
            ..Default::default()
        };
        let out = f.apply(all.clone(), now);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "blocked");

        let f = EntryFilter {
            platform: Some(Platform::Facebook),
            ..Default::default()
        };
        assert_eq!(f.apply(all, now)[0].id, "fb");
    }

    #[test]
    fn summary_counts_and_averages() {
        let mut a = entry("a", "x", "p");
        a.response = Some(Verdict::new(false, 2.0, "no"));
        let b = entry("b", "y", "p");
        let mut c = entry("c", "z", "p");
        c.response = None;
        c.error = Some("boom".into());
        let s = AuditSummary::from_entries(&[a, b, c]);
        assert_eq!(s.total_entries, 3);
        assert_eq!((s.allowed, s.filtered, s.errors), (1, 1, 1));
        assert_eq!(s.average_score, 5.0);
    }
}
