//! Store capacity, fuzzy search and aggregation properties over the public API.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use positivity_gate::analytics::aggregate;
use positivity_gate::audit::{
    ApiProvider, AuditEntry, AuditStore, FilterStrength, MemoryStorage, Platform, Verdict,
    DEFAULT_MAX_ENTRIES,
};
use positivity_gate::fingerprint::fingerprint;
use positivity_gate::search::search;

fn entry(content: &str, poster: &str, offset_secs: i64, verdict: Verdict) -> AuditEntry {
    AuditEntry {
        id: fingerprint(content, poster, "reddit"),
        timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
            + Duration::seconds(offset_secs),
        content: content.to_string(),
        poster: poster.to_string(),
        platform: Platform::Reddit,
        filter_strength: FilterStrength::Medium,
        api_provider: ApiProvider::OpenAi,
        ai_model: "gpt-4o-mini".into(),
        prompt: String::new(),
        response: Some(verdict),
        error: None,
    }
}

fn ok(score: f64) -> Verdict {
    Verdict::new(true, score, "")
}

fn blocked(score: f64) -> Verdict {
    Verdict::new(false, score, "")
}

#[tokio::test]
async fn inserting_401_leaves_400_and_drops_the_oldest() {
    let store = AuditStore::new(Arc::new(MemoryStorage::new()), DEFAULT_MAX_ENTRIES);
    // insert in a shuffled time order so insertion order != age order
    let mut oldest_id = String::new();
    for i in 0..401i64 {
        let offset = (i * 7919) % 401; // permutation of 0..401
        let e = entry(&format!("post {i}"), "p", offset, ok(7.0));
        if offset == 0 {
            oldest_id = e.id.clone();
        }
        let id = e.id.clone();
        assert!(store.insert_if_absent(&id, e).inserted);
    }
    assert_eq!(store.len(), 400);
    assert!(store.get(&oldest_id).is_none());
}

#[test]
fn two_term_search_needs_both_terms() {
    let both = entry("such positive vibes today", "kim", 0, ok(8.0));
    let only_first = entry("such positive news today", "kim", 1, ok(8.0));
    let only_second = entry("good vibes all day", "kim", 2, ok(8.0));

    let hits = search(vec![both.clone(), only_first, only_second], "posi vibe");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, both.content);

    let mut without_vibe = both.clone();
    without_vibe.content = "such positive today".into();
    assert!(search(vec![without_vibe], "vibe").is_empty());

    let mut without_posi = both;
    without_posi.content = "such vibes today".into();
    assert!(search(vec![without_posi], "posi").is_empty());
}

#[test]
fn typo_within_budget_still_matches() {
    let e = entry("celebrating graduation", "lee", 0, ok(9.0));
    assert_eq!(search(vec![e.clone()], "gradaation").len(), 1);
    assert!(search(vec![e], "grxdxxtion").is_empty());
}

#[test]
fn toxic_floor_and_ratio() {
    let mut entries = Vec::new();
    let mut t = 0;
    for i in 0..5 {
        let v = if i < 3 { blocked(2.0) } else { ok(6.0) };
        entries.push(entry(&format!("m{i}"), "mostly_mean", t, v));
        t += 1;
    }
    for i in 0..4 {
        entries.push(entry(&format!("f{i}"), "few_posts", t, blocked(1.0)));
        t += 1;
    }
    let a = aggregate(&entries);
    let toxic: Vec<&str> = a.toxic.iter().map(|p| p.username.as_str()).collect();
    assert_eq!(toxic, vec!["mostly_mean"]);
    assert_eq!(a.total_posters, 2);
    assert_eq!(a.all[0].username, "mostly_mean");
}

#[test]
fn healthy_average_boundary() {
    let mut entries: Vec<AuditEntry> = (0..5)
        .map(|i| entry(&format!("h{i}"), "steady", i, ok(6.0)))
        .collect();
    entries.push(entry("h5", "steady", 5, blocked(6.0)));

    let a = aggregate(&entries);
    assert_eq!(a.all[0].average_score, 6.0);
    assert!(a.healthy.is_empty(), "6.0 is not strictly above 6");

    entries[0].response = Some(ok(6.6));
    let a = aggregate(&entries);
    assert_eq!(a.all[0].average_score, 6.1);
    assert_eq!(a.healthy.len(), 1);
}
