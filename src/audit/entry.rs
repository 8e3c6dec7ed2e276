//! Audit-log record types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Poster name used when the scraper could not find one.
pub const UNKNOWN_POSTER: &str = "Unknown";

/// Structured classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub should_show: bool,
    /// 1..=10, higher is more positive. Absent on degraded verdicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default)]
    pub reason: String,
}

impl Verdict {
    pub fn new(should_show: bool, score: f64, reason: impl Into<String>) -> Self {
        Self {
            should_show,
            score: Some(score),
            reason: reason.into(),
        }
    }

    /// Permissive verdict without a score (used when nothing better is known).
    pub fn permissive(reason: impl Into<String>) -> Self {
        Self {
            should_show: true,
            score: None,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Facebook,
    Instagram,
    Linkedin,
    Reddit,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Linkedin => "linkedin",
            Platform::Reddit => "reddit",
            Platform::Unknown => "unknown",
        }
    }

    /// Lenient mapping from a scraped tag; anything unrecognised is `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "twitter" | "x" => Platform::Twitter,
            "facebook" => Platform::Facebook,
            "instagram" => Platform::Instagram,
            "linkedin" => Platform::Linkedin,
            "reddit" => Platform::Reddit,
            _ => Platform::Unknown,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterStrength {
    Low,
    #[default]
    Medium,
    High,
}

impl FilterStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterStrength::Low => "low",
            FilterStrength::Medium => "medium",
            FilterStrength::High => "high",
        }
    }
}

impl fmt::Display for FilterStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiProvider {
    #[default]
    OpenAi,
    Grok,
}

impl ApiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiProvider::OpenAi => "openai",
            ApiProvider::Grok => "grok",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ApiProvider::OpenAi => "gpt-4o-mini",
            ApiProvider::Grok => "grok-beta",
        }
    }
}

impl fmt::Display for ApiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ApiProvider::OpenAi),
            "grok" => Ok(ApiProvider::Grok),
            other => Err(format!("unsupported provider: {other}")),
        }
    }
}

/// One record per uniquely fingerprinted post. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub poster: String,
    pub platform: Platform,
    pub filter_strength: FilterStrength,
    pub api_provider: ApiProvider,
    pub ai_model: String,
    pub prompt: String,
    pub response: Option<Verdict>,
    pub error: Option<String>,
}

impl AuditEntry {
    pub fn is_filtered(&self) -> bool {
        self.response.as_ref().is_some_and(|v| !v.should_show)
    }

    pub fn is_allowed(&self) -> bool {
        self.response.as_ref().is_some_and(|v| v.should_show)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_uses_camel_case_on_the_wire() {
        let v = Verdict::new(false, 2.0, "bad");
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["shouldShow"], false);
        assert_eq!(json["score"], 2.0);

        let p = serde_json::to_value(Verdict::permissive("Analysis failed")).unwrap();
        assert!(p.get("score").is_none());
    }

    #[test]
    fn platform_tags_are_lenient() {
        assert_eq!(Platform::from_tag("Twitter"), Platform::Twitter);
        assert_eq!(Platform::from_tag("mastodon"), Platform::Unknown);
        let p: Platform = serde_json::from_str("\"myspace\"").unwrap();
        assert_eq!(p, Platform::Unknown);
    }

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("OpenAI".parse::<ApiProvider>().unwrap(), ApiProvider::OpenAi);
        assert_eq!("grok".parse::<ApiProvider>().unwrap(), ApiProvider::Grok);
        assert!("claude".parse::<ApiProvider>().is_err());
    }
}
