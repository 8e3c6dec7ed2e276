//! Message contract between the core and its UI / scraping collaborators.
//!
//! Requests are tagged by `action`; responses serialise to the envelope the
//! extension pages expect: `{"success": true, "result" | "results" | "defaultPrompt": ..}`
//! or `{"success": false, "error": ".."}`.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::analytics::PosterAnalytics;
use crate::audit::{AuditEntry, Verdict};
use crate::error::FilterError;
use crate::service::{AuditQuery, FilterService, PostMeta};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    #[serde(alias = "analyzeContent")]
    Analyze {
        content: String,
        #[serde(default)]
        metadata: PostMeta,
    },
    GetAuditLog(AuditQuery),
    GetPosterAnalytics,
    ClearAuditLog,
    GetDefaultPrompt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Verdict(Verdict),
    AuditLog(Vec<AuditEntry>),
    Analytics(PosterAnalytics),
    Cleared,
    DefaultPrompt(String),
    Error(String),
}

impl Response {
    pub fn is_success(&self) -> bool {
        !matches!(self, Response::Error(_))
    }
}

impl From<FilterError> for Response {
    fn from(e: FilterError) -> Self {
        Response::Error(e.to_string())
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("success", &self.is_success())?;
        match self {
            Response::Verdict(v) => map.serialize_entry("result", v)?,
            Response::AuditLog(entries) => map.serialize_entry("results", entries)?,
            Response::Analytics(a) => map.serialize_entry("results", a)?,
            Response::Cleared => {}
            Response::DefaultPrompt(p) => map.serialize_entry("defaultPrompt", p)?,
            Response::Error(e) => map.serialize_entry("error", e)?,
        }
        map.end()
    }
}

/// Single entry point for every message.
pub async fn dispatch(service: &FilterService, request: Request) -> Response {
    match request {
        Request::Analyze { content, metadata } => match service.analyze(&content, &metadata).await {
            Ok(v) => Response::Verdict(v),
            Err(e) => e.into(),
        },
        Request::GetAuditLog(query) => Response::AuditLog(service.audit_log(&query).await),
        Request::GetPosterAnalytics => Response::Analytics(service.poster_analytics().await),
        Request::ClearAuditLog => match service.clear_audit_log().await {
            Ok(()) => Response::Cleared,
            Err(e) => e.into(),
        },
        Request::GetDefaultPrompt => Response::DefaultPrompt(service.default_prompt()),
    }
}
