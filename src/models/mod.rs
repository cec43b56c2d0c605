// Wire types for the Cerebro research API
//
// Field names follow the backend's camelCase JSON. Optional fields use
// explicit Option with documented display defaults (a missing createdAt
// renders as "Recent").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sub-topic of a research outline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTopic {
    pub id: String,
    pub title: String,
    pub description: String,
}

/// Structured decomposition of a research topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchOutline {
    pub title: String,
    pub description: String,
    pub sub_topics: Vec<SubTopic>,
}

/// A research session as returned by `/research/start` and history reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchSession {
    /// Opaque, server-assigned id. Never minted client-side outside mock mode.
    pub session_id: String,
    pub outline: ResearchOutline,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Set semantics; order carries no meaning
    #[serde(default)]
    pub tags: Vec<String>,
    /// 0-100
    #[serde(default)]
    pub progress: u8,
}

impl ResearchSession {
    /// Human-readable creation time; missing or unparseable values show as "Recent"
    pub fn display_created_at(&self) -> String {
        display_timestamp(self.created_at.as_deref())
    }
}

/// One deep-dive insight recorded against a sub-topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinementEntry {
    pub subtopic: String,
    pub insight: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Full session state as returned by `/research/session/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    pub session_id: String,
    pub outline: ResearchOutline,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Append-only; finalize never discards accumulated refinements
    #[serde(default)]
    pub refinements: Vec<RefinementEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SessionDetail {
    /// Seed a detail from a freshly created session, before any refinement
    pub fn from_session(session: &ResearchSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            outline: session.outline.clone(),
            created_at: session.created_at.clone(),
            refinements: Vec::new(),
            summary: None,
            tags: session.tags.clone(),
        }
    }
}

/// Response of `/research/refine`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefineResponse {
    pub session_id: String,
    pub subtopic: String,
    pub insight: String,
}

/// Response of `/research/finalize`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub session_id: String,
    pub summary: String,
    pub tags: Vec<String>,
}

/// Server-paginated slice of the history list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedHistory {
    pub items: Vec<ResearchSession>,
    pub page: u32,
    pub limit: u32,
    pub total: u32,
    pub total_pages: u32,
}

// ============================================================================
// Provider health wire types (`GET /health/providers`)
// ============================================================================

/// An issue the backend observed against one of its providers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderIssue {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub status: String,
}

/// Health of the LLM provider as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmHealth {
    pub configured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_on_quota: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<ProviderIssue>,
}

/// Health of the persistence store as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreHealth {
    pub configured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<ProviderIssue>,
}

/// Full `/health/providers` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHealthReport {
    pub backend: BackendHealth,
    pub llm: LlmHealth,
    pub airtable: StoreHealth,
}

/// Format an optional RFC3339-ish timestamp for display
pub fn display_timestamp(raw: Option<&str>) -> String {
    match raw {
        Some(s) => match s.parse::<DateTime<Utc>>() {
            Ok(dt) => dt.format("%Y-%m-%d %H:%M UTC").to_string(),
            Err(_) => s.to_string(),
        },
        None => "Recent".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_deserializes_backend_shape() {
        let json = r#"{
            "sessionId": "SESS-AB12CD34",
            "outline": {
                "title": "Quantum Computing",
                "description": "Overview of the field",
                "subTopics": [
                    {"id": "1", "title": "Superconducting Qubits", "description": "Hardware"}
                ]
            },
            "tags": [],
            "progress": 50
        }"#;

        let session: ResearchSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.session_id, "SESS-AB12CD34");
        assert_eq!(session.outline.sub_topics.len(), 1);
        assert_eq!(session.outline.sub_topics[0].title, "Superconducting Qubits");
        assert!(session.created_at.is_none());
        assert_eq!(session.progress, 50);
    }

    #[test]
    fn test_missing_created_at_displays_as_recent() {
        assert_eq!(display_timestamp(None), "Recent");
        assert_eq!(
            display_timestamp(Some("2026-03-01T12:30:00Z")),
            "2026-03-01 12:30 UTC"
        );
        // Unparseable values pass through untouched
        assert_eq!(display_timestamp(Some("last tuesday")), "last tuesday");
    }

    #[test]
    fn test_health_report_optional_issue() {
        let json = r#"{
            "backend": {"status": "online"},
            "llm": {"provider": "groq", "configured": true, "model": "groq:llama-3.3-70b-versatile", "fallbackOnQuota": true, "issue": null},
            "airtable": {"configured": false, "baseId": "", "table": "ResearchSessions"}
        }"#;

        let report: ProviderHealthReport = serde_json::from_str(json).unwrap();
        assert!(report.llm.configured);
        assert!(report.llm.issue.is_none());
        assert!(!report.airtable.configured);
    }

    #[test]
    fn test_detail_seeded_from_session_has_no_refinements() {
        let session = ResearchSession {
            session_id: "SESS-1".into(),
            outline: ResearchOutline {
                title: "T".into(),
                description: "D".into(),
                sub_topics: vec![],
            },
            created_at: Some("2026-01-01T00:00:00Z".into()),
            tags: vec!["Physics".into()],
            progress: 50,
        };
        let detail = SessionDetail::from_session(&session);
        assert_eq!(detail.session_id, "SESS-1");
        assert!(detail.refinements.is_empty());
        assert!(detail.summary.is_none());
        assert_eq!(detail.tags, vec!["Physics".to_string()]);
    }
}
