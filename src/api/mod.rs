// HTTP client for the Cerebro research API
//
// Pure translation layer: issues one request per call with a bounded wait,
// injects the bearer token when configured, and normalizes every failure
// into an ApiError. Mock mode returns canned fixtures without touching the
// network so the rest of the stack runs identically offline.

pub mod error;

pub use error::{classify, classify_message, ApiError, ErrorKind};

use crate::history::HistoryQuery;
use crate::models::{
    FinalizeResponse, PagedHistory, ProviderHealthReport, RefineResponse, ResearchOutline,
    ResearchSession, SessionDetail, SubTopic,
};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

/// Default deadline for general API calls
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Short deadline for health polls so a dead backend degrades quickly
pub const HEALTH_TIMEOUT_SECS: u64 = 8;

/// Client for the Cerebro backend
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    mock: bool,
    timeout_secs: u64,
    health_timeout_secs: u64,
}

impl ApiClient {
    pub fn new(base_url: String, token: Option<String>, mock: bool) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            mock,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            health_timeout_secs: HEALTH_TIMEOUT_SECS,
        }
    }

    /// Override the general and health-poll deadlines (seconds)
    pub fn with_timeouts(mut self, general_secs: u64, health_secs: u64) -> Self {
        self.timeout_secs = general_secs;
        self.health_timeout_secs = health_secs;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_mock(&self) -> bool {
        self.mock
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the authorization header when a token is configured.
    /// The token itself is never logged.
    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    /// Execute a request with a bounded wait and normalize the outcome.
    ///
    /// The deadline is enforced by reqwest's per-request timeout, which
    /// aborts the call and releases its resources on expiry; success,
    /// error, and abort all leave no timer behind.
    async fn execute(
        &self,
        builder: RequestBuilder,
        path: &str,
        timeout_secs: u64,
    ) -> Result<reqwest::Response, ApiError> {
        let builder = self
            .authorize(builder)
            .timeout(Duration::from_secs(timeout_secs));

        log::debug!("-> {} (timeout {}s)", path, timeout_secs);

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout {
                    path: path.to_string(),
                    timeout_secs,
                }
            } else {
                ApiError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // Structured error bodies carry {"detail": "..."}; fall back to the
        // raw text when the body is not that shape.
        let raw = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<serde_json::Value>(&raw)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
            .unwrap_or(raw);

        Err(ApiError::Status {
            status: status.as_u16(),
            detail,
        })
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        path: &str,
        timeout_secs: u64,
    ) -> Result<T, ApiError> {
        let response = self.execute(builder, path, timeout_secs).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn execute_bytes(
        &self,
        builder: RequestBuilder,
        path: &str,
        timeout_secs: u64,
    ) -> Result<Vec<u8>, ApiError> {
        let response = self.execute(builder, path, timeout_secs).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    // ========================================================================
    // Endpoints
    // ========================================================================

    /// `POST /research/start` — create a session from a topic
    pub async fn start_research(&self, topic: &str) -> Result<ResearchSession, ApiError> {
        if self.mock {
            return Ok(mock::session(topic));
        }
        let path = "/research/start";
        let builder = self.http.post(self.url(path)).json(&json!({ "topic": topic }));
        self.execute_json(builder, path, self.timeout_secs).await
    }

    /// `POST /research/refine` — deep-dive one sub-topic
    pub async fn refine(
        &self,
        session_id: &str,
        subtopic: &str,
    ) -> Result<RefineResponse, ApiError> {
        if self.mock {
            return Ok(mock::refine(session_id, subtopic));
        }
        let path = "/research/refine";
        let builder = self
            .http
            .post(self.url(path))
            .json(&json!({ "sessionId": session_id, "subtopic": subtopic }));
        self.execute_json(builder, path, self.timeout_secs).await
    }

    /// `POST /research/finalize` — commit summary and tags
    pub async fn finalize(
        &self,
        session_id: &str,
        tags: &[String],
    ) -> Result<FinalizeResponse, ApiError> {
        if self.mock {
            return Ok(mock::finalize(session_id, tags));
        }
        let path = "/research/finalize";
        let builder = self
            .http
            .post(self.url(path))
            .json(&json!({ "sessionId": session_id, "tags": tags }));
        self.execute_json(builder, path, self.timeout_secs).await
    }

    /// `GET /research/session/{id}` — full session detail
    pub async fn session_detail(&self, session_id: &str) -> Result<SessionDetail, ApiError> {
        if self.mock {
            return Ok(mock::detail(session_id));
        }
        let path = format!("/research/session/{}", session_id);
        let builder = self.http.get(self.url(&path));
        self.execute_json(builder, &path, self.timeout_secs).await
    }

    /// `GET /research/history/paged` — one page of filtered history
    pub async fn history_paged(&self, query: &HistoryQuery) -> Result<PagedHistory, ApiError> {
        if self.mock {
            return Ok(mock::history(query));
        }
        let path = "/research/history/paged";
        let builder = self.http.get(self.url(path)).query(&query.query_params());
        self.execute_json(builder, path, self.timeout_secs).await
    }

    /// `GET /research/categories` — distinct tags across the user's history
    pub async fn categories(&self) -> Result<Vec<String>, ApiError> {
        if self.mock {
            return Ok(mock::categories());
        }
        let path = "/research/categories";
        let builder = self.http.get(self.url(path));
        self.execute_json(builder, path, self.timeout_secs).await
    }

    /// `GET /health/providers` — short-deadline health poll
    pub async fn provider_health(&self) -> Result<ProviderHealthReport, ApiError> {
        if self.mock {
            return Ok(mock::health());
        }
        let path = "/health/providers";
        let builder = self.http.get(self.url(path));
        self.execute_json(builder, path, self.health_timeout_secs).await
    }

    /// `GET /research/export/pdf/{id}` — server-rendered PDF bytes
    pub async fn export_pdf(&self, session_id: &str) -> Result<Vec<u8>, ApiError> {
        if self.mock {
            return Ok(mock::pdf_bytes(session_id));
        }
        let path = format!("/research/export/pdf/{}", session_id);
        let builder = self.http.get(self.url(&path));
        self.execute_bytes(builder, &path, self.timeout_secs).await
    }

    /// `GET /research/export/csv` — server-rendered CSV of full history
    pub async fn export_csv(&self) -> Result<Vec<u8>, ApiError> {
        if self.mock {
            return Ok(mock::csv_bytes());
        }
        let path = "/research/export/csv";
        let builder = self.http.get(self.url(path));
        self.execute_bytes(builder, path, self.timeout_secs).await
    }
}

/// Canned fixtures for mock mode. Content mirrors the backend's local
/// quota-fallback outline so the console looks realistic offline.
mod mock {
    use super::*;
    use chrono::Utc;
    use rand::Rng;

    fn session_id() -> String {
        let mut rng = rand::thread_rng();
        let bytes: [u8; 4] = rng.gen();
        format!("SESS-{}", hex_upper(&bytes))
    }

    fn hex_upper(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02X}", b)).collect()
    }

    pub fn outline(topic: &str) -> ResearchOutline {
        let base = {
            let trimmed = topic.trim();
            if trimmed.is_empty() {
                "Research Topic".to_string()
            } else {
                trimmed.to_string()
            }
        };
        let sub = |id: &str, title: &str, description: String| SubTopic {
            id: id.to_string(),
            title: title.to_string(),
            description,
        };
        ResearchOutline {
            title: base.clone(),
            description: format!(
                "A locally generated outline for {}. Mock mode is active, so no backend call was made.",
                base
            ),
            sub_topics: vec![
                sub("1", "Core Concepts", format!("Define the foundations of {}.", base)),
                sub("2", "Current Landscape", format!("Understand where {} stands today.", base)),
                sub("3", "Practical Applications", format!("Identify real-world uses of {}.", base)),
                sub("4", "Risks and Constraints", format!("Analyze challenges and limits in {}.", base)),
                sub("5", "Future Outlook", format!("Explore likely next developments in {}.", base)),
            ],
        }
    }

    pub fn session(topic: &str) -> ResearchSession {
        ResearchSession {
            session_id: session_id(),
            outline: outline(topic),
            created_at: Some(Utc::now().to_rfc3339()),
            tags: Vec::new(),
            progress: 50,
        }
    }

    pub fn refine(session_id: &str, subtopic: &str) -> RefineResponse {
        RefineResponse {
            session_id: session_id.to_string(),
            subtopic: subtopic.to_string(),
            insight: format!(
                "Mock deep-dive for '{}'. Focus on definitions, current patterns, measurable outcomes, constraints, and practical next steps.",
                subtopic
            ),
        }
    }

    pub fn finalize(session_id: &str, tags: &[String]) -> FinalizeResponse {
        let tags = if tags.is_empty() {
            vec!["Research".to_string(), "Mock".to_string(), "Analysis".to_string()]
        } else {
            tags.to_vec()
        };
        FinalizeResponse {
            session_id: session_id.to_string(),
            summary:
                "Mock synthesis: topic framing, subtopic breakdown, and stored refinements are in place."
                    .to_string(),
            tags,
        }
    }

    pub fn detail(session_id: &str) -> SessionDetail {
        SessionDetail {
            session_id: session_id.to_string(),
            outline: outline("Research Topic"),
            created_at: Some(Utc::now().to_rfc3339()),
            refinements: Vec::new(),
            summary: None,
            tags: Vec::new(),
        }
    }

    pub fn history(query: &HistoryQuery) -> PagedHistory {
        PagedHistory {
            items: vec![session("Quantum Computing")],
            page: query.page,
            limit: query.limit,
            total: 1,
            total_pages: 1,
        }
    }

    pub fn categories() -> Vec<String> {
        vec!["Analysis".to_string(), "Physics".to_string(), "Research".to_string()]
    }

    pub fn health() -> ProviderHealthReport {
        use crate::models::{BackendHealth, LlmHealth, StoreHealth};
        ProviderHealthReport {
            backend: BackendHealth { status: "online".to_string() },
            llm: LlmHealth {
                configured: true,
                provider: Some("mock".to_string()),
                model: Some("mock:cerebro".to_string()),
                fallback_on_quota: Some(true),
                issue: None,
            },
            airtable: StoreHealth {
                configured: true,
                base_id: Some("mock-base".to_string()),
                table: Some("ResearchSessions".to_string()),
                issue: None,
            },
        }
    }

    pub fn pdf_bytes(session_id: &str) -> Vec<u8> {
        format!("%PDF-1.4\n% mock export for {}\n", session_id).into_bytes()
    }

    pub fn csv_bytes() -> Vec<u8> {
        b"sessionId,createdAt,title,description,subtopics\n".to_vec()
    }
}
