// Session lifecycle orchestration
//
// Owns the active session's identity, the held detail, the conversation
// transcript, and every in-flight flag. Nothing else mutates that state;
// other components learn about successful mutations through invalidation
// events. Locks are scoped and never held across an await.

use crate::api::{classify, ApiClient, ApiError};
use crate::health::{IssueLog, Provider};
use crate::models::{
    FinalizeResponse, RefineResponse, RefinementEntry, ResearchSession, SessionDetail,
};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;

/// Signals emitted after a successful mutation resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationEvent {
    /// History pages and the category list are stale
    HistoryChanged,
    /// The health picture should refresh now rather than on the next tick
    HealthRefresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry of the conversation transcript
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Topic cannot be empty.")]
    EmptyTopic,

    #[error("No active session. Start a research session first.")]
    NoActiveSession,

    #[error(transparent)]
    Api(#[from] ApiError),
}

struct OrchestratorState {
    /// Detail of the active session; superseded wholesale by open/create,
    /// overlaid (summary/tags only) by finalize
    active: Option<SessionDetail>,
    /// Most recent refine insight; drives the sidebar summary text
    latest_insight: Option<String>,
    transcript: Vec<ChatMessage>,
    /// Sub-topics with a refine currently in flight (per-operation gate)
    refining: HashSet<String>,
    /// At most one finalize in flight per active session
    finalizing: bool,
    /// Detail fetch in flight
    loading_detail: bool,
}

pub struct SessionOrchestrator {
    api: Arc<ApiClient>,
    issues: IssueLog,
    state: Mutex<OrchestratorState>,
    invalidation_tx: Mutex<Option<mpsc::UnboundedSender<InvalidationEvent>>>,
}

impl SessionOrchestrator {
    pub fn new(api: Arc<ApiClient>, issues: IssueLog) -> Self {
        Self {
            api,
            issues,
            state: Mutex::new(OrchestratorState {
                active: None,
                latest_insight: None,
                transcript: Vec::new(),
                refining: HashSet::new(),
                finalizing: false,
                loading_detail: false,
            }),
            invalidation_tx: Mutex::new(None),
        }
    }

    /// Set the sender for invalidation events (wired up by the front end)
    pub fn set_invalidation_sender(&self, sender: mpsc::UnboundedSender<InvalidationEvent>) {
        *self
            .invalidation_tx
            .lock()
            .expect("invalidation sender lock poisoned") = Some(sender);
    }

    fn signal(&self, event: InvalidationEvent) {
        let guard = self
            .invalidation_tx
            .lock()
            .expect("invalidation sender lock poisoned");
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OrchestratorState> {
        self.state.lock().expect("orchestrator state lock poisoned")
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.lock().active.as_ref().map(|d| d.session_id.clone())
    }

    pub fn detail(&self) -> Option<SessionDetail> {
        self.lock().active.clone()
    }

    pub fn latest_insight(&self) -> Option<String> {
        self.lock().latest_insight.clone()
    }

    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.lock().transcript.clone()
    }

    /// Classify a failed mutation, remember it as the latest provider
    /// issue, and surface it in the transcript. The error itself still
    /// travels back to the caller.
    fn record_failure(&self, context: &str, err: &ApiError) {
        let kind = classify(err);
        let message = err.to_string();
        log::warn!("{} [{}]: {}", context, kind, message);
        self.issues.record(kind, &message);
        self.lock().transcript.push(ChatMessage {
            role: ChatRole::Assistant,
            text: format!("{}: {}", context, message),
        });
    }

    /// Start a new research session from a topic.
    ///
    /// An empty or whitespace topic is rejected locally with no network
    /// call. On failure no active session is left behind and the error is
    /// surfaced, classified, and appended to the transcript; there is no
    /// automatic retry.
    pub async fn create_session(&self, topic: &str) -> Result<ResearchSession, SessionError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(SessionError::EmptyTopic);
        }

        self.lock().transcript.push(ChatMessage {
            role: ChatRole::User,
            text: topic.to_string(),
        });

        match self.api.start_research(topic).await {
            Ok(session) => {
                let mut state = self.lock();
                state.active = Some(SessionDetail::from_session(&session));
                state.latest_insight = None;
                state.transcript.push(ChatMessage {
                    role: ChatRole::Assistant,
                    text: format!(
                        "Mapped \"{}\" into {} sub-topics. {}",
                        session.outline.title,
                        session.outline.sub_topics.len(),
                        session.outline.description
                    ),
                });
                drop(state);
                self.issues.clear(Provider::Llm);
                self.issues.clear(Provider::Backend);
                self.signal(InvalidationEvent::HealthRefresh);
                Ok(session)
            }
            Err(err) => {
                self.record_failure("Research failed", &err);
                Err(err.into())
            }
        }
    }

    /// Deep-dive one sub-topic of the active session.
    ///
    /// Distinct sub-topics are independent and not coalesced, but a second
    /// submit of the same sub-topic before the first resolves is a no-op
    /// (`Ok(None)`).
    pub async fn refine_session(
        &self,
        subtopic: &str,
    ) -> Result<Option<RefineResponse>, SessionError> {
        let session_id = {
            let mut state = self.lock();
            let id = match state.active.as_ref() {
                Some(detail) => detail.session_id.clone(),
                None => return Err(SessionError::NoActiveSession),
            };
            if !state.refining.insert(subtopic.to_string()) {
                log::debug!("refine already in flight for '{}', ignoring", subtopic);
                return Ok(None);
            }
            id
        };

        let result = self.api.refine(&session_id, subtopic).await;
        self.lock().refining.remove(subtopic);

        match result {
            Ok(response) => {
                let mut state = self.lock();
                // The active session may have been superseded while the
                // refine was in flight; a stale result is not applied to
                // whatever detail is held now.
                if state
                    .active
                    .as_ref()
                    .is_some_and(|d| d.session_id == session_id)
                {
                    if let Some(detail) = state.active.as_mut() {
                        detail.refinements.push(RefinementEntry {
                            subtopic: response.subtopic.clone(),
                            insight: response.insight.clone(),
                            created_at: Some(Utc::now().to_rfc3339()),
                        });
                    }
                    state.latest_insight = Some(response.insight.clone());
                } else {
                    log::debug!(
                        "refine for {} resolved after the session changed, discarding",
                        session_id
                    );
                }
                state.transcript.push(ChatMessage {
                    role: ChatRole::Assistant,
                    text: format!("Deep-dive: {}", response.insight),
                });
                drop(state);
                self.issues.clear(Provider::Llm);
                self.signal(InvalidationEvent::HealthRefresh);
                Ok(Some(response))
            }
            Err(err) => {
                self.record_failure("Deep-dive failed", &err);
                Err(err.into())
            }
        }
    }

    /// Commit summary and tags onto the active session.
    ///
    /// At most one finalize is in flight per session; a second call while
    /// one is pending is a no-op (`Ok(None)`). On success the returned
    /// summary/tags overlay the held detail without discarding accumulated
    /// refinements, and the history/category caches are invalidated.
    pub async fn finalize_session(
        &self,
        tags: &[String],
    ) -> Result<Option<FinalizeResponse>, SessionError> {
        let session_id = {
            let mut state = self.lock();
            let id = match state.active.as_ref() {
                Some(detail) => detail.session_id.clone(),
                None => return Err(SessionError::NoActiveSession),
            };
            if state.finalizing {
                log::debug!("finalize already in flight, ignoring");
                return Ok(None);
            }
            state.finalizing = true;
            id
        };

        let result = self.api.finalize(&session_id, tags).await;
        self.lock().finalizing = false;

        match result {
            Ok(response) => {
                let mut state = self.lock();
                // Same staleness rule as refine: the overlay targets the
                // session that was finalized, never a superseding one.
                if state
                    .active
                    .as_ref()
                    .is_some_and(|d| d.session_id == session_id)
                {
                    if let Some(detail) = state.active.as_mut() {
                        detail.summary = Some(response.summary.clone());
                        detail.tags = response.tags.clone();
                    }
                } else {
                    log::debug!(
                        "finalize for {} resolved after the session changed, discarding",
                        session_id
                    );
                }
                state.transcript.push(ChatMessage {
                    role: ChatRole::Assistant,
                    text: format!("Finalized: {}", response.summary),
                });
                drop(state);
                self.issues.clear(Provider::Llm);
                self.issues.clear(Provider::Airtable);
                // Invalidation only after the mutation's success resolved;
                // a failed finalize leaves cached pages intact
                self.signal(InvalidationEvent::HistoryChanged);
                self.signal(InvalidationEvent::HealthRefresh);
                Ok(Some(response))
            }
            Err(err) => {
                self.record_failure("Finalize failed", &err);
                Err(err.into())
            }
        }
    }

    /// Fetch a session's full detail and make it the active session.
    ///
    /// The fetched detail supersedes the held one wholesale. A fetch
    /// already in flight makes this a no-op (`Ok(None)`).
    pub async fn open_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionDetail>, SessionError> {
        {
            let mut state = self.lock();
            if state.loading_detail {
                log::debug!("session detail fetch already in flight, ignoring");
                return Ok(None);
            }
            state.loading_detail = true;
        }

        let result = self.api.session_detail(session_id).await;
        self.lock().loading_detail = false;

        match result {
            Ok(detail) => {
                let mut state = self.lock();
                state.latest_insight = detail.refinements.last().map(|r| r.insight.clone());
                state.active = Some(detail.clone());
                Ok(Some(detail))
            }
            Err(err) => {
                let kind = classify(&err);
                log::warn!("failed to open session {} [{}]: {}", session_id, kind, err);
                self.issues.record(kind, &err.to_string());
                Err(err.into())
            }
        }
    }
}
