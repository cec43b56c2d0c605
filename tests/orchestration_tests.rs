// End-to-end orchestration tests against an in-process stub backend:
// lifecycle guards, cache invalidation, and health derivation working
// together the way the console wires them.

mod common;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use cerebro_client::api::ApiClient;
use cerebro_client::health::{HealthMonitor, IssueLog, ProviderStatus};
use cerebro_client::history::HistoryEngine;
use cerebro_client::session::{ChatRole, InvalidationEvent, SessionOrchestrator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Counters {
    finalize: AtomicUsize,
    history: AtomicUsize,
}

/// Stub with the full research surface; finalize is slowed so overlapping
/// calls can race the in-flight guard.
fn research_router(counters: Arc<Counters>) -> Router {
    Router::new()
        .route(
            "/research/start",
            post(|| async { Json(common::session_json("SESS-1", "Quantum Computing")) }),
        )
        .route(
            "/research/refine",
            post(|Json(body): Json<serde_json::Value>| async move {
                Json(serde_json::json!({
                    "sessionId": body["sessionId"],
                    "subtopic": body["subtopic"],
                    "insight": "Superconducting qubits rely on Josephson junctions cooled to millikelvin temperatures."
                }))
            }),
        )
        .route(
            "/research/finalize",
            post(
                |State(counters): State<Arc<Counters>>, Json(body): Json<serde_json::Value>| async move {
                    counters.finalize.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Json(serde_json::json!({
                        "sessionId": body["sessionId"],
                        "summary": "Final synthesis of the session.",
                        "tags": body["tags"]
                    }))
                },
            ),
        )
        .route(
            "/research/session/:id",
            get(|Path(id): Path<String>| async move {
                Json(serde_json::json!({
                    "sessionId": id,
                    "outline": common::session_json(&id, "Quantum Computing")["outline"],
                    "refinements": [
                        {"subtopic": "Superconducting Qubits", "insight": "Prior insight.", "createdAt": "2026-01-01T00:00:00Z"}
                    ],
                    "summary": "Final synthesis of the session.",
                    "tags": ["X", "Y"]
                }))
            }),
        )
        .route(
            "/research/history/paged",
            get(|State(counters): State<Arc<Counters>>| async move {
                counters.history.fetch_add(1, Ordering::SeqCst);
                Json(serde_json::json!({
                    "items": [common::session_json("SESS-1", "Quantum Computing")],
                    "page": 1, "limit": 12, "total": 1, "totalPages": 1
                }))
            }),
        )
        .route(
            "/research/categories",
            get(|| async { Json(serde_json::json!(["Physics", "Quantum"])) }),
        )
        .with_state(counters)
}

#[tokio::test]
async fn test_finalize_issues_at_most_one_in_flight_post() {
    let counters = Arc::new(Counters::default());
    let base = common::serve(research_router(counters.clone())).await;
    let api = Arc::new(ApiClient::new(base, None, false));
    let orchestrator = Arc::new(SessionOrchestrator::new(api, IssueLog::new()));

    orchestrator.create_session("Quantum Computing").await.unwrap();

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.finalize_session(&[]).await })
    };
    // Let the first call reach the (slowed) stub before the second starts
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = orchestrator.finalize_session(&[]).await.unwrap();

    assert!(second.is_none());
    let first = first.await.unwrap().unwrap();
    assert!(first.is_some());
    assert_eq!(counters.finalize.load(Ordering::SeqCst), 1);

    // The guard resets once the call resolves
    let third = orchestrator.finalize_session(&[]).await.unwrap();
    assert!(third.is_some());
}

#[tokio::test]
async fn test_deep_dive_scenario_updates_sidebar_and_transcript() {
    let counters = Arc::new(Counters::default());
    let base = common::serve(research_router(counters)).await;
    let api = Arc::new(ApiClient::new(base, None, false));
    let orchestrator = SessionOrchestrator::new(api, IssueLog::new());

    let session = orchestrator.create_session("Quantum Computing").await.unwrap();
    assert_eq!(session.outline.sub_topics.len(), 4);

    let response = orchestrator
        .refine_session("Superconducting Qubits")
        .await
        .unwrap()
        .unwrap();

    // The insight becomes the sidebar summary text
    assert_eq!(
        orchestrator.latest_insight().as_deref(),
        Some(response.insight.as_str())
    );
    // ...and arrives in the transcript as a prefixed assistant message
    let last = orchestrator.transcript().pop().unwrap();
    assert_eq!(last.role, ChatRole::Assistant);
    assert_eq!(last.text, format!("Deep-dive: {}", response.insight));
}

#[tokio::test]
async fn test_finalize_then_reopen_round_trip() {
    let counters = Arc::new(Counters::default());
    let base = common::serve(research_router(counters)).await;
    let api = Arc::new(ApiClient::new(base, None, false));
    let orchestrator = SessionOrchestrator::new(api, IssueLog::new());

    orchestrator.create_session("Quantum Computing").await.unwrap();
    orchestrator.refine_session("Superconducting Qubits").await.unwrap();

    let tags = vec!["X".to_string(), "Y".to_string()];
    let done = orchestrator.finalize_session(&tags).await.unwrap().unwrap();
    assert_eq!(done.tags, tags);

    // Re-opening shows the finalized tags and summary with refinements intact
    let detail = orchestrator.open_session("SESS-1").await.unwrap().unwrap();
    assert_eq!(detail.tags, tags);
    assert_eq!(detail.summary.as_deref(), Some(done.summary.as_str()));
    assert_eq!(detail.refinements.len(), 1);
}

#[tokio::test]
async fn test_stale_refine_not_applied_to_superseding_session() {
    // Refine is slowed so another session can be opened while it is in
    // flight; the late result must not land on the new session's detail.
    let app = Router::new()
        .route(
            "/research/start",
            post(|| async { Json(common::session_json("SESS-1", "Quantum Computing")) }),
        )
        .route(
            "/research/refine",
            post(|Json(body): Json<serde_json::Value>| async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Json(serde_json::json!({
                    "sessionId": body["sessionId"],
                    "subtopic": body["subtopic"],
                    "insight": "Insight for the first session."
                }))
            }),
        )
        .route(
            "/research/session/:id",
            get(|Path(id): Path<String>| async move {
                Json(serde_json::json!({
                    "sessionId": id,
                    "outline": common::session_json(&id, "Dark Matter")["outline"],
                    "refinements": [],
                    "tags": []
                }))
            }),
        );
    let base = common::serve(app).await;
    let api = Arc::new(ApiClient::new(base, None, false));
    let orchestrator = Arc::new(SessionOrchestrator::new(api, IssueLog::new()));

    orchestrator.create_session("Quantum Computing").await.unwrap();

    let refine = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.refine_session("Superconducting Qubits").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.open_session("SESS-OTHER").await.unwrap();

    // The call itself still succeeds; only its application is skipped
    let refined = refine.await.unwrap().unwrap();
    assert!(refined.is_some());

    let held = orchestrator.detail().unwrap();
    assert_eq!(held.session_id, "SESS-OTHER");
    assert!(held.refinements.is_empty());
    // The sidebar reflects the opened session, not the late insight
    assert!(orchestrator.latest_insight().is_none());
}

#[tokio::test]
async fn test_stale_finalize_leaves_superseding_session_untouched() {
    let counters = Arc::new(Counters::default());
    let base = common::serve(research_router(counters)).await;
    let api = Arc::new(ApiClient::new(base, None, false));
    let orchestrator = Arc::new(SessionOrchestrator::new(api, IssueLog::new()));

    orchestrator.create_session("Quantum Computing").await.unwrap();

    let finalize = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.finalize_session(&["Stale".to_string()]).await })
    };
    // Open a different session while the (slowed) finalize is in flight
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.open_session("SESS-OTHER").await.unwrap();

    let done = finalize.await.unwrap().unwrap().unwrap();
    assert_eq!(done.tags, vec!["Stale".to_string()]);

    // The held detail keeps what the reopen fetched
    let held = orchestrator.detail().unwrap();
    assert_eq!(held.session_id, "SESS-OTHER");
    assert_eq!(held.tags, vec!["X".to_string(), "Y".to_string()]);
}

#[tokio::test]
async fn test_finalize_invalidation_forces_fresh_history_fetch() {
    let counters = Arc::new(Counters::default());
    let base = common::serve(research_router(counters.clone())).await;
    let api = Arc::new(ApiClient::new(base, None, false));
    let orchestrator = SessionOrchestrator::new(api.clone(), IssueLog::new());
    let mut history = HistoryEngine::new(api, 12);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    orchestrator.set_invalidation_sender(tx);

    // Prime the cache: the second read is served without a network call
    history.fetch_page().await.unwrap();
    history.fetch_page().await.unwrap();
    assert_eq!(counters.history.load(Ordering::SeqCst), 1);

    orchestrator.create_session("Quantum Computing").await.unwrap();
    orchestrator.finalize_session(&[]).await.unwrap();

    let mut saw_history_changed = false;
    while let Ok(event) = rx.try_recv() {
        if event == InvalidationEvent::HistoryChanged {
            saw_history_changed = true;
            history.invalidate_after_mutation();
        }
    }
    assert!(saw_history_changed);

    history.fetch_page().await.unwrap();
    assert_eq!(counters.history.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_health_monitor_reads_degraded_and_offline_states() {
    let app = Router::new().route(
        "/health/providers",
        get(|| async {
            Json(serde_json::json!({
                "backend": {"status": "online"},
                "llm": {
                    "provider": "groq",
                    "configured": true,
                    "issue": {"kind": "quota", "message": "quota exceeded for today", "updatedAt": "2026-02-01T00:00:00Z"}
                },
                "airtable": {"configured": false}
            }))
        }),
    );
    let base = common::serve(app).await;
    let api = Arc::new(ApiClient::new(base, None, false));

    let (monitor, snapshot, _refresh) = HealthMonitor::new(api, IssueLog::new());
    monitor.poll_once().await;

    let current = snapshot.read().unwrap().clone();
    assert_eq!(current.backend.status, ProviderStatus::Online);
    assert_eq!(current.llm.status, ProviderStatus::Degraded);
    assert_eq!(current.llm.note.as_deref(), Some("quota exceeded for today"));
    assert_eq!(current.airtable.status, ProviderStatus::Offline);
}

#[tokio::test]
async fn test_health_monitor_marks_all_offline_when_backend_is_gone() {
    // Nothing listens here; the poll fails and degrades everything
    let api = Arc::new(ApiClient::new("http://127.0.0.1:1".into(), None, false).with_timeouts(1, 1));
    let (monitor, snapshot, _refresh) = HealthMonitor::new(api, IssueLog::new());
    monitor.poll_once().await;

    let current = snapshot.read().unwrap().clone();
    assert_eq!(current.backend.status, ProviderStatus::Offline);
    assert_eq!(current.llm.status, ProviderStatus::Offline);
    assert_eq!(current.airtable.status, ProviderStatus::Offline);
    assert_eq!(current.backend.note.as_deref(), Some("Backend is unreachable."));
}
