// Shared helpers for integration tests: an in-process stub backend the
// client runs against.

use axum::Router;

/// Bind a stub backend on an ephemeral port and serve the given routes.
/// Returns the base URL to point the client at.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub serve");
    });
    format!("http://{}", addr)
}

/// A canned session body in the backend's wire shape
pub fn session_json(session_id: &str, title: &str) -> serde_json::Value {
    serde_json::json!({
        "sessionId": session_id,
        "outline": {
            "title": title,
            "description": "A structured overview.",
            "subTopics": [
                {"id": "1", "title": "Superconducting Qubits", "description": "Hardware"},
                {"id": "2", "title": "Error Correction", "description": "Reliability"},
                {"id": "3", "title": "Algorithms", "description": "Software"},
                {"id": "4", "title": "Applications", "description": "Uses"}
            ]
        },
        "tags": [],
        "progress": 50
    })
}
