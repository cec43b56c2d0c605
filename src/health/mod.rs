// Provider health aggregation
//
// Polls `/health/providers` on a fixed interval with a short deadline and
// derives a tri-state status per upstream dependency. Poll failures never
// propagate; they only degrade the published snapshot until the next tick.

use crate::api::{ApiClient, ApiError, ErrorKind};
use crate::models::ProviderHealthReport;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// Fixed polling interval; each tick is an independent attempt, no backoff
pub const POLL_INTERVAL_SECS: u64 = 15;

/// Note shown when the poll itself fails
pub const BACKEND_UNREACHABLE_NOTE: &str = "Backend is unreachable.";

/// Tri-state status of one dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Online,
    Degraded,
    Offline,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Online => "online",
            ProviderStatus::Degraded => "degraded",
            ProviderStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The dependencies whose health is independently tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Backend,
    Llm,
    Airtable,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Backend => "backend",
            Provider::Llm => "llm",
            Provider::Airtable => "airtable",
        }
    }
}

/// Status plus the freshest explanation for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderState {
    pub status: ProviderStatus,
    pub note: Option<String>,
}

impl ProviderState {
    fn new(status: ProviderStatus) -> Self {
        Self { status, note: None }
    }

    fn with_note(status: ProviderStatus, note: Option<String>) -> Self {
        Self { status, note }
    }
}

/// Last-observed health picture; refreshed on the poll interval and after
/// every mutating operation, never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub backend: ProviderState,
    pub llm: ProviderState,
    pub airtable: ProviderState,
    pub checked_at: Option<DateTime<Utc>>,
}

impl HealthSnapshot {
    /// Initial state before the first poll completes
    pub fn unknown() -> Self {
        Self {
            backend: ProviderState::new(ProviderStatus::Offline),
            llm: ProviderState::new(ProviderStatus::Offline),
            airtable: ProviderState::new(ProviderStatus::Offline),
            checked_at: None,
        }
    }
}

/// A classified mutation failure observed client-side
#[derive(Debug, Clone)]
pub struct ObservedIssue {
    pub kind: ErrorKind,
    pub message: String,
    pub observed_at: DateTime<Utc>,
}

/// Latest classified mutation error per provider. Written by the lifecycle
/// orchestrator, read by the health derivation; the local note wins over
/// the polled issue so the user sees the most specific, freshest
/// explanation.
#[derive(Clone)]
pub struct IssueLog {
    inner: Arc<Mutex<HashMap<Provider, ObservedIssue>>>,
}

impl IssueLog {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a classified failure against the provider it implicates
    pub fn record(&self, kind: ErrorKind, message: &str) {
        let provider = match kind {
            ErrorKind::RateLimited => Provider::Llm,
            ErrorKind::StoreRejected => Provider::Airtable,
            ErrorKind::NetworkUnreachable | ErrorKind::Timeout => Provider::Backend,
            // Mutations are LLM-backed, so unclassified failures land there
            ErrorKind::Unknown => Provider::Llm,
        };
        let issue = ObservedIssue {
            kind,
            message: message.to_string(),
            observed_at: Utc::now(),
        };
        self.inner
            .lock()
            .expect("issue log lock poisoned")
            .insert(provider, issue);
    }

    /// Clear a provider's note after an operation it serves succeeds
    pub fn clear(&self, provider: Provider) {
        self.inner
            .lock()
            .expect("issue log lock poisoned")
            .remove(&provider);
    }

    pub fn latest(&self, provider: Provider) -> Option<ObservedIssue> {
        self.inner
            .lock()
            .expect("issue log lock poisoned")
            .get(&provider)
            .cloned()
    }
}

impl Default for IssueLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive the snapshot for one poll outcome.
///
/// Poll failure means all three dependencies read offline. On success the
/// backend is online and each dependency is degraded when the backend
/// reports an issue for it, online when configured, offline otherwise.
pub fn derive_snapshot(
    poll: Result<&ProviderHealthReport, &ApiError>,
    issues: &IssueLog,
) -> HealthSnapshot {
    let checked_at = Some(Utc::now());
    let local_note = |provider: Provider| issues.latest(provider).map(|i| i.message);

    let report = match poll {
        Ok(report) => report,
        Err(err) => {
            log::warn!("health poll failed: {}", err);
            return HealthSnapshot {
                backend: ProviderState::with_note(
                    ProviderStatus::Offline,
                    Some(BACKEND_UNREACHABLE_NOTE.to_string()),
                ),
                llm: ProviderState::with_note(ProviderStatus::Offline, local_note(Provider::Llm)),
                airtable: ProviderState::with_note(
                    ProviderStatus::Offline,
                    local_note(Provider::Airtable),
                ),
                checked_at,
            };
        }
    };

    let dependency_state = |configured: bool,
                           issue: Option<&crate::models::ProviderIssue>,
                           provider: Provider| {
        let status = if issue.is_some() {
            ProviderStatus::Degraded
        } else if configured {
            ProviderStatus::Online
        } else {
            ProviderStatus::Offline
        };
        let note = local_note(provider).or_else(|| issue.map(|i| i.message.clone()));
        ProviderState::with_note(status, note)
    };

    HealthSnapshot {
        backend: ProviderState::with_note(ProviderStatus::Online, local_note(Provider::Backend)),
        llm: dependency_state(report.llm.configured, report.llm.issue.as_ref(), Provider::Llm),
        airtable: dependency_state(
            report.airtable.configured,
            report.airtable.issue.as_ref(),
            Provider::Airtable,
        ),
        checked_at,
    }
}

/// Periodic health poller publishing into a shared snapshot
pub struct HealthMonitor {
    api: Arc<ApiClient>,
    issues: IssueLog,
    snapshot: Arc<RwLock<HealthSnapshot>>,
    refresh_rx: mpsc::UnboundedReceiver<()>,
}

/// Handle for nudging the monitor into an immediate re-poll
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl RefreshHandle {
    pub fn refresh(&self) {
        let _ = self.tx.send(());
    }
}

impl HealthMonitor {
    pub fn new(
        api: Arc<ApiClient>,
        issues: IssueLog,
    ) -> (Self, Arc<RwLock<HealthSnapshot>>, RefreshHandle) {
        let snapshot = Arc::new(RwLock::new(HealthSnapshot::unknown()));
        let (tx, refresh_rx) = mpsc::unbounded_channel();
        let monitor = Self {
            api,
            issues,
            snapshot: snapshot.clone(),
            refresh_rx,
        };
        (monitor, snapshot, RefreshHandle { tx })
    }

    /// Poll once and publish the derived snapshot. Never returns an error;
    /// a failed poll is itself a health signal.
    pub async fn poll_once(&self) {
        let result = self.api.provider_health().await;
        let derived = derive_snapshot(result.as_ref(), &self.issues);
        log::debug!(
            "health: backend={} llm={} airtable={}",
            derived.backend.status,
            derived.llm.status,
            derived.airtable.status
        );
        *self.snapshot.write().expect("health snapshot lock poisoned") = derived;
    }

    /// Run forever: fixed-interval ticks plus on-demand refresh nudges
    /// after mutations. Each attempt is independent.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(POLL_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_once().await,
                nudge = self.refresh_rx.recv() => match nudge {
                    Some(()) => self.poll_once().await,
                    // All senders dropped: the owning front end is gone
                    None => break,
                },
            }
        }
    }
}
