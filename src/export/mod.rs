// Export coordination: server-first downloads with a deterministic
// client-side CSV fallback.
//
// Each export kind carries its own in-flight guard so a double trigger
// cannot start a duplicate download; the guard is released on every exit
// path. Export jobs keep no state beyond that flag.

use crate::api::{ApiClient, ApiError};
use crate::models::ResearchSession;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to write export file: {0}")]
    Io(#[from] std::io::Error),
}

/// How an export resolved. Server and local-fallback paths are kept
/// distinct so their success messages are never confused.
#[derive(Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Server-rendered bytes written to this path
    Server(PathBuf),
    /// CSV synthesized from the currently loaded page ("exported from
    /// local data"); lossy by design
    LocalFallback(PathBuf),
    /// An export of the same kind is already in flight
    Skipped,
}

/// Releases the in-flight flag on drop, covering every exit path
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ExportManager {
    api: Arc<ApiClient>,
    export_dir: PathBuf,
    pdf_in_flight: AtomicBool,
    csv_in_flight: AtomicBool,
}

impl ExportManager {
    pub fn new(api: Arc<ApiClient>, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            api,
            export_dir: export_dir.into(),
            pdf_in_flight: AtomicBool::new(false),
            csv_in_flight: AtomicBool::new(false),
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Download one session's PDF. The file name is deterministic from the
    /// session id. No fallback exists: a per-session PDF cannot be
    /// synthesized client-side, so any failure is surfaced as-is.
    pub async fn export_pdf(&self, session_id: &str) -> Result<ExportOutcome, ExportError> {
        let _guard = match InFlightGuard::acquire(&self.pdf_in_flight) {
            Some(guard) => guard,
            None => {
                log::debug!("PDF export already in flight, ignoring");
                return Ok(ExportOutcome::Skipped);
            }
        };

        let bytes = self.api.export_pdf(session_id).await?;
        let path = self.export_dir.join(format!("cerebro-{}.pdf", session_id));
        tokio::fs::write(&path, &bytes).await?;
        log::info!("PDF export written to {}", path.display());
        Ok(ExportOutcome::Server(path))
    }

    /// Export history as CSV, server-first. If the server call fails for
    /// any reason, synthesize a CSV from the currently loaded page instead;
    /// the outcome tells the two paths apart.
    pub async fn export_csv(
        &self,
        current_items: &[ResearchSession],
    ) -> Result<ExportOutcome, ExportError> {
        let _guard = match InFlightGuard::acquire(&self.csv_in_flight) {
            Some(guard) => guard,
            None => {
                log::debug!("CSV export already in flight, ignoring");
                return Ok(ExportOutcome::Skipped);
            }
        };

        match self.api.export_csv().await {
            Ok(bytes) => {
                let path = self.export_dir.join("cerebro-history.csv");
                tokio::fs::write(&path, &bytes).await?;
                log::info!("CSV export written to {}", path.display());
                Ok(ExportOutcome::Server(path))
            }
            Err(err) => {
                log::warn!("server CSV export failed ({}), exporting from local data", err);
                let csv = build_local_csv(current_items);
                let path = self.export_dir.join("cerebro-history-local.csv");
                tokio::fs::write(&path, csv.as_bytes()).await?;
                Ok(ExportOutcome::LocalFallback(path))
            }
        }
    }
}

/// Synthesize a CSV from the currently loaded (paginated, filtered) result
/// set. Lossy: only the current page, not the full history.
pub fn build_local_csv(items: &[ResearchSession]) -> String {
    let mut out = String::from("sessionId,createdAt,title,description,subtopics\n");
    for item in items {
        let subtopics = item
            .outline
            .sub_topics
            .iter()
            .map(|s| s.title.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let row = [
            item.session_id.as_str(),
            item.created_at.as_deref().unwrap_or(""),
            item.outline.title.as_str(),
            item.outline.description.as_str(),
            subtopics.as_str(),
        ]
        .iter()
        .map(|field| csv_field(field))
        .collect::<Vec<_>>()
        .join(",");
        out.push_str(&row);
        out.push('\n');
    }
    out
}

/// Quote a CSV field when needed, doubling internal double quotes
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
