// Normalized API errors and failure classification

use thiserror::Error;

/// Normalized failure from the request executor.
///
/// Every network call resolves to exactly one of these; nothing is swallowed
/// at this layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request timed out after {timeout_secs}s: {path}")]
    Timeout { path: String, timeout_secs: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {detail}")]
    Status { status: u16, detail: String },

    #[error("Failed to parse response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Classified failure kind, used for provider-issue bookkeeping and
/// user-facing notices. Classification is by message content and status
/// code, not by error type, so backend-originated detail strings are
/// honored wherever they surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NetworkUnreachable,
    Timeout,
    RateLimited,
    StoreRejected,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkUnreachable => "network_unreachable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::StoreRejected => "store_rejected",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify a normalized error into its failure kind
pub fn classify(err: &ApiError) -> ErrorKind {
    match err {
        ApiError::Timeout { .. } => ErrorKind::Timeout,
        // Transport failures are unreachability regardless of wording
        ApiError::Network(_) => ErrorKind::NetworkUnreachable,
        ApiError::Status { status, detail } => classify_message(Some(*status), detail),
        ApiError::Decode(msg) => classify_message(None, msg),
    }
}

/// Classify from an HTTP status and a free-form message
pub fn classify_message(status: Option<u16>, message: &str) -> ErrorKind {
    let text = message.to_lowercase();

    if status == Some(429)
        || text.contains("quota")
        || text.contains("resource_exhausted")
        || text.contains("rate limit")
        || text.contains("too many requests")
    {
        return ErrorKind::RateLimited;
    }

    if status == Some(422)
        || text.contains("airtable")
        || text.contains("invalid_multiple_choice_options")
    {
        return ErrorKind::StoreRejected;
    }

    if text.contains("network") || text.contains("failed to fetch") {
        return ErrorKind::NetworkUnreachable;
    }

    ErrorKind::Unknown
}
