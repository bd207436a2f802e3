use thiserror::Error;

/// Maximum number of characters of an upstream body kept for diagnostics.
pub const BODY_PREVIEW_CHARS: usize = 200;

/// Failures of the secret store holding the OAuth record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("No stored credentials found")]
    NotFound,
    #[error("Stored credentials are corrupt: {0}")]
    Corrupt(String),
    #[error("Credential store unavailable: {0}")]
    Unavailable(String),
}

/// Everything `fetch_usage` can fail with.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("Usage API returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("Request to {0} timed out")]
    Timeout(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FetchError {
    pub fn upstream(status: u16, body: &str) -> Self {
        Self::Upstream {
            status,
            body: truncate_body(body),
        }
    }

    /// Stable machine-readable name of the failure, for JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::RefreshFailed(_) => "refresh_failed",
            Self::Upstream { .. } => "upstream_error",
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network",
            Self::Store(StoreError::NotFound) => "unauthenticated",
            Self::Store(StoreError::Corrupt(_)) => "store_corrupt",
            Self::Store(StoreError::Unavailable(_)) => "store_unavailable",
        }
    }

    pub fn login_required() -> Self {
        Self::Unauthenticated(
            "No OAuth credentials found. Run `claude` and log in first.".to_string(),
        )
    }
}

/// Cut a response body down to a short preview, on a char boundary.
pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(BODY_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
