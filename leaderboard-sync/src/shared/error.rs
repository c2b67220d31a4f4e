use thiserror::Error;

/// All errors generated in `leaderboard-sync`.
///
/// None of these are fatal to the process: transport errors feed the reconnect loop,
/// frame errors drop a single message and fetch errors surface as a one-shot
/// [`PollFailure`](crate::shared::polling::PollFailure).
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed frame: {0}")]
    Frame(String),

    #[error("leaderboard fetch failed: {0}")]
    Fetch(String),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid configuration for {key}: {reason}")]
    Config { key: &'static str, reason: String },
}

impl SyncError {
    /// Determine if an error is expected to clear up on its own by retrying later.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport(_) | SyncError::Fetch(_) => true,
            SyncError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(value: serde_json::Error) -> Self {
        Self::Frame(value.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(value: reqwest::Error) -> Self {
        match value.status() {
            Some(status) => Self::Status {
                status: status.as_u16(),
                url: value
                    .url()
                    .map(|url| url.to_string())
                    .unwrap_or_default(),
            },
            None if value.is_decode() => Self::Frame(value.to_string()),
            None => Self::Fetch(value.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(value.to_string())
    }
}
