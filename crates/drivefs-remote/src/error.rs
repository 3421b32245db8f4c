use drivefs_config::ConfigError;
use drivefs_core::CoreError;

/// Errors raised while talking to the remote account or refreshing snapshots.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SyncError {
    /// The request never produced a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with a non-success status.
    #[error("Remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The remote rejected our credentials even after a token refresh.
    #[error("Remote rejected the access token. Run `drivefs auth` to re-authorize.")]
    Unauthorized,

    /// A response body did not have the expected shape.
    #[error("Failed to decode remote response: {0}")]
    Decode(String),

    /// Reading or writing local state (credentials file) failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// OAuth flow failure: missing client id, no refresh token, rejected code.
    #[error("Authorization error: {0}")]
    Auth(String),

    /// The fetched metadata could not be turned into a snapshot.
    #[error("Snapshot build failed: {0}")]
    Core(#[from] CoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SyncError {
    /// Returns true if this error is transient and the operation may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SyncError::Status { status, .. } => *status == 429 || *status >= 500,
            SyncError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}
