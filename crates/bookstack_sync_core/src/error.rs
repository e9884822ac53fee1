use reqwest::StatusCode;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("invalid front matter: {0}")]
    Format(String),

    #[error("BookStack page write failed with HTTP {status}")]
    RemoteWrite { status: StatusCode },

    #[error("invalid BookStack configuration: {0}")]
    Configuration(String),

    #[error("failed to call BookStack API")]
    Transport(#[source] reqwest::Error),

    #[error("unexpected BookStack API response: {0}")]
    InvalidResponse(String),
}

impl SyncError {
    /// HTTP status of a rejected write, if this error carries one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::RemoteWrite { status } => Some(*status),
            _ => None,
        }
    }
}
