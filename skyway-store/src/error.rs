use skyway_core::repository::RepositoryError;
use skyway_core::session::SessionError;
use skyway_core::CoreError;

/// Failures talking to the hosted collaborators over HTTP or to Redis.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP error calling {0}: {1}")]
    Http(String, String),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response from {0}: {1}")]
    Decode(String, String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        let host = e
            .url()
            .map(|u| u.host_str().unwrap_or("?").to_owned())
            .unwrap_or_default();
        if e.is_decode() {
            StoreError::Decode(host, e.to_string())
        } else {
            StoreError::Http(host, e.to_string())
        }
    }
}

impl StoreError {
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<StoreError> for RepositoryError {
    fn from(e: StoreError) -> Self {
        match e.status() {
            Some(404) => RepositoryError::NotFound(e.to_string()),
            Some(409) => RepositoryError::Conflict(e.to_string()),
            _ => RepositoryError::Backend(e.to_string()),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        SessionError::Store(e.to_string())
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        CoreError::InternalError(e.to_string())
    }
}
