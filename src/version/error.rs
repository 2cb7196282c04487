use thiserror::Error;

/// Failure of a single HTTP JSON fetch, after retries
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Upstream answered with a non-success status
    #[error("Upstream returned status {status}")]
    Status { status: u16, body: String },

    #[error("Request timed out")]
    Timeout,

    /// Body could not be decoded as JSON; retried by the fetcher
    #[error("Malformed JSON body: {0}")]
    Parse(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Package not found: {0}")]
    NotFound(String),

    #[error("Rate limited (blocked: {blocked})")]
    RateLimited { blocked: bool },

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Invalid response: {0}")]
    Validation(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),
}

impl RegistryError {
    /// HTTP status the response layer answers with for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            RegistryError::NotFound(_) => 404,
            RegistryError::Timeout => 504,
            _ => 502,
        }
    }
}

impl From<FetchError> for RegistryError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Timeout => RegistryError::Timeout,
            FetchError::Status { status, .. } => {
                RegistryError::Upstream(format!("Unexpected status: {}", status))
            }
            // Retries are exhausted by the time a parse error gets here
            FetchError::Parse(msg) | FetchError::Transport(msg) => RegistryError::Upstream(msg),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to create store directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}
