use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;
pub type ConfigError = Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("News fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("No cached news for user {0}")]
    NoCachedNews(String),

    #[error("Page {page} is empty (total pages: {total_pages})")]
    EmptyPage { page: usize, total_pages: usize },

    #[error("Invalid request token for action {0}")]
    InvalidToken(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid: {0}")]
    Invalid(String),
}

/// Failure of a single upstream news request.
///
/// None of these are fatal: the orchestrator turns every variant into an
/// absent result and never caches it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("upstream responded with HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport failure: {message}")]
    Transport { message: String, timed_out: bool },

    #[error("upstream responded with HTTP {status} but no articles")]
    EmptyResult { status: u16 },
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl FetchError {
    /// Status code for log lines, or the transport marker.
    pub fn status_label(&self) -> String {
        match self {
            FetchError::Http { status, .. } | FetchError::EmptyResult { status } => {
                status.to_string()
            }
            FetchError::Transport { timed_out: true, .. } => "transport-timeout".to_string(),
            FetchError::Transport { .. } => "transport-failure".to_string(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            FetchError::Http { .. } => "FETCH_HTTP",
            FetchError::Transport { .. } => "FETCH_TRANSPORT",
            FetchError::EmptyResult { .. } => "FETCH_EMPTY_RESULT",
        }
    }
}

impl Error {
    pub fn is_temporary(&self) -> bool {
        matches!(self, Error::Fetch(_) | Error::Io(_))
    }

    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidUrl(_) | Error::Config(_) | Error::InvalidToken(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::Fetch(e) => e.error_code(),
            Error::Io(_) => "IO_ERROR",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Storage(_) => "STORAGE",
            Error::NoCachedNews(_) => "NO_CACHED_NEWS",
            Error::EmptyPage { .. } => "EMPTY_PAGE",
            Error::InvalidToken(_) => "INVALID_TOKEN",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Invalid(_) => "INVALID",
        }
    }
}
