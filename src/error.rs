use std::time::Duration;

/// Failure talking to the search backend, after the client's own retries.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search backend unreachable: {0}")]
    Unreachable(String),

    #[error("search backend returned {status} for {index}: {body}")]
    Backend {
        index: String,
        status: u16,
        body: String,
    },

    #[error("malformed search response: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Current-window or total-count fetch failed; the report cannot be built.
    #[error("failed to fetch {what} for {date}: {source}")]
    Fetch {
        what: String,
        date: String,
        #[source]
        source: SearchError,
    },

    #[error("report assembly timed out after {0:?}")]
    Timeout(Duration),

    #[error("report assembly cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("reference date out of range: {0}")]
    DateOutOfRange(String),

    #[error("delivery error: {0}")]
    Delivery(String),
}

pub type ReportResult<T> = Result<T, ReportError>;
