use crate::visualizer::timeline::time_domain::TimeMs;

/// Rejected user or API input. Prior state is kept and nothing is fetched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("range end {end} is not after start {start}")]
    EmptyRange { start: TimeMs, end: TimeMs },
    #[error("cannot parse time bound '{input}': {reason}")]
    InvalidBound { input: String, reason: String },
    #[error("time bound is not a finite number")]
    NonFinite,
}

/// Failure of a single data-source request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Missing credential or the server refused it. Not surfaced as a failure.
    #[error("not authorized")]
    Unauthorized,
    #[error("network error: {0}")]
    Network(String),
    #[error("server responded with {status}: {message}")]
    Server { status: u16, message: String },
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("cannot request range: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Unauthorized)
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(error: serde_json::Error) -> Self {
        FetchError::Decode(error.to_string())
    }
}
