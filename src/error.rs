use thiserror::Error;

pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Why a page or document could not be fetched. Callers treat every variant
/// as "this candidate failed" and move on.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out fetching {0}")]
    Timeout(String),

    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Failed to read body of {url}: {message}")]
    Body { url: String, message: String },
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        if err.is_timeout() {
            FetchError::Timeout(url)
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
                url,
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }
}
