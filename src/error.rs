use thiserror::Error;

// Transport failures. Retried inside the fetcher, then surfaced to the adapter
// as "no document".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("HTTP error: {status_code} for {url}")]
    HttpStatus { status_code: u16, url: String },

    #[error("Client error: {0}")]
    ClientError(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::NetworkError(_) | FetchError::Timeout(_) => true,
            FetchError::HttpStatus { status_code, .. } => {
                *status_code == 429 || *status_code >= 500
            }
            FetchError::ClientError(_) => false,
        }
    }
}

// Shape failures inside one extraction strategy. Never leave the pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("Embedded data block not found: {0}")]
    MissingBlock(String),

    #[error("JSON parse error: {0}")]
    InvalidJson(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

// Failures that reach the adapter boundary, where they become a diagnostic
// placeholder listing.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl From<url::ParseError> for AdapterError {
    fn from(err: url::ParseError) -> Self {
        AdapterError::InvalidRequest(err.to_string())
    }
}
