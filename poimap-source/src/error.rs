use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[source] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] ::csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

// Query strings may carry access tokens.
impl From<reqwest::Error> for SourceError {
    fn from(mut err: reqwest::Error) -> Self {
        if let Some(url) = err.url_mut() {
            url.set_query(None);
        }
        SourceError::HttpError(err)
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
