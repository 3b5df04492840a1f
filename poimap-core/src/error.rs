use poimap_source::SourceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("data source failed: {0}")]
    Source(#[from] SourceError),

    #[error("load cycle {ticket} superseded by cycle {current}")]
    Stale { ticket: u64, current: u64 },

    #[error("no geocoding result for '{0}'")]
    NoGeocodeResult(String),

    #[error("unknown category '{0}'")]
    UnknownCategory(String),

    #[error("unknown marker #{0}")]
    UnknownMarker(usize),
}

pub type Result<T> = std::result::Result<T, LoadError>;
