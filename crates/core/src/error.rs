use crate::api::ApiError;
use crate::fetch::FetchError;
use std::path::PathBuf;

/// Errors raised by the scrapers, the store and the import forwarder.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unknown provider `{0}` (expected lower-chamber or upper-chamber)")]
    UnknownProvider(String),
    #[error("the year {0} is not an available option")]
    YearNotFound(i32),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
