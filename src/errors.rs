use thiserror::Error;

/// Why a story input could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{path} not found")]
    NotFound { path: String },

    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("decoding {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("{path} has no rows")]
    Empty { path: String },
}
