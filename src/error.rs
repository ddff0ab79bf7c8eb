//! Error types for fetching and persistence.

use std::path::PathBuf;
use thiserror::Error;

/// A single page request failed.
///
/// Fatal to that page only; the pagination loop stops and keeps what it has.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connection failure or any other error from the HTTP client.
    #[error("error sending request to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with something other than 200 OK.
    #[error("unexpected status code {status} from {url}")]
    Status { url: String, status: u16 },

    /// The redirect chain was longer than the client allows.
    #[error("too many redirects while fetching {url}")]
    TooManyRedirects { url: String },

    /// The body could not be read.
    #[error("error reading response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Writing the snapshot failed.
///
/// For mutating calls the in-memory state already reflects the change.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create data directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A mutating store call whose change is live in memory but not on disk.
///
/// `applied` is what the call would have returned on success.
#[derive(Debug, Error)]
#[error("change applied but not persisted: {source}")]
pub struct NotPersisted<T: std::fmt::Debug> {
    pub applied: T,
    #[source]
    pub source: StoreError,
}

impl<T: std::fmt::Debug> NotPersisted<T> {
    /// Keep the result, dropping the durability failure
    pub fn into_applied(self) -> T {
        self.applied
    }
}

/// Result of a mutating store call
pub type Persisted<T> = Result<T, NotPersisted<T>>;
