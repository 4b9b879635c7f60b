use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Conditions that stop a batch.
///
/// Per-file problems that a batch survives (unsupported media, unreadable
/// metadata, duplicates, coordinates the geocoder rejects) are reported as
/// [`crate::Outcome`] values or logged, never as an `Error`.
#[derive(Error, Debug)]
pub enum Error {
    /// Reverse geocoding service unreachable or refusing requests
    #[error("geocoding service unavailable: {0}")]
    GeocoderUnavailable(String),

    /// Cancellation requested through a [`crate::CancellationToken`]
    #[error("operation cancelled")]
    Cancelled,

    /// I/O failure on a specific path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Address cache could not be read or written
    #[error("address cache {}: {reason}", path.display())]
    Cache { path: PathBuf, reason: String },

    /// Run state could not be read or written
    #[error("run state {}: {reason}", path.display())]
    State { path: PathBuf, reason: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
