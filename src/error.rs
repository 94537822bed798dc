//! Crate & wire level errors.
//!
//! # Error Hierarchy
//!
//! The crate uses a two-layer error hierarchy:
//!
//! ## Wire Layer (`crate::error`)
//!
//! - [`Error`]: connection, framing and start-up configuration errors
//!
//! ## Cluster Layer (`crate::cluster::error`)
//!
//! - [`ClusterError`]: directory, metadata store, membership and validation errors
//!
//! ## Conversion
//!
//! [`ClusterError`] can be converted to [`Error`] via `From` impl,
//! allowing cluster errors to propagate through the wire layer.
//!
//! [`ClusterError`]: crate::cluster::ClusterError

use std::{io, result};
use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

/// Wire and connection level errors.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
    /// An error in the network.
    #[error("IO error: {0:?}")]
    IoError(io::ErrorKind),

    /// A frame could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A frame could not be encoded.
    #[error("Encode error: {0}")]
    Encode(String),

    /// A peer announced a frame larger than we accept.
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The peer did not answer in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Missing data or connection closed.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::IoError(a), Error::IoError(b)) => a == b,
            (Error::Decode(a), Error::Decode(b)) => a == b,
            (Error::Encode(a), Error::Encode(b)) => a == b,
            (
                Error::FrameTooLarge { size: a, max: m },
                Error::FrameTooLarge { size: b, max: n },
            ) => a == b && m == n,
            (Error::Timeout(a), Error::Timeout(b)) => a == b,
            (Error::MissingData(a), Error::MissingData(b)) => a == b,
            (Error::Config(a), Error::Config(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IoError(e.kind())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<crate::cluster::ClusterError> for Error {
    fn from(e: crate::cluster::ClusterError) -> Self {
        use crate::cluster::ClusterError;
        match e {
            ClusterError::Io(io_err) => Error::IoError(io_err.kind()),
            ClusterError::Config(msg) => Error::Config(msg),
            other => Error::Config(other.to_string()),
        }
    }
}
