//! Error types for relay transfers.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while producing, consuming or merging a transfer.
#[derive(Error, Debug)]
pub enum TransferError {
    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// HTTP request error talking to the relay or a download source.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// JSON configuration could not be read or written.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    /// Malformed XML in a WebDAV response.
    #[error(transparent)]
    XmlError(#[from] quick_xml::Error),

    /// The relay answered a request with an unexpected status.
    #[error("relay {operation} of {target} failed: HTTP {status}")]
    RelayStatus {
        operation: &'static str,
        target: String,
        status: reqwest::StatusCode,
    },

    /// Not enough free space locally or on the relay to start a session.
    #[error("insufficient {location} space: need more than {required} bytes, {available} available")]
    InsufficientSpace {
        location: &'static str,
        required: u64,
        available: u64,
    },

    /// A required input (file name, link, credentials) was not supplied.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// The configuration cannot be used as given.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The manifest text could not be parsed.
    #[error("malformed manifest at line {line}: {reason}")]
    Manifest { line: usize, reason: String },

    /// Downloaded bytes do not hash to the expected checksum.
    #[error("checksum mismatch for {chunk}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        chunk: String,
        expected: String,
        actual: String,
    },

    /// A chunk could not be fetched with a valid checksum within the retry budget.
    #[error("failed to obtain valid chunk {chunk} after {attempts} attempts: {source}")]
    VerificationFailed {
        chunk: String,
        attempts: usize,
        #[source]
        source: Box<TransferError>,
    },

    /// Source acquisition (HTTP or torrent) failed.
    #[error("source acquisition failed: {0}")]
    AcquisitionFailed(String),

    /// A polling wait exceeded the configured maximum.
    #[error("gave up waiting for {what} after {}", format_wait(.waited))]
    WaitTimedOut { what: String, waited: Duration },
}

fn format_wait(waited: &Duration) -> String {
    humantime::format_duration(*waited).to_string()
}

impl TransferError {
    pub(crate) fn join(e: tokio::task::JoinError) -> Self {
        TransferError::IoError(io::Error::other(format!("Task join error: {}", e)))
    }
}
