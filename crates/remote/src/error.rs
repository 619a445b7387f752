//! Remote error taxonomy.
//!
//! Only [`RemoteError::Rejected`] is transient. Everything else is a
//! permanent failure of the request it came from.

use std::time::Duration;

use thiserror::Error;

/// Message of [`RemoteError::TooLarge`].
pub const TOO_LARGE_MESSAGE: &str =
    "Remote responded with a chunk that was too large. Use a smaller batch size.";

/// Failure of the transport itself, below HTTP semantics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection or protocol I/O failure.
    #[error("i/o error talking to remote: {0}")]
    Io(String),

    /// The response body exceeded the configured buffer.
    #[error("entity content is too long for the configured buffer limit [{limit}]")]
    BodyTooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },

    /// The request did not complete in time.
    #[error("request to remote timed out after {0:?}")]
    Timeout(Duration),

    /// The transport was already closed.
    #[error("transport is closed")]
    Closed,
}

/// Classified failure of a request to a remote cluster.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote is overloaded (HTTP 429). Safe to retry.
    #[error("remote rejected the request [{status}]: {message}")]
    Rejected {
        /// Always 429.
        status: u16,
        /// Response body or a placeholder.
        message: String,
    },

    /// Any other non-success status.
    #[error("remote responded with status [{status}]: {message}")]
    Status {
        /// HTTP status, or 500 if the remote sent an invalid one.
        status: u16,
        /// Response body or a placeholder.
        message: String,
    },

    /// A success response without a content type.
    #[error("Response didn't include Content-Type: body={body}")]
    MissingContentType {
        /// Raw response body.
        body: String,
    },

    /// A success response in a format this client cannot read.
    #[error(
        "Response didn't include supported Content-Type, remote is likely not a compatible server instance [{content_type}]"
    )]
    UnsupportedContentType {
        /// The content type the remote sent.
        content_type: String,
    },

    /// The response body exceeded the size bound.
    #[error("{}", TOO_LARGE_MESSAGE)]
    TooLarge {
        /// The size-limit error reported by the transport.
        #[source]
        source: TransportError,
    },

    /// The body was not the JSON this client expects.
    #[error("Error parsing the response, remote is likely not a compatible server instance")]
    Incompatible {
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },

    /// The body could not be read.
    #[error("Error deserializing response, remote is likely not a compatible server instance")]
    Deserialize {
        /// Read failure.
        #[source]
        source: TransportError,
    },

    /// The request did not produce a response.
    #[error("request to remote failed")]
    Transport(#[source] TransportError),
}

impl RemoteError {
    /// Returns `true` for the retryable rejection channel.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } | Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<TransportError> for RemoteError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::BodyTooLarge { .. } => Self::TooLarge { source: error },
            other => Self::Transport(other),
        }
    }
}
