use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

pub use crate::messenger::RequestError;
pub use crate::protocol::error::Error as ProtocolError;

use crate::backoff::BackoffError;

/// Which entity a failed request was about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestContext {
    /// Request was for a topic.
    Topic(String),

    /// Request was for a consumer group.
    Group(String),

    /// Request was sent to a specific broker.
    Broker(i32),
}

impl Display for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Topic(t) => write!(f, "topic \"{t}\""),
            Self::Group(g) => write!(f, "group \"{g}\""),
            Self::Broker(b) => write!(f, "broker {b}"),
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] crate::connection::Error),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(
        "Server error {protocol_error:?} with message \"{}\" for {request}",
        error_message.as_deref().unwrap_or("")
    )]
    ServerError {
        /// Protocol-level error.
        protocol_error: ProtocolError,

        /// Free-form error message the broker sent along.
        error_message: Option<String>,

        /// What the request was about.
        request: RequestContext,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("All retries failed: {0}")]
    RetryFailed(#[from] BackoffError),
}

impl Error {
    /// The protocol error carried by [`Error::ServerError`], if any.
    pub fn protocol_error(&self) -> Option<ProtocolError> {
        match self {
            Self::ServerError { protocol_error, .. } => Some(*protocol_error),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
