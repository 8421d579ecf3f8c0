//! # Error Types
//!
//! The three ways a submission can end without an artifact:
//! - [`ValidationError`]: inputs rejected locally, nothing was sent
//! - A remote failure: carried as [`TransformOutcome::Failure`](super::messages::TransformOutcome)
//! - [`TransportError`]: the exchange itself broke down

use std::time::Duration;
use thiserror::Error;

/// Inputs rejected before any network activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Choose a file")]
    MissingFile,

    #[error("Enter password")]
    MissingPassword,
}

/// The request could not be completed at the transport level.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The multipart body or the HTTP request could not be built.
    #[error("could not build request: {0}")]
    Request(String),

    /// Connecting, sending or receiving failed.
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// No complete response within the configured deadline.
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// A success response whose body did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The artifact arrived but could not be handed to the save target.
    #[error("could not save artifact: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Failures while handing an artifact to the save target.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transient handle was released before the save read it.
    #[error("transient handle {0} was already released")]
    HandleReleased(uuid::Uuid),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
