//! # Request and Outcome Types
//!
//! Defines the values exchanged between the presentation surface, the core
//! client and the remote transform service:
//! - What the user selected ([`SelectedFile`], [`SubmitInput`])
//! - What is sent over the wire ([`TransformRequest`], [`Operation`])
//! - What came back ([`TransformOutcome`])
//!
//! None of these are persisted. A request is built fresh for every submission
//! and an outcome is consumed as soon as it is interpreted.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ============================================================================
// OPERATION SELECTOR
// ============================================================================

/// Which transform the remote service should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Apply the forward transform (encrypt).
    Forward,
    /// Apply the reverse transform (decrypt).
    Reverse,
}

impl Operation {
    /// Label shown on the submit action while the client is idle.
    pub fn label(self) -> &'static str {
        match self {
            Operation::Forward => "Encrypt",
            Operation::Reverse => "Decrypt",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Forward => write!(f, "forward"),
            Operation::Reverse => write!(f, "reverse"),
        }
    }
}

// ============================================================================
// USER INPUTS
// ============================================================================

/// A file picked by the user: its display name and its full content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, keeping only its final path component as the name.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        Ok(Self::new(name, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Raw inputs as the presentation surface holds them at the moment of submit.
///
/// Nothing here is validated yet; see
/// [`validate`](crate::client::request::validate).
#[derive(Debug, Clone)]
pub struct SubmitInput {
    pub file: Option<SelectedFile>,
    pub password: String,
    pub operation: Operation,
}

impl SubmitInput {
    pub fn new(file: Option<SelectedFile>, password: impl Into<String>, operation: Operation) -> Self {
        Self {
            file,
            password: password.into(),
            operation,
        }
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// A validated request, ready to be encoded as multipart form data.
///
/// Only [`validate`](crate::client::request::validate) constructs these, so a
/// `TransformRequest` always carries a file and a non-empty password.
#[derive(Clone)]
pub struct TransformRequest {
    pub(crate) file: SelectedFile,
    pub(crate) password: String,
    pub(crate) operation: Operation,
}

impl TransformRequest {
    pub fn file(&self) -> &SelectedFile {
        &self.file
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }
}

// Keep the password out of logs.
impl fmt::Debug for TransformRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRequest")
            .field("file", &self.file.name)
            .field("bytes", &self.file.len())
            .field("password", &"<redacted>")
            .field("operation", &self.operation)
            .finish()
    }
}

/// Result of one round trip to the remote service.
///
/// Exactly one variant is produced per submission that got a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The service returned an artifact.
    Success {
        artifact_bytes: Bytes,
        suggested_filename: String,
    },

    /// The service answered but rejected or could not complete the request.
    Failure { message: String },
}
