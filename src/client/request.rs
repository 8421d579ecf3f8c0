//! # Request Construction
//!
//! Validates user inputs and encodes them as the multipart body the remote
//! service expects:
//!
//! ```text
//! POST <forward|reverse endpoint>
//! Content-Type: multipart/form-data; boundary=...
//!
//! file      (binary, carries the original file name)
//! password  (text)
//! ```
//!
//! The body is sent once. There is no retry, chunking or resume.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Body;

use crate::common::error::{TransportError, ValidationError};
use crate::common::messages::{SubmitInput, TransformRequest};

pub const FILE_FIELD: &str = "file";
pub const PASSWORD_FIELD: &str = "password";
/// Field carrying the payload of a roundtrip self-check.
pub const CONTENT_FIELD: &str = "content";

/// Check the inputs and turn them into a [`TransformRequest`].
///
/// The file is checked first. Content is not inspected: a zero-byte file that
/// was explicitly selected is still a selection, and password policy belongs
/// to the remote service.
pub fn validate(input: SubmitInput) -> Result<TransformRequest, ValidationError> {
    let file = input.file.ok_or(ValidationError::MissingFile)?;

    if input.password.is_empty() {
        return Err(ValidationError::MissingPassword);
    }

    Ok(TransformRequest {
        file,
        password: input.password,
        operation: input.operation,
    })
}

/// Encode a validated request as multipart form data.
pub fn build_form(request: &TransformRequest) -> Result<Form, TransportError> {
    let file = binary_part(request.file.bytes.clone(), &request.file.name)?;

    Ok(Form::new()
        .part(FILE_FIELD, file)
        .text(PASSWORD_FIELD, request.password.clone()))
}

/// Encode a roundtrip self-check body.
pub fn build_roundtrip_form(content: Bytes, password: &str) -> Result<Form, TransportError> {
    let part = binary_part(content, "content")?;

    Ok(Form::new()
        .part(CONTENT_FIELD, part)
        .text(PASSWORD_FIELD, password.to_string()))
}

/// The part shares the caller's buffer; the upload is never copied.
fn binary_part(bytes: Bytes, file_name: &str) -> Result<Part, TransportError> {
    let length = bytes.len() as u64;
    Part::stream_with_length(Body::from(bytes), length)
        .file_name(file_name.to_string())
        .mime_str("application/octet-stream")
        .map_err(|e| TransportError::Request(e.to_string()))
}
