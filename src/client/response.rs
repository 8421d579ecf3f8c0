//! # Response Interpretation
//!
//! Turns an HTTP reply from the remote service into a [`TransformOutcome`].
//!
//! ## Failure replies (non-2xx)
//!
//! The user-facing message is picked in this order:
//! 1. `detail` from a JSON object body (`{"detail": "bad password"}`)
//! 2. the body as plain text, when it is not JSON and is non-blank UTF-8
//!    (JSON of any other shape skips straight to 3)
//! 3. the status description (`Bad Request`), or the bare code if the
//!    status has no canonical reason
//!
//! ## Success replies (2xx)
//!
//! The body is the artifact. Its save name comes from the
//! `Content-Disposition` header, falling back to [`DEFAULT_FILENAME`].

use bytes::Bytes;
use log::debug;
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

use crate::common::error::TransportError;
use crate::common::messages::TransformOutcome;

/// Save name used when the service does not suggest one.
pub const DEFAULT_FILENAME: &str = "output";

fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"filename=\s*"?([^";]+)"?"#).expect("static pattern"))
}

/// Pull the filename token out of a `Content-Disposition` value.
///
/// Accepts both `filename="secret.bin"` and `filename=report.enc`.
pub fn extract_filename(content_disposition: Option<&str>) -> String {
    content_disposition
        .and_then(|value| filename_pattern().captures(value))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

/// Human-readable form of a status, used when the body says nothing useful.
pub fn status_description(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| status.as_u16().to_string())
}

/// Pick the message to show for a failure reply.
///
/// Any JSON body is only consulted for its `detail` member. Text is used
/// verbatim only when the body is not JSON at all.
pub fn failure_message(status: StatusCode, body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => match value.get("detail") {
            Some(Value::String(detail)) if !detail.is_empty() => detail.clone(),
            None | Some(Value::Null) | Some(Value::String(_)) => status_description(status),
            // Structured details (e.g. validation error lists) are shown as JSON.
            Some(other) => other.to_string(),
        },
        Err(_) => match std::str::from_utf8(body) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => status_description(status),
        },
    }
}

/// Classify a complete reply.
pub fn interpret(status: StatusCode, content_disposition: Option<&str>, body: Bytes) -> TransformOutcome {
    if !status.is_success() {
        return TransformOutcome::Failure {
            message: failure_message(status, &body),
        };
    }

    TransformOutcome::Success {
        suggested_filename: extract_filename(content_disposition),
        artifact_bytes: body,
    }
}

/// Read the whole body of `response` and classify it.
pub async fn read_outcome(response: Response) -> Result<TransformOutcome, TransportError> {
    let status = response.status();
    let disposition = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response.bytes().await?;
    debug!("Reply {} with {} body bytes", status, body.len());

    Ok(interpret(status, disposition.as_deref(), body))
}

#[derive(Debug, Deserialize)]
struct RoundtripReply {
    ok: bool,
}

/// What the service said about a roundtrip self-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundtripReport {
    /// Content survived a forward and reverse transform unchanged.
    Verified,
    /// The service answered `{"ok": false}`.
    Mismatch,
    /// The service refused the check; carries the extracted message.
    Rejected { message: String },
}

/// Classify a roundtrip self-check reply.
pub fn interpret_roundtrip(status: StatusCode, body: &[u8]) -> Result<RoundtripReport, TransportError> {
    if !status.is_success() {
        return Ok(RoundtripReport::Rejected {
            message: failure_message(status, body),
        });
    }

    let reply: RoundtripReply = serde_json::from_slice(body)
        .map_err(|e| TransportError::MalformedResponse(e.to_string()))?;

    Ok(if reply.ok {
        RoundtripReport::Verified
    } else {
        RoundtripReport::Mismatch
    })
}
