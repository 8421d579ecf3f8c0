//! # Client Components
//!
//! The client is split by responsibility:
//!
//! ## Core Client ([`client`])
//! Runs a submission end to end and reports the result through the session.
//!
//! ## Session ([`session`])
//! Phase enum, pure transition function and the single-flight busy guard.
//!
//! ## Request and Response ([`request`], [`response`])
//! Input validation, multipart encoding, reply classification and filename
//! extraction.
//!
//! ## Delivery ([`delivery`])
//! Transient handles and the save target for artifacts.
//!
//! ## Metrics ([`metrics`])
//! Optional per-submission recording with JSON export.

pub mod client;
pub mod delivery;
pub mod metrics;
pub mod request;
pub mod response;
pub mod session;

// Re-export for convenience
pub use client::{LogNotifier, Notifier, SubmitOutcome, TransformClient};
pub use delivery::{ArtifactSink, Deliverer, Delivered, DirectorySink, ReleasePolicy};
pub use metrics::ClientMetrics;
pub use session::{Phase, Session, SessionState};
