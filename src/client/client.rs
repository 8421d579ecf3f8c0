//! # Transform Client Core
//!
//! Owns the lifecycle of one transform submission:
//! 1. Reject the call if a submission is already in flight
//! 2. Validate the inputs (no network activity on failure)
//! 3. Take the busy guard and move the session to `Uploading`
//! 4. POST the multipart request under the configured deadline
//! 5. Interpret the reply
//! 6. Save the artifact, or surface the error
//! 7. Release the busy guard (always, via [`BusyGuard`](super::session::BusyGuard))
//!
//! Every error is both raised through the [`Notifier`] and written to the
//! session's status text, so it stays visible after the alert is dismissed.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let client = TransformClient::from_config(&config, Arc::new(LogNotifier))?;
//! let session = Session::new();
//!
//! let file = SelectedFile::from_path("photo.jpg").await?;
//! let input = SubmitInput::new(Some(file), "correct-horse", Operation::Forward);
//!
//! match client.submit(&session, input).await {
//!     SubmitOutcome::Done(delivered) => println!("saved {}", delivered.path.display()),
//!     other => println!("{}", session.status_text()),
//! }
//! ```

use log::{error, info, warn};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::client::delivery::{Deliverer, Delivered};
use crate::client::metrics::ClientMetrics;
use crate::client::request::{build_form, build_roundtrip_form, validate};
use crate::client::response::{interpret_roundtrip, read_outcome, RoundtripReport};
use crate::client::session::{failure_text, Phase, Session, SessionEvent};
use crate::common::config::{ClientConfig, ServiceConfig};
use crate::common::error::{TransportError, ValidationError};
use crate::common::messages::{Operation, SubmitInput, TransformOutcome, TransformRequest};

/// Interruptive user notification (the "alert").
pub trait Notifier: Send + Sync {
    fn alert(&self, message: &str);
}

/// Notifier that only writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, message: &str) {
        warn!("🔔 {}", message);
    }
}

/// How a call to [`TransformClient::submit`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Another submission was in flight; nothing was done.
    Busy,
    /// Inputs were rejected locally; nothing was sent.
    Invalid(ValidationError),
    /// The artifact was saved.
    Done(Delivered),
    /// The service rejected the request.
    Rejected { message: String },
    /// Transport or local save failure.
    Failed { reason: String },
}

impl SubmitOutcome {
    /// Phase the session ended in, if the submission started at all.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            SubmitOutcome::Busy | SubmitOutcome::Invalid(_) => None,
            SubmitOutcome::Done(_) => Some(Phase::Done),
            SubmitOutcome::Rejected { .. } => Some(Phase::Error),
            SubmitOutcome::Failed { .. } => Some(Phase::Failed),
        }
    }
}

/// Client for the remote transform service.
pub struct TransformClient {
    http: reqwest::Client,
    service: ServiceConfig,
    deliverer: Deliverer,
    notifier: Arc<dyn Notifier>,
    metrics: Option<Arc<Mutex<ClientMetrics>>>,
}

impl TransformClient {
    pub fn new(
        service: ServiceConfig,
        deliverer: Deliverer,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("transform-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            service,
            deliverer,
            notifier,
            metrics: None,
        })
    }

    /// Build a client saving into the configured directory.
    pub fn from_config(config: &ClientConfig, notifier: Arc<dyn Notifier>) -> Result<Self, TransportError> {
        Self::new(
            config.service.clone(),
            Deliverer::from_config(&config.delivery),
            notifier,
        )
    }

    /// Record every finished submission into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Mutex<ClientMetrics>>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    pub fn deliverer(&self) -> &Deliverer {
        &self.deliverer
    }

    /// Run one submission against `session`.
    ///
    /// Returns [`SubmitOutcome::Busy`] immediately, without touching the
    /// session, if another submission on the same session is in flight.
    pub async fn submit(&self, session: &Session, input: SubmitInput) -> SubmitOutcome {
        if session.is_busy() {
            warn!("Submission ignored: another one is in flight");
            return SubmitOutcome::Busy;
        }

        let request = match validate(input) {
            Ok(request) => request,
            Err(e) => {
                self.notifier.alert(&e.to_string());
                session.apply(SessionEvent::Invalid(e));
                return SubmitOutcome::Invalid(e);
            }
        };

        let Some(_guard) = session.try_begin() else {
            warn!("Submission ignored: another one is in flight");
            return SubmitOutcome::Busy;
        };

        let operation = request.operation();
        let bytes_sent = request.file().len();
        let started = Instant::now();

        info!(
            "📤 Sending {} ({} bytes) for {} transform",
            request.file().name,
            bytes_sent,
            operation
        );

        let (outcome, bytes_received) = match self.exchange(&request).await {
            Ok(TransformOutcome::Success {
                artifact_bytes,
                suggested_filename,
            }) => {
                let received = artifact_bytes.len();
                let outcome = match self.deliverer.deliver(artifact_bytes, &suggested_filename).await {
                    Ok(delivered) => {
                        session.apply(SessionEvent::Delivered);
                        info!("✅ {} transform delivered to {}", operation, delivered.path.display());
                        SubmitOutcome::Done(delivered)
                    }
                    Err(e) => self.fail(session, TransportError::from(e)),
                };
                (outcome, received)
            }
            Ok(TransformOutcome::Failure { message }) => {
                warn!("⚠️  Service rejected {} transform: {}", operation, message);
                self.notifier.alert(&format!("Error: {}", message));
                session.apply(SessionEvent::Rejected {
                    message: message.clone(),
                });
                (SubmitOutcome::Rejected { message }, 0)
            }
            Err(e) => (self.fail(session, e), 0),
        };

        self.record(operation, started.elapsed(), &outcome, bytes_sent, bytes_received);
        outcome
    }

    /// Ask the service to encrypt and decrypt the request's file in memory
    /// and report whether the content survived. The session is not involved.
    pub async fn check_roundtrip(&self, request: &TransformRequest) -> Result<RoundtripReport, TransportError> {
        let url = self.service.roundtrip_endpoint();
        let form = build_roundtrip_form(request.file().bytes.clone(), request.password())?;

        let deadline = self.service.request_timeout();
        let exchange = async {
            let response = self.http.post(&url).multipart(form).send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            interpret_roundtrip(status, &body)
        };

        tokio::time::timeout(deadline, exchange)
            .await
            .unwrap_or(Err(TransportError::Timeout(deadline)))
    }

    /// Send the request and read the complete reply within the deadline.
    async fn exchange(&self, request: &TransformRequest) -> Result<TransformOutcome, TransportError> {
        let url = self.service.endpoint(request.operation());
        let form = build_form(request)?;

        let deadline = self.service.request_timeout();
        let exchange = async {
            let response = self.http.post(&url).multipart(form).send().await?;
            read_outcome(response).await
        };

        tokio::time::timeout(deadline, exchange)
            .await
            .unwrap_or(Err(TransportError::Timeout(deadline)))
    }

    fn fail(&self, session: &Session, err: TransportError) -> SubmitOutcome {
        let reason = err.to_string();
        error!("❌ {}", failure_text(&reason));
        self.notifier.alert(&failure_text(&reason));
        session.apply(SessionEvent::TransportFailed {
            reason: reason.clone(),
        });
        SubmitOutcome::Failed { reason }
    }

    fn record(
        &self,
        operation: Operation,
        latency: Duration,
        outcome: &SubmitOutcome,
        bytes_sent: usize,
        bytes_received: usize,
    ) {
        let (Some(metrics), Some(phase)) = (&self.metrics, outcome.phase()) else {
            return;
        };

        let failure_reason = match outcome {
            SubmitOutcome::Rejected { message } => Some(message.clone()),
            SubmitOutcome::Failed { reason } => Some(reason.clone()),
            _ => None,
        };

        let mut metrics = metrics.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        metrics.record_submission(operation, latency, phase, bytes_sent, bytes_received, failure_reason);
    }
}
