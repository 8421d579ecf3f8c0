//! # Transform Client Binary Entry Point
//!
//! Command-line front end for the remote transform service.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin transform-client -- --mode encrypt --file photo.jpg --password correct-horse
//! ```
//!
//! With a configuration file and metrics:
//! ```bash
//! TRANSFORM_PASSWORD=correct-horse cargo run --bin transform-client -- \
//!   --config config/client.toml --mode decrypt --file photo.jpg.enc \
//!   --output-dir ./downloads --metrics-output ./metrics/client.json
//! ```
//!
//! The client will:
//! 1. Load configuration from the TOML file (or use defaults)
//! 2. Read the selected file
//! 3. Submit it once and save the returned artifact
//! 4. Print the final status text and exit non-zero unless it is `Done`

use anyhow::Context;
use clap::{Parser, ValueEnum};
use env_logger::Builder;
use log::{info, LevelFilter};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use transform_client::client::request::validate;
use transform_client::client::response::RoundtripReport;
use transform_client::client::session::selected_caption;
use transform_client::client::{ClientMetrics, Notifier, Session, SubmitOutcome, TransformClient};
use transform_client::common::config::{load_config, ClientConfig};
use transform_client::common::messages::{Operation, SelectedFile, SubmitInput};

/// Command-line arguments for the client binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the client configuration file (TOML format)
    ///
    /// Example: config/client.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Base URL of the transform service (overrides the config file)
    #[arg(long)]
    server: Option<String>,

    /// Transform to apply
    #[arg(short, long, value_enum, default_value_t = Mode::Encrypt)]
    mode: Mode,

    /// File to submit
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Password handed to the service
    #[arg(short, long, env = "TRANSFORM_PASSWORD", default_value = "", hide_env_values = true, hide_default_value = true)]
    password: String,

    /// Directory receiving the artifact (overrides the config file)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Path to write metrics JSON output (optional)
    #[arg(long)]
    metrics_output: Option<String>,

    /// Ask the service to verify an in-memory roundtrip instead of transforming
    #[arg(long)]
    check_roundtrip: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Mode {
    Encrypt,
    Decrypt,
}

impl From<Mode> for Operation {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Encrypt => Operation::Forward,
            Mode::Decrypt => Operation::Reverse,
        }
    }
}

/// Alerts go straight to stderr so they are seen even with logging filtered.
struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn alert(&self, message: &str) {
        eprintln!("{}", message);
    }
}

/// Initialize the logging system with timestamp, level, and message formatting.
///
/// Format: `[HH:MM:SS] [LEVEL] message`
fn init_logger(verbose: bool) {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(if verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_logger(args.verbose);

    let mut config: ClientConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };

    if let Some(server) = args.server {
        config.service.base_url = server;
    }
    if let Some(dir) = args.output_dir {
        config.delivery.output_dir = dir;
    }

    let mut client = TransformClient::from_config(&config, Arc::new(StderrNotifier))
        .context("failed to create HTTP client")?;

    // Initialize metrics if output path is specified
    let metrics = args
        .metrics_output
        .as_ref()
        .map(|_| Arc::new(Mutex::new(ClientMetrics::new("transform-client".to_string()))));
    if let Some(m) = &metrics {
        client = client.with_metrics(Arc::clone(m));
    }

    let file = match &args.file {
        Some(path) => Some(
            SelectedFile::from_path(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => None,
    };
    if let Some(caption) = selected_caption(file.as_ref()) {
        info!("{}", caption);
    }

    let operation = Operation::from(args.mode);
    let input = SubmitInput::new(file, args.password, operation);

    if args.check_roundtrip {
        let request = match validate(input) {
            Ok(request) => request,
            Err(e) => {
                eprintln!("{}", e);
                return Ok(ExitCode::FAILURE);
            }
        };

        return match client.check_roundtrip(&request).await {
            Ok(RoundtripReport::Verified) => {
                println!("Roundtrip OK");
                Ok(ExitCode::SUCCESS)
            }
            Ok(RoundtripReport::Mismatch) => {
                println!("Roundtrip mismatch");
                Ok(ExitCode::FAILURE)
            }
            Ok(RoundtripReport::Rejected { message }) => {
                println!("Error: {}", message);
                Ok(ExitCode::FAILURE)
            }
            Err(e) => {
                println!("Roundtrip check failed: {}", e);
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let session = Session::new();
    info!("{}", session.action_label(operation));
    let outcome = client.submit(&session, input).await;

    println!("{}", session.status_text());
    if let SubmitOutcome::Done(delivered) = &outcome {
        println!("Saved {}", delivered.path.display());
    }

    // Export metrics if enabled
    if let (Some(metrics), Some(output_path)) = (metrics, args.metrics_output) {
        let metrics = metrics.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        metrics.export_to_json(&output_path)?;
        info!("Metrics exported to: {}", output_path);
    }

    Ok(match outcome {
        SubmitOutcome::Done(_) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}
