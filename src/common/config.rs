//! # Configuration Utilities
//!
//! Client configuration structures and the TOML loader used by the binary.
//!
//! # Example TOML
//!
//! ```toml
//! [service]
//! base_url = "http://127.0.0.1:8000"
//! forward_path = "/encrypt"
//! reverse_path = "/decrypt"
//! roundtrip_path = "/roundtrip"
//! request_timeout_secs = 120
//!
//! [delivery]
//! output_dir = "."
//! release = "on-completion"
//! release_delay_ms = 1500
//! ```
//!
//! Every field is optional; missing ones take the values shown above.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use super::messages::Operation;

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Arguments
/// - `path`: Path to the TOML configuration file
///
/// # Returns
/// - `Ok(T)`: Successfully loaded and parsed configuration
/// - `Err`: File I/O or parsing error
///
/// # Example
/// ```ignore
/// let config: ClientConfig = load_config("config/client.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read config {}", path))?;
    let config: T =
        toml::from_str(&content).with_context(|| format!("failed to parse config {}", path))?;
    Ok(config)
}

/// Complete client configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where the remote transform service lives and how long to wait for it
    pub service: ServiceConfig,
    /// Where artifacts are saved and when their transient handles are released
    pub delivery: DeliveryConfig,
}

/// Remote transform service endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Scheme, host and port of the service (e.g., "http://127.0.0.1:8000")
    pub base_url: String,
    /// Path receiving forward (encrypt) requests
    pub forward_path: String,
    /// Path receiving reverse (decrypt) requests
    pub reverse_path: String,
    /// Path of the service's in-memory roundtrip self-check
    pub roundtrip_path: String,
    /// Deadline for one complete request/response exchange (seconds)
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            forward_path: "/encrypt".to_string(),
            reverse_path: "/decrypt".to_string(),
            roundtrip_path: "/roundtrip".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl ServiceConfig {
    /// Full URL of the endpoint handling `operation`.
    pub fn endpoint(&self, operation: Operation) -> String {
        let path = match operation {
            Operation::Forward => &self.forward_path,
            Operation::Reverse => &self.reverse_path,
        };
        join_url(&self.base_url, path)
    }

    pub fn roundtrip_endpoint(&self) -> String {
        join_url(&self.base_url, &self.roundtrip_path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// When the transient handle holding an artifact is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseMode {
    /// As soon as the save target reports it has finished reading.
    OnCompletion,
    /// After a fixed delay, regardless of the save target.
    AfterDelay,
}

/// Local artifact delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Directory receiving saved artifacts
    pub output_dir: PathBuf,
    /// Handle release strategy
    pub release: ReleaseMode,
    /// Delay used by [`ReleaseMode::AfterDelay`] (milliseconds)
    pub release_delay_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            release: ReleaseMode::OnCompletion,
            release_delay_ms: 1500,
        }
    }
}
