//! # Artifact Delivery
//!
//! Hands a successful artifact to the user's environment.
//!
//! ## Flow
//!
//! 1. The bytes are registered in a [`HandleRegistry`] and addressed by a
//!    [`TransientHandle`] for the duration of the save
//! 2. The save trigger ([`ArtifactSink::save`]) is invoked exactly once with
//!    the handle's bytes and the suggested filename
//! 3. Release of the handle is scheduled as soon as it exists, whatever the
//!    save does (succeeds, fails, or is cancelled)
//!
//! ## Release policies
//!
//! - [`ReleasePolicy::OnCompletion`]: released when the save returns. The
//!   directory sink writes synchronously, so this is exact.
//! - [`ReleasePolicy::AfterDelay`]: released after a fixed delay. This is an
//!   approximation for sinks that only start consuming the handle, not a
//!   guarantee that they are done with it.

use bytes::Bytes;
use log::{debug, info};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::common::config::{DeliveryConfig, ReleaseMode};
use crate::common::error::DeliveryError;
use crate::client::response::DEFAULT_FILENAME;

/// Upper bound on ` (n)` suffixes tried before giving up on a free name.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

// ============================================================================
// TRANSIENT HANDLES
// ============================================================================

/// Address of an artifact held in a [`HandleRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransientHandle(Uuid);

impl TransientHandle {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

/// In-memory table of artifacts that are currently being saved.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    handles: Mutex<HashMap<Uuid, Bytes>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, bytes: Bytes) -> TransientHandle {
        let id = Uuid::new_v4();
        debug!("Registered handle {} ({} bytes)", id, bytes.len());
        self.lock().insert(id, bytes);
        TransientHandle(id)
    }

    pub fn resolve(&self, handle: TransientHandle) -> Option<Bytes> {
        self.lock().get(&handle.0).cloned()
    }

    /// Drop the bytes behind `handle`. Returns `false` if it was already gone.
    pub fn release(&self, handle: TransientHandle) -> bool {
        let released = self.lock().remove(&handle.0).is_some();
        if released {
            debug!("Released handle {}", handle.0);
        }
        released
    }

    /// Number of handles not yet released.
    pub fn live(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Bytes>> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// When a handle is released after its save was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePolicy {
    OnCompletion,
    AfterDelay(Duration),
}

impl From<&DeliveryConfig> for ReleasePolicy {
    fn from(config: &DeliveryConfig) -> Self {
        match config.release {
            ReleaseMode::OnCompletion => ReleasePolicy::OnCompletion,
            ReleaseMode::AfterDelay => {
                ReleasePolicy::AfterDelay(Duration::from_millis(config.release_delay_ms))
            }
        }
    }
}

/// Schedules the release of one handle when dropped.
struct ScheduledRelease {
    registry: Arc<HandleRegistry>,
    handle: TransientHandle,
    policy: ReleasePolicy,
}

impl Drop for ScheduledRelease {
    fn drop(&mut self) {
        let registry = Arc::clone(&self.registry);
        let handle = self.handle;

        match (self.policy, tokio::runtime::Handle::try_current()) {
            (ReleasePolicy::AfterDelay(delay), Ok(runtime)) => {
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    registry.release(handle);
                });
            }
            // Without a runtime a delayed release could never fire.
            _ => {
                registry.release(handle);
            }
        }
    }
}

// ============================================================================
// SAVE TARGETS
// ============================================================================

/// Something that can persist an artifact for the user.
pub trait ArtifactSink: Send + Sync {
    /// Save `artifact` under a name derived from `filename` and return the
    /// final location. Called once per successful submission, off the async
    /// executor.
    fn save(&self, artifact: &[u8], filename: &str) -> Result<PathBuf, DeliveryError>;
}

/// Saves artifacts into a directory without ever overwriting existing files.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for DirectorySink {
    fn save(&self, artifact: &[u8], filename: &str) -> Result<PathBuf, DeliveryError> {
        std::fs::create_dir_all(&self.dir)?;

        // Stage in the target directory so the final step is a rename.
        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(artifact)?;
        staged.as_file().sync_all()?;

        let name = safe_filename(filename);
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = self.dir.join(numbered(&name, attempt));
            match staged.persist_noclobber(&candidate) {
                Ok(_) => return Ok(candidate),
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => staged = e.file,
                Err(e) => return Err(e.error.into()),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free name for {} in {}", name, self.dir.display()),
        )
        .into())
    }
}

/// Reduce a suggested name to a single path component.
pub fn safe_filename(suggested: &str) -> String {
    let last = suggested
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .replace('\0', "");
    let last = last.trim();

    if last.is_empty() || last == "." || last == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        last.to_string()
    }
}

/// `photo.jpg.enc` → `photo.jpg (2).enc` for `n = 2`; `n = 0` is unchanged.
fn numbered(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }

    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({}){}", &name[..dot], n, &name[dot..]),
        _ => format!("{} ({})", name, n),
    }
}

// ============================================================================
// DELIVERY STEP
// ============================================================================

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub path: PathBuf,
    pub bytes: usize,
}

/// Registers, saves and releases artifacts.
#[derive(Clone)]
pub struct Deliverer {
    registry: Arc<HandleRegistry>,
    sink: Arc<dyn ArtifactSink>,
    policy: ReleasePolicy,
}

impl Deliverer {
    pub fn new(sink: Arc<dyn ArtifactSink>, policy: ReleasePolicy) -> Self {
        Self {
            registry: Arc::new(HandleRegistry::new()),
            sink,
            policy,
        }
    }

    /// Build the deliverer described by the `[delivery]` config section.
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self::new(
            Arc::new(DirectorySink::new(config.output_dir.clone())),
            ReleasePolicy::from(config),
        )
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// Save `artifact` once under `filename`.
    pub async fn deliver(&self, artifact: Bytes, filename: &str) -> Result<Delivered, DeliveryError> {
        let handle = self.registry.register(artifact);
        let _release = ScheduledRelease {
            registry: Arc::clone(&self.registry),
            handle,
            policy: self.policy,
        };

        let bytes = self
            .registry
            .resolve(handle)
            .ok_or(DeliveryError::HandleReleased(handle.id()))?;
        let size = bytes.len();

        let sink = Arc::clone(&self.sink);
        let filename = filename.to_string();
        let path = tokio::task::spawn_blocking(move || sink.save(&bytes, &filename))
            .await
            .map_err(|e| DeliveryError::Io(io::Error::new(io::ErrorKind::Other, e)))??;

        info!("💾 Saved {} bytes to {}", size, path.display());
        Ok(Delivered { path, bytes: size })
    }
}
