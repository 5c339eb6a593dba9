//! Feature flag stores.
//!
//! `StaticFlags` holds flags in memory and can be changed at runtime.
//! `FileFlags` keeps a `StaticFlags` in sync with a TOML file of booleans:
//!
//! ```toml
//! "post-process-forwarder:kafka-headers" = true
//! ```

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use forwarder_types::FeatureFlags;

/// In-memory flag store.
#[derive(Debug, Default)]
pub struct StaticFlags {
    values: RwLock<HashMap<String, bool>>,
}

impl StaticFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: impl Into<String>, value: bool) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: impl Into<String>, value: bool) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.into(), value);
    }

    /// Replace all flags at once.
    pub fn replace(&self, flags: HashMap<String, bool>) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        *values = flags;
    }
}

impl FeatureFlags for StaticFlags {
    fn get_bool(&self, key: &str) -> bool {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key).copied().unwrap_or(false)
    }
}

/// Flag store backed by a TOML file, reloaded periodically.
#[derive(Debug)]
pub struct FileFlags {
    path: PathBuf,
    flags: StaticFlags,
}

impl FileFlags {
    /// Load the file once. Fails if it cannot be read or parsed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let flags = StaticFlags::new();
        flags.replace(read_flags_file(&path)?);
        Ok(Self { path, flags })
    }

    /// Re-read the file. On failure the previous flags stay in effect.
    pub fn reload(&self) -> Result<()> {
        let values = read_flags_file(&self.path)?;
        debug!(path = %self.path.display(), count = values.len(), "Reloaded feature flags");
        self.flags.replace(values);
        Ok(())
    }

    /// Spawn a task that reloads the file every `interval`.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = this.reload() {
                    warn!(path = %this.path.display(), "Failed to reload feature flags: {e:#}");
                }
            }
        })
    }
}

impl FeatureFlags for FileFlags {
    fn get_bool(&self, key: &str) -> bool {
        self.flags.get_bool(key)
    }
}

fn read_flags_file(path: &Path) -> Result<HashMap<String, bool>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read flags file {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid flags file {}", path.display()))
}
