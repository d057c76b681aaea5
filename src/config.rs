//! Configuration for the media inventory

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, ScanError};

/// Default extension marking files already superseded by a re-encode
pub const DEFAULT_BACKUP_EXTENSION: &str = "old";

/// Default name prefix of in-progress encoder output
pub const DEFAULT_TEMP_PREFIX: &str = ".temp.";

/// Default probe executable
pub const DEFAULT_PROBE_PROGRAM: &str = "ffprobe";

/// Directory under the home directory holding the default store
pub const DEFAULT_STORE_DIR: &str = ".media_inventory";

/// File name of the default store
pub const DEFAULT_STORE_FILE: &str = "inventory.json";

/// Configuration for scanning and the record store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Persisted store location
    /// If unset, `$HOME/.media_inventory/inventory.json` is used
    pub store_path: Option<PathBuf>,

    /// Number of worker threads
    /// 0 means available hardware parallelism
    pub num_threads: usize,

    /// Files whose name ends in `.<backup_extension>` are counted as skipped
    pub backup_extension: String,

    /// Files whose name starts with this prefix are ignored entirely
    pub temp_prefix: String,

    /// Probe executable
    pub probe_program: String,

    /// Arguments passed before the file path
    pub probe_args: Vec<String>,

    /// Persist the store after every mutation
    pub auto_persist: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            num_threads: 0,
            backup_extension: DEFAULT_BACKUP_EXTENSION.to_string(),
            temp_prefix: DEFAULT_TEMP_PREFIX.to_string(),
            probe_program: DEFAULT_PROBE_PROGRAM.to_string(),
            probe_args: Self::default_probe_args(),
            auto_persist: true,
        }
    }
}

impl ScanConfig {
    /// Create a config builder
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::new()
    }

    /// Read a JSON config file; absent fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| ScanError::malformed(path, e.to_string()))
    }

    pub fn default_probe_args() -> Vec<String> {
        vec!["-hide_banner".to_string(), "-i".to_string()]
    }

    /// Default store location under the user's home directory
    pub fn default_store_path() -> PathBuf {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(DEFAULT_STORE_DIR).join(DEFAULT_STORE_FILE)
    }

    /// Configured store path, or the default one
    pub fn effective_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(Self::default_store_path)
    }

    /// Check if a file name marks a stale backup
    pub fn is_backup(&self, name: &str) -> bool {
        !self.backup_extension.is_empty() && name.ends_with(&format!(".{}", self.backup_extension))
    }

    /// Check if a file name marks in-progress encoder output
    pub fn is_in_progress(&self, name: &str) -> bool {
        !self.temp_prefix.is_empty() && name.starts_with(&self.temp_prefix)
    }

    /// Get the effective number of threads
    pub fn effective_threads(&self) -> usize {
        if self.num_threads == 0 {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        } else {
            self.num_threads
        }
    }
}

/// Builder for ScanConfig
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the store path
    pub fn store_path(mut self, path: PathBuf) -> Self {
        self.config.store_path = Some(path);
        self
    }

    /// Set the number of threads
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.num_threads = threads;
        self
    }

    /// Set the backup extension (without dot)
    pub fn backup_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.backup_extension = ext.into();
        self
    }

    /// Set the in-progress prefix
    pub fn temp_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.temp_prefix = prefix.into();
        self
    }

    /// Set the probe program and its leading arguments
    pub fn probe(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.config.probe_program = program.into();
        self.config.probe_args = args;
        self
    }

    /// Enable or disable auto-persist
    pub fn auto_persist(mut self, enabled: bool) -> Self {
        self.config.auto_persist = enabled;
        self
    }

    /// Build the config
    pub fn build(self) -> ScanConfig {
        self.config
    }
}
