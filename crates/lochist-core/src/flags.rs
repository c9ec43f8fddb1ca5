//! Persisted boolean flags.
//!
//! The subscription intent must survive process restarts, so it lives in a
//! [`FlagStore`] rather than in memory. [`FileFlagStore`] keeps a small TOML
//! table of booleans on disk; [`MemoryFlagStore`] is for tests.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// Errors from a flag store.
#[derive(Debug, thiserror::Error)]
pub enum FlagStoreError {
    /// Reading or writing the flag file failed.
    #[error("Flag file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    /// The flag file exists but is not a TOML table of booleans.
    #[error("Flag file {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// The flags could not be serialized.
    #[error("Failed to serialize flags: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Key/value storage for booleans that outlive the process.
pub trait FlagStore: Send + Sync {
    /// Read `key`, or `default` if it was never written.
    fn get_bool(&self, key: &str, default: bool) -> Result<bool, FlagStoreError>;

    /// Write `key` durably.
    fn set_bool(&self, key: &str, value: bool) -> Result<(), FlagStoreError>;
}

/// In-memory flags; lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    flags: Mutex<BTreeMap<String, bool>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagStore for MemoryFlagStore {
    fn get_bool(&self, key: &str, default: bool) -> Result<bool, FlagStoreError> {
        let flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(flags.get(key).copied().unwrap_or(default))
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), FlagStoreError> {
        self.flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// Flags stored as a TOML table in a single file.
///
/// Every write replaces the file through a temporary sibling and a rename,
/// so a crash mid-write leaves the previous contents in place.
#[derive(Debug)]
pub struct FileFlagStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileFlagStore {
    /// Use the file at `path`; it is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Default flag file location.
    ///
    /// - Linux: `~/.local/share/lochist/flags.toml`
    /// - macOS: `~/Library/Application Support/lochist/flags.toml`
    /// - Windows: `C:\Users\<user>\AppData\Local\lochist\flags.toml`
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lochist")
            .join("flags.toml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> FlagStoreError {
        FlagStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn load(&self) -> Result<BTreeMap<String, bool>, FlagStoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        toml::from_str(&content).map_err(|source| FlagStoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, flags: &BTreeMap<String, bool>) -> Result<(), FlagStoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let content = toml::to_string(flags)?;
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

impl FlagStore for FileFlagStore {
    fn get_bool(&self, key: &str, default: bool) -> Result<bool, FlagStoreError> {
        Ok(self.load()?.get(key).copied().unwrap_or(default))
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), FlagStoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut flags = self.load()?;
        flags.insert(key.to_string(), value);
        self.save(&flags)?;
        debug!("Persisted flag {} = {} to {}", key, value, self.path.display());
        Ok(())
    }
}
