//! Ledger persistence.
//!
//! The ledger is read once at startup and written back after every
//! mutation. The store is injected so the state machine stays testable
//! without a real backend.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use directories::ProjectDirs;
use tempfile::NamedTempFile;

use super::LedgerState;

/// Errors that can occur when loading or saving the ledger record.
#[derive(Debug)]
pub enum StoreError {
    /// Failed to read the ledger file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the ledger file as valid TOML.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Failed to write the ledger file back to disk.
    Write {
        path: PathBuf,
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Read { path, source } => {
                write!(f, "Failed to read ledger at {}: {}", path.display(), source)
            }
            StoreError::Parse { path, source } => {
                write!(f, "Failed to parse ledger at {}: {}", path.display(), source)
            }
            StoreError::Write { path, source } => {
                write!(f, "Failed to write ledger at {}: {}", path.display(), source)
            }
        }
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StoreError::Read { source, .. } => Some(source),
            StoreError::Parse { source, .. } => Some(source),
            StoreError::Write { source, .. } => Some(source.as_ref()),
        }
    }
}

/// Boundary between the ledger state machine and whatever holds its bytes.
pub trait LedgerStore {
    fn load(&self) -> Result<LedgerState, StoreError>;
    fn save(&self, state: &LedgerState) -> Result<(), StoreError>;
}

impl<S: LedgerStore + ?Sized> LedgerStore for std::sync::Arc<S> {
    fn load(&self) -> Result<LedgerState, StoreError> {
        (**self).load()
    }

    fn save(&self, state: &LedgerState) -> Result<(), StoreError> {
        (**self).save(state)
    }
}

/// TOML file in the platform config directory, replaced atomically on save.
pub struct TomlLedgerStore {
    path: PathBuf,
}

impl TomlLedgerStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn at_default_path() -> Self {
        Self::new(Self::default_path())
    }

    fn default_path() -> PathBuf {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "palaver")
            .expect("Failed to determine config directory");
        proj_dirs.config_dir().join("ledger.toml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerStore for TomlLedgerStore {
    fn load(&self) -> Result<LedgerState, StoreError> {
        if !self.path.exists() {
            return Ok(LedgerState::default());
        }
        let contents = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        // Unknown fields are dropped and missing ones take defaults; that is
        // the whole migration story.
        toml::from_str(&contents).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, state: &LedgerState) -> Result<(), StoreError> {
        let write_err = |source: Box<dyn StdError + Send + Sync>| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        let parent = self.path.parent().filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(|e| write_err(Box::new(e)))?;
        }

        let contents = toml::to_string_pretty(state).map_err(|e| write_err(Box::new(e)))?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(|e| write_err(Box::new(e)))?;

        temp_file
            .write_all(contents.as_bytes())
            .map_err(|e| write_err(Box::new(e)))?;
        temp_file
            .as_file_mut()
            .sync_all()
            .map_err(|e| write_err(Box::new(e)))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| write_err(Box::new(e)))?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl MemoryLedgerStore {
    pub fn new(state: LedgerState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> LedgerState {
        self.state.lock().expect("ledger store poisoned").clone()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<LedgerState, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, state: &LedgerState) -> Result<(), StoreError> {
        *self.state.lock().expect("ledger store poisoned") = state.clone();
        Ok(())
    }
}
