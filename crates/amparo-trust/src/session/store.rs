//! Persisted session record.
//!
//! The record is a small key-value map written as one JSON object, so every
//! update replaces the whole session at once:
//!
//! ```text
//! {
//!   "isAuthenticated": "true",
//!   "currentUser": "{\"id\":\"7\",\"displayName\":\"...\",\"role\":{\"name\":\"Administrador\"},\"orgUnitId\":14}",
//!   "authToken": "eyJhbGciOi..."
//! }
//! ```
//!
//! File writes go to a uniquely named temp file and are renamed into place, so
//! a concurrent reader sees either the previous record or the new one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::fs;

use crate::error::{TrustError, TrustResult};

/// Entry holding the literal `"true"` while authenticated.
pub const IS_AUTHENTICATED_KEY: &str = "isAuthenticated";

/// Entry holding the JSON-serialized principal.
pub const CURRENT_USER_KEY: &str = "currentUser";

/// Entry holding the opaque bearer token.
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// Raw persisted entries.
pub type SessionEntries = BTreeMap<String, String>;

/// Storage for the single persisted session record.
#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Read the record. `Ok(None)` when nothing is stored.
    ///
    /// Returns `CorruptSessionState` when the record exists but cannot be
    /// parsed, and `Storage` when it cannot be read at all.
    async fn load(&self) -> TrustResult<Option<SessionEntries>>;

    /// Atomically replace the whole record.
    async fn replace(&self, entries: &SessionEntries) -> TrustResult<()>;

    /// Remove the record. Removing a missing record is not an error.
    async fn clear(&self) -> TrustResult<()>;
}

/// JSON file store.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> TrustResult<Option<SessionEntries>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TrustError::storage(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| TrustError::CorruptSessionState {
                message: format!("failed to parse {}: {}", self.path.display(), e),
            })
    }

    async fn replace(&self, entries: &SessionEntries) -> TrustResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    TrustError::storage(format!("failed to create session directory: {}", e))
                })?;
            }
        }

        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| TrustError::storage(format!("failed to serialize session: {}", e)))?;

        write_atomic(&self.path, &content).await
    }

    async fn clear(&self) -> TrustResult<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TrustError::storage(format!(
                "failed to remove session file: {}",
                e
            ))),
        }
    }
}

async fn write_atomic(path: &Path, content: &str) -> TrustResult<()> {
    // Unique per write so overlapping writers never share a temp file.
    let temp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));

    fs::write(&temp_path, content)
        .await
        .map_err(|e| TrustError::storage(format!("failed to write temp file: {}", e)))?;

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(TrustError::storage(format!(
            "failed to rename temp file: {}",
            e
        )));
    }

    Ok(())
}

/// In-memory store. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<Mutex<Option<SessionEntries>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with raw entries (e.g. a record written by another process).
    pub fn with_entries(entries: SessionEntries) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Some(entries))),
        }
    }

    /// Current raw entries.
    pub fn entries(&self) -> Option<SessionEntries> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> TrustResult<Option<SessionEntries>> {
        Ok(self.entries())
    }

    async fn replace(&self, entries: &SessionEntries) -> TrustResult<()> {
        *self.entries.lock().unwrap_or_else(PoisonError::into_inner) = Some(entries.clone());
        Ok(())
    }

    async fn clear(&self) -> TrustResult<()> {
        *self.entries.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
