//! Document handles and byte sources.
//!
//! A [`DocumentRef`] never holds document bytes itself. Each hashing or
//! verification call asks its provider for a fresh reader, consumes it, and
//! drops it.

use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::io::AsyncRead;

/// Reader handed out by a [`RawBytesProvider`].
pub type DocumentReader = Box<dyn AsyncRead + Send + Unpin>;

/// Source of a document's raw bytes.
#[async_trait]
pub trait RawBytesProvider: Send + Sync {
    /// Open a new reader over the full content.
    async fn open(&self) -> std::io::Result<DocumentReader>;
}

/// Handle to a document's binary content.
#[derive(Clone)]
pub struct DocumentRef {
    pub id: String,
    pub name: String,
    pub extension: String,
    provider: Arc<dyn RawBytesProvider>,
}

impl DocumentRef {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        extension: impl Into<String>,
        provider: Arc<dyn RawBytesProvider>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extension: extension.into(),
            provider,
        }
    }

    /// Document backed by a file on disk.
    pub fn from_path(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(id, name, extension, Arc::new(FileBytes::new(path)))
    }

    pub async fn open(&self) -> std::io::Result<DocumentReader> {
        self.provider.open().await
    }
}

impl fmt::Debug for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentRef")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

/// Bytes already in memory.
#[derive(Debug, Clone)]
pub struct MemoryBytes {
    bytes: Arc<[u8]>,
}

impl MemoryBytes {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

#[async_trait]
impl RawBytesProvider for MemoryBytes {
    async fn open(&self) -> std::io::Result<DocumentReader> {
        Ok(Box::new(Cursor::new(Arc::clone(&self.bytes))))
    }
}

/// File read on every open.
#[derive(Debug, Clone)]
pub struct FileBytes {
    path: PathBuf,
}

impl FileBytes {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RawBytesProvider for FileBytes {
    async fn open(&self) -> std::io::Result<DocumentReader> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::new(file))
    }
}

/// Base64 content as stored by the backend (`fileBase64`), with or without a
/// `data:<mime>;base64,` prefix. Decoded on every open.
#[derive(Debug, Clone)]
pub struct Base64Bytes {
    encoded: Arc<str>,
}

impl Base64Bytes {
    pub fn new(encoded: impl Into<Arc<str>>) -> Self {
        Self {
            encoded: encoded.into(),
        }
    }
}

/// Strip a `data:*;base64,` URL prefix if present.
pub fn strip_data_url(encoded: &str) -> &str {
    if encoded.starts_with("data:") {
        if let Some(idx) = encoded.find(";base64,") {
            return &encoded[idx + ";base64,".len()..];
        }
    }
    encoded
}

#[async_trait]
impl RawBytesProvider for Base64Bytes {
    async fn open(&self) -> std::io::Result<DocumentReader> {
        let payload = strip_data_url(self.encoded.trim());
        let bytes = BASE64
            .decode(payload)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}
