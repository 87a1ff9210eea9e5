//! Content digests of raw document bytes (SHA-256).
//!
//! Streaming and single-shot hashing share one implementation, so a document
//! hashed in chunks yields exactly the digest of its full byte sequence.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read size used when streaming document bytes.
const CHUNK_SIZE: usize = 8192;

/// Length of a digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Fixed-length SHA-256 digest, hex-encoded for transport.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DigestValue([u8; DIGEST_LEN]);

impl DigestValue {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex digest (either case).
    pub fn from_hex(s: &str) -> Result<Self, DigestParseError> {
        if s.len() != DIGEST_LEN * 2 {
            return Err(DigestParseError {
                reason: format!("expected {} hex chars, got {}", DIGEST_LEN * 2, s.len()),
            });
        }
        let mut out = [0_u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut out).map_err(|e| DigestParseError {
            reason: e.to_string(),
        })?;
        Ok(Self(out))
    }
}

impl fmt::Display for DigestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DigestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DigestValue({})", self.to_hex())
    }
}

impl FromStr for DigestValue {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for DigestValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DigestValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Invalid hex digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid digest: {reason}")]
pub struct DigestParseError {
    reason: String,
}

/// Incremental hasher for callers that feed bytes as they arrive.
#[derive(Debug, Clone, Default)]
pub struct DigestStream {
    hasher: Sha256,
}

impl DigestStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    pub fn finalize(self) -> DigestValue {
        let mut out = [0_u8; DIGEST_LEN];
        out.copy_from_slice(&self.hasher.finalize());
        DigestValue(out)
    }
}

/// SHA-256 over document bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashEngine;

impl HashEngine {
    /// Digest an in-memory byte sequence. Empty input is valid.
    pub fn digest(bytes: &[u8]) -> DigestValue {
        let mut stream = DigestStream::new();
        for chunk in bytes.chunks(CHUNK_SIZE) {
            stream.update(chunk);
        }
        stream.finalize()
    }

    /// Digest a blocking reader in fixed-size chunks.
    pub fn digest_reader<R: Read>(mut reader: R) -> std::io::Result<DigestValue> {
        let mut stream = DigestStream::new();
        let mut buf = [0_u8; CHUNK_SIZE];

        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            stream.update(&buf[..n]);
        }

        Ok(stream.finalize())
    }

    /// Digest an async reader in fixed-size chunks without materializing it.
    pub async fn digest_async<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<DigestValue> {
        let mut stream = DigestStream::new();
        let mut buf = vec![0_u8; CHUNK_SIZE];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            stream.update(&buf[..n]);
        }

        Ok(stream.finalize())
    }

    /// Hex digest of in-memory bytes.
    pub fn digest_hex(bytes: &[u8]) -> String {
        Self::digest(bytes).to_hex()
    }
}
