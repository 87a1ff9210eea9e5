//! Signature envelope codec.
//!
//! An envelope binds a signer's identity, a UTC timestamp and the digest of a
//! document's bytes. The encoded form is base64 (standard alphabet) over a
//! JSON object with camelCase keys that always carries `schemaVersion`:
//!
//! ```text
//! {
//!   "schemaVersion": "1.0",
//!   "documentId": "118",
//!   "signerPrincipalId": "7",
//!   "signerDisplayName": "María Hernández Ruiz",
//!   "orgUnitId": 14,
//!   "signedAtUtc": "2026-03-02T17:41:09.512Z",
//!   "digest": "9f86d081884c7d65..."
//! }
//! ```
//!
//! # Limitations
//!
//! The envelope is an integrity and provenance record, not a public-key
//! signature. Anyone able to compute SHA-256 can produce a well-formed
//! envelope, and nothing in it is confidential. It proves *which bytes* were
//! accepted for a document, and the backend's acceptance is what binds it to
//! the signer. It must not be presented as non-repudiation.
//!
//! `signedAtUtc` is RFC 3339, which only has room for four-digit years, so
//! envelopes round-trip for timestamps in years 0000 through 9999. Envelopes
//! built by the signing workflow always use the current time.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::DigestValue;
use crate::error::{TrustError, TrustResult};

/// Schema version written by [`encode`].
pub const ENVELOPE_SCHEMA_VERSION: &str = "1.0";

/// Schema versions [`decode`] accepts.
pub const SUPPORTED_SCHEMA_VERSIONS: &[&str] = &[ENVELOPE_SCHEMA_VERSION];

/// Integrity and provenance record for one signed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureEnvelope {
    pub schema_version: String,
    pub document_id: String,
    pub signer_principal_id: String,
    pub signer_display_name: String,
    pub org_unit_id: i64,
    pub signed_at_utc: DateTime<Utc>,
    pub digest: DigestValue,
}

/// Portable encoded envelope (base64 JSON).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedEnvelope(String);

impl EncodedEnvelope {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for EncodedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedEnvelope({} bytes)", self.0.len())
    }
}

impl fmt::Display for EncodedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lenient mirror of [`SignatureEnvelope`] so that missing fields can be
/// reported by name instead of as a generic parse failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    schema_version: Option<String>,
    document_id: Option<String>,
    signer_principal_id: Option<String>,
    signer_display_name: Option<String>,
    org_unit_id: Option<i64>,
    signed_at_utc: Option<String>,
    digest: Option<String>,
}

fn require<T>(value: Option<T>, field: &str) -> TrustResult<T> {
    value.ok_or_else(|| TrustError::malformed(format!("missing required field '{}'", field)))
}

/// Encode an envelope into its portable form.
///
/// A `signed_at_utc` outside years 0000 to 9999 is written with an expanded
/// year that [`decode`] rejects.
pub fn encode(envelope: &SignatureEnvelope) -> EncodedEnvelope {
    let json = serde_json::json!({
        "schemaVersion": envelope.schema_version,
        "documentId": envelope.document_id,
        "signerPrincipalId": envelope.signer_principal_id,
        "signerDisplayName": envelope.signer_display_name,
        "orgUnitId": envelope.org_unit_id,
        "signedAtUtc": envelope.signed_at_utc.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        "digest": envelope.digest.to_hex(),
    });
    EncodedEnvelope(BASE64.encode(json.to_string()))
}

/// Decode and validate an encoded envelope.
pub fn decode(encoded: &EncodedEnvelope) -> TrustResult<SignatureEnvelope> {
    let bytes = BASE64
        .decode(encoded.as_str().trim())
        .map_err(|e| TrustError::malformed(format!("invalid base64: {}", e)))?;

    let raw: RawEnvelope = serde_json::from_slice(&bytes)
        .map_err(|e| TrustError::malformed(format!("invalid JSON: {}", e)))?;

    // Version first: an unknown schema may legitimately lack today's fields.
    let schema_version = require(raw.schema_version, "schemaVersion")?;
    if !SUPPORTED_SCHEMA_VERSIONS.contains(&schema_version.as_str()) {
        return Err(TrustError::malformed(format!(
            "unsupported schema version '{}'",
            schema_version
        )));
    }

    let document_id = require(raw.document_id, "documentId")?;
    if document_id.is_empty() {
        return Err(TrustError::malformed("empty documentId"));
    }
    let signer_principal_id = require(raw.signer_principal_id, "signerPrincipalId")?;
    let signer_display_name = require(raw.signer_display_name, "signerDisplayName")?;
    let org_unit_id = require(raw.org_unit_id, "orgUnitId")?;

    let signed_at_utc = require(raw.signed_at_utc, "signedAtUtc")?;
    let signed_at_utc = DateTime::parse_from_rfc3339(&signed_at_utc)
        .map_err(|e| TrustError::malformed(format!("invalid signedAtUtc: {}", e)))?
        .with_timezone(&Utc);

    let digest = require(raw.digest, "digest")?;
    let digest = DigestValue::from_hex(&digest).map_err(|e| TrustError::malformed(e.to_string()))?;

    Ok(SignatureEnvelope {
        schema_version,
        document_id,
        signer_principal_id,
        signer_display_name,
        org_unit_id,
        signed_at_utc,
        digest,
    })
}
