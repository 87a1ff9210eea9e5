//! Integrity verification of signed documents.
//!
//! Recomputes the digest of a document's current bytes and compares it with
//! the digest recorded in an envelope. This detects any change to the bytes
//! after signing; it does not authenticate the signer (see the envelope
//! module's limitations).

use tracing::{debug, warn};

use crate::digest::{DigestValue, HashEngine};
use crate::document::DocumentRef;
use crate::envelope::{self, EncodedEnvelope, SignatureEnvelope};
use crate::error::{TrustError, TrustResult};

/// Check `bytes` against the envelope's digest.
pub fn verify_integrity(envelope: &SignatureEnvelope, bytes: &[u8]) -> TrustResult<()> {
    compare(envelope, HashEngine::digest(bytes))
}

/// Check a document's current bytes against the envelope.
///
/// The envelope must name this document; a mismatch is reported before any
/// bytes are read.
pub async fn verify_document(
    envelope: &SignatureEnvelope,
    document: &DocumentRef,
) -> TrustResult<()> {
    if envelope.document_id != document.id {
        return Err(TrustError::DocumentMismatch {
            document_id: document.id.clone(),
            envelope_document_id: envelope.document_id.clone(),
        });
    }

    let unavailable = |e: std::io::Error| TrustError::DocumentUnavailable {
        document_id: document.id.clone(),
        message: e.to_string(),
    };
    let reader = document.open().await.map_err(unavailable)?;
    let actual = HashEngine::digest_async(reader).await.map_err(unavailable)?;

    compare(envelope, actual)
}

/// Decode `encoded` and verify it against `document`.
pub async fn verify_encoded(
    encoded: &EncodedEnvelope,
    document: &DocumentRef,
) -> TrustResult<SignatureEnvelope> {
    let envelope = envelope::decode(encoded)?;
    verify_document(&envelope, document).await?;
    Ok(envelope)
}

fn compare(envelope: &SignatureEnvelope, actual: DigestValue) -> TrustResult<()> {
    if envelope.digest != actual {
        warn!(
            document_id = %envelope.document_id,
            expected = %envelope.digest,
            actual = %actual,
            "document digest mismatch"
        );
        return Err(TrustError::IntegrityMismatch {
            document_id: envelope.document_id.clone(),
            expected: envelope.digest.to_hex(),
            actual: actual.to_hex(),
        });
    }

    debug!(document_id = %envelope.document_id, "document integrity verified");
    Ok(())
}
