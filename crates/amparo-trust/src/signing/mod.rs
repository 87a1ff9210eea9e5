//! Document signing workflow.
//!
//! Per document: `Unsigned -> Pending -> Signed`, with `Pending -> Failed` on
//! any error and `Failed -> Pending` on retry. `Signed` is terminal.
//!
//! A request runs in this order, and nothing reaches the backend before the
//! final step:
//!
//! 1. policy check for [`Capability::SignDocument`]
//! 2. local and stored already-signed checks
//! 3. digest of bytes read fresh from the document's provider
//! 4. envelope construction and encoding
//! 5. submission
//!
//! The session epoch is compared after digesting and again right before
//! submitting; a logout or re-login in between fails the request as
//! `Unauthenticated`. Once the backend has accepted a submission the document
//! is `Signed`, whatever happens to the session afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{SubsecRound, Utc};
use tracing::{debug, info, warn};

use crate::client::SigningBackend;
use crate::digest::{DigestValue, HashEngine};
use crate::document::DocumentRef;
use crate::envelope::{self, SignatureEnvelope, ENVELOPE_SCHEMA_VERSION};
use crate::error::{TrustError, TrustResult};
use crate::policy::{AuthorizationPolicy, Decision};
use crate::session::SessionManager;
use crate::types::{Capability, Principal, SignatureSubmission, StoredDocumentState};

pub mod verify;

pub use verify::{verify_document, verify_encoded, verify_integrity};

/// Longest accepted observations text, in characters.
pub const MAX_OBSERVATIONS_LEN: usize = 500;

/// Signing state of one document.
#[derive(Debug, Clone, Default)]
pub enum SigningState {
    #[default]
    Unsigned,
    Pending,
    /// Terminal. `envelope` is `None` when the backend reported the document
    /// as signed without returning a readable envelope.
    Signed {
        envelope: Option<Box<SignatureEnvelope>>,
    },
    Failed(TrustError),
}

impl SigningState {
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Signed { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn error(&self) -> Option<&TrustError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Options captured by the signing form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignOptions {
    pub observations: Option<String>,
}

impl SignOptions {
    pub fn with_observations(mut self, observations: impl Into<String>) -> Self {
        self.observations = Some(observations.into());
        self
    }

    fn validate(&self) -> TrustResult<()> {
        let len = self.observations.as_deref().map_or(0, |o| o.chars().count());
        if len > MAX_OBSERVATIONS_LEN {
            return Err(TrustError::InvalidRequest {
                message: format!(
                    "observations exceed {} characters ({})",
                    MAX_OBSERVATIONS_LEN, len
                ),
            });
        }
        Ok(())
    }
}

type StateMap = Mutex<HashMap<String, SigningState>>;

/// Holds a document in `Pending`. Dropped without [`complete`](Self::complete)
/// (e.g. the request future was cancelled), it puts the document back to
/// `Unsigned`.
struct PendingGuard<'a> {
    states: &'a StateMap,
    document_id: String,
    armed: bool,
}

impl PendingGuard<'_> {
    fn complete(mut self, state: SigningState) {
        self.armed = false;
        lock(self.states).insert(self.document_id.clone(), state);
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut states = lock(self.states);
        if states
            .get(&self.document_id)
            .is_some_and(SigningState::is_pending)
        {
            debug!(document_id = %self.document_id, "signing cancelled, reverting to unsigned");
            states.insert(self.document_id.clone(), SigningState::Unsigned);
        }
    }
}

fn lock(states: &StateMap) -> std::sync::MutexGuard<'_, HashMap<String, SigningState>> {
    states.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives the per-document signing state machine.
pub struct DocumentSigningWorkflow {
    session: Arc<SessionManager>,
    backend: Arc<dyn SigningBackend>,
    policy: AuthorizationPolicy,
    states: StateMap,
}

impl std::fmt::Debug for DocumentSigningWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSigningWorkflow")
            .field("session", &self.session)
            .field("documents", &lock(&self.states).len())
            .finish_non_exhaustive()
    }
}

impl DocumentSigningWorkflow {
    pub fn new(session: Arc<SessionManager>, backend: Arc<dyn SigningBackend>) -> Self {
        Self {
            session,
            backend,
            policy: AuthorizationPolicy,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Current state of a document. Unknown documents are `Unsigned`.
    pub fn state(&self, document_id: &str) -> SigningState {
        lock(&self.states)
            .get(document_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Sign `document` as the current principal.
    ///
    /// Returns the accepted envelope. Denials leave the state untouched;
    /// every other failure is recorded as `Failed` and returned.
    pub async fn request_sign(
        &self,
        document: &DocumentRef,
        options: SignOptions,
    ) -> TrustResult<SignatureEnvelope> {
        let snapshot = self.session.snapshot();
        let principal = match self
            .policy
            .decide(snapshot.session.as_ref(), Capability::SignDocument)
        {
            Decision::Allow => snapshot
                .principal()
                .cloned()
                .ok_or_else(|| TrustError::unauthenticated("no authenticated session"))?,
            Decision::DenyUnauthenticated => {
                return Err(TrustError::unauthenticated("no authenticated session"))
            }
            Decision::DenyForbidden => {
                return Err(TrustError::Forbidden {
                    capability: Capability::SignDocument,
                })
            }
        };
        options.validate()?;
        if document.id.is_empty() {
            return Err(TrustError::InvalidRequest {
                message: "document id is empty".to_string(),
            });
        }

        let pending = self.begin(&document.id)?;
        info!(document_id = %document.id, principal_id = %principal.id, "signing started");

        match self
            .run(document, &principal, snapshot.epoch, options)
            .await
        {
            Ok(envelope) => {
                info!(document_id = %document.id, "document signed");
                pending.complete(SigningState::Signed {
                    envelope: Some(Box::new(envelope.clone())),
                });
                Ok(envelope)
            }
            Err(Outcome::AlreadySigned(envelope)) => {
                info!(document_id = %document.id, "document already signed");
                pending.complete(SigningState::Signed { envelope });
                Err(TrustError::AlreadySigned {
                    document_id: document.id.clone(),
                })
            }
            Err(Outcome::Failed(e)) => {
                warn!(document_id = %document.id, error = %e, "signing failed");
                pending.complete(SigningState::Failed(e.clone()));
                Err(e)
            }
        }
    }

    /// Verify the envelope the backend holds for `document` against its
    /// current bytes.
    pub async fn verify_stored(&self, document: &DocumentRef) -> TrustResult<SignatureEnvelope> {
        let stored = self.backend.document_state(&document.id).await?;
        let encoded = stored
            .envelope
            .ok_or_else(|| TrustError::DocumentUnavailable {
                document_id: document.id.clone(),
                message: if stored.signed {
                    "no envelope stored".to_string()
                } else {
                    "document is not signed".to_string()
                },
            })?;
        verify_encoded(&encoded, document).await
    }

    fn begin(&self, document_id: &str) -> TrustResult<PendingGuard<'_>> {
        let mut states = lock(&self.states);
        match states.get(document_id) {
            Some(SigningState::Signed { .. }) => Err(TrustError::AlreadySigned {
                document_id: document_id.to_string(),
            }),
            Some(SigningState::Pending) => Err(TrustError::SignInProgress {
                document_id: document_id.to_string(),
            }),
            _ => {
                states.insert(document_id.to_string(), SigningState::Pending);
                Ok(PendingGuard {
                    states: &self.states,
                    document_id: document_id.to_string(),
                    armed: true,
                })
            }
        }
    }

    async fn run(
        &self,
        document: &DocumentRef,
        principal: &Principal,
        epoch: u64,
        options: SignOptions,
    ) -> Result<SignatureEnvelope, Outcome> {
        let stored = self.backend.document_state(&document.id).await?;
        if stored.signed {
            return Err(Outcome::AlreadySigned(stored_envelope(&stored)));
        }

        let digest = digest_document(document).await?;
        self.ensure_epoch(epoch)?;

        let envelope = SignatureEnvelope {
            schema_version: ENVELOPE_SCHEMA_VERSION.to_string(),
            document_id: document.id.clone(),
            signer_principal_id: principal.id.clone(),
            signer_display_name: principal.display_name.clone(),
            org_unit_id: principal.org_unit_id,
            signed_at_utc: Utc::now().trunc_subsecs(3),
            digest,
        };

        let submission = SignatureSubmission {
            document_id: envelope.document_id.clone(),
            signer_id: envelope.signer_principal_id.clone(),
            signer_name: envelope.signer_display_name.clone(),
            org_unit_id: envelope.org_unit_id,
            signed_at_utc: envelope.signed_at_utc,
            digest_hex: digest.to_hex(),
            observations: options.observations.unwrap_or_default(),
            envelope: envelope::encode(&envelope),
        };

        self.ensure_epoch(epoch)?;
        match self.backend.submit_signature(&submission).await {
            Ok(()) => {}
            Err(TrustError::AlreadySigned { .. }) => return Err(Outcome::AlreadySigned(None)),
            Err(e) => return Err(Outcome::Failed(e)),
        }
        if self.session.epoch() != epoch {
            info!(
                document_id = %document.id,
                "session changed after the signature was accepted"
            );
        }

        Ok(envelope)
    }

    fn ensure_epoch(&self, epoch: u64) -> Result<(), Outcome> {
        if self.session.epoch() != epoch {
            return Err(Outcome::Failed(TrustError::unauthenticated(
                "session changed while signing",
            )));
        }
        Ok(())
    }
}

/// Non-success results of one signing run.
enum Outcome {
    AlreadySigned(Option<Box<SignatureEnvelope>>),
    Failed(TrustError),
}

impl From<TrustError> for Outcome {
    fn from(e: TrustError) -> Self {
        match e {
            TrustError::AlreadySigned { .. } => Self::AlreadySigned(None),
            e => Self::Failed(e),
        }
    }
}

async fn digest_document(document: &DocumentRef) -> TrustResult<DigestValue> {
    let unavailable = |e: std::io::Error| TrustError::DocumentUnavailable {
        document_id: document.id.clone(),
        message: e.to_string(),
    };

    let reader = document.open().await.map_err(unavailable)?;
    let digest = HashEngine::digest_async(reader).await.map_err(unavailable)?;
    debug!(document_id = %document.id, digest = %digest, "document digested");
    Ok(digest)
}

fn stored_envelope(stored: &StoredDocumentState) -> Option<Box<SignatureEnvelope>> {
    let encoded = stored.envelope.as_ref()?;
    match envelope::decode(encoded) {
        Ok(envelope) => Some(Box::new(envelope)),
        Err(e) => {
            warn!(document_id = %stored.document_id, error = %e, "stored envelope unreadable");
            None
        }
    }
}
