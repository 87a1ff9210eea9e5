//! Integration tests for DocumentSigningWorkflow.
//!
//! Uses an in-memory backend that stores at most one envelope per document.
//! Tests cover the signing state machine, already-signed protection, policy
//! denials, session changes mid-flight, retries, cancellation and tamper
//! detection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use amparo_trust::types::SignatureSubmission;
use amparo_trust::{
    verify_document, verify_integrity, Capability, DocumentRef, DocumentSigningWorkflow,
    EncodedEnvelope, HashEngine, MemoryBytes, Principal, Role, SessionManager, SignOptions,
    SigningBackend, SigningState, StoredDocumentState, TrustError, TrustResult,
};
use async_trait::async_trait;
use tokio::sync::Notify;

/// Backend double: accepts the first envelope per document, answers
/// `AlreadySigned` afterwards.
#[derive(Default)]
struct InMemoryBackend {
    accepted: Mutex<HashMap<String, EncodedEnvelope>>,
    submit_calls: Mutex<usize>,
    // Ends this session during the state lookup when set.
    logout_during_lookup: Option<Arc<SessionManager>>,
    // Blocks the state lookup until notified when set.
    hold_lookup: Option<Arc<Notify>>,
    // Starts a new login on this session during the state lookup when set.
    relogin_during_lookup: Option<Arc<SessionManager>>,
    // Ends this session after accepting a submission when set.
    logout_after_accept: Option<Arc<SessionManager>>,
    // Answers every submission as already signed without storing it.
    conflict_on_submit: bool,
    // Number of submissions still to fail with a transport error.
    transport_failures: Mutex<usize>,
}

impl InMemoryBackend {
    fn submit_calls(&self) -> usize {
        *self.submit_calls.lock().unwrap()
    }

    fn accepted(&self, document_id: &str) -> Option<EncodedEnvelope> {
        self.accepted.lock().unwrap().get(document_id).cloned()
    }
}

#[async_trait]
impl SigningBackend for InMemoryBackend {
    async fn document_state(&self, document_id: &str) -> TrustResult<StoredDocumentState> {
        if let Some(notify) = &self.hold_lookup {
            notify.notified().await;
        }
        if let Some(session) = &self.logout_during_lookup {
            session.end_session().await?;
        }
        if let Some(session) = &self.relogin_during_lookup {
            let other = Principal::new("8", "Otra Persona", Role::Administrador, 14);
            session.begin_session(other, "tok-2").await?;
        }

        let envelope = self.accepted(document_id);
        Ok(StoredDocumentState {
            document_id: document_id.to_string(),
            signed: envelope.is_some(),
            envelope,
        })
    }

    async fn submit_signature(&self, submission: &SignatureSubmission) -> TrustResult<()> {
        *self.submit_calls.lock().unwrap() += 1;
        {
            let mut failures = self.transport_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(TrustError::TransportFailure {
                    message: "connection reset".to_string(),
                });
            }
        }
        if self.conflict_on_submit {
            return Err(TrustError::AlreadySigned {
                document_id: submission.document_id.clone(),
            });
        }
        {
            let mut accepted = self.accepted.lock().unwrap();
            if accepted.contains_key(&submission.document_id) {
                return Err(TrustError::AlreadySigned {
                    document_id: submission.document_id.clone(),
                });
            }
            accepted.insert(submission.document_id.clone(), submission.envelope.clone());
        }
        if let Some(session) = &self.logout_after_accept {
            session.end_session().await?;
        }
        Ok(())
    }
}

async fn session_for(role: Role) -> Arc<SessionManager> {
    let session = Arc::new(SessionManager::in_memory());
    session
        .begin_session(Principal::new("7", "María Hernández Ruiz", role, 14), "tok")
        .await
        .expect("begin session");
    session
}

fn document(id: &str, bytes: &[u8]) -> DocumentRef {
    DocumentRef::new(id, "acuerdo", "pdf", Arc::new(MemoryBytes::new(bytes.to_vec())))
}

#[tokio::test]
async fn test_sign_produces_digest_of_exact_bytes() {
    let backend = Arc::new(InMemoryBackend::default());
    let workflow =
        DocumentSigningWorkflow::new(session_for(Role::Administrador).await, backend.clone());
    let bytes = b"%PDF-1.7\n1 0 obj << /Type /Catalog >> endobj";

    let envelope = workflow
        .request_sign(&document("118", bytes), SignOptions::default())
        .await
        .expect("sign failed");

    assert_eq!(envelope.digest, HashEngine::digest(bytes));
    assert_eq!(envelope.document_id, "118");
    assert_eq!(envelope.signer_display_name, "María Hernández Ruiz");
    assert!(workflow.state("118").is_signed());
    assert!(backend.accepted("118").is_some());
}

#[tokio::test]
async fn test_resign_is_rejected_without_new_envelope() {
    let backend = Arc::new(InMemoryBackend::default());
    let workflow =
        DocumentSigningWorkflow::new(session_for(Role::Administrador).await, backend.clone());
    let doc = document("118", b"contenido");

    workflow
        .request_sign(&doc, SignOptions::default())
        .await
        .expect("first sign failed");
    let first = backend.accepted("118");

    let err = workflow
        .request_sign(&doc, SignOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::AlreadySigned { .. }));
    assert_eq!(backend.submit_calls(), 1);
    assert_eq!(backend.accepted("118"), first);
}

#[tokio::test]
async fn test_backend_signed_state_is_honored() {
    let backend = Arc::new(InMemoryBackend::default());

    // Signed through another workflow instance (another client).
    let other =
        DocumentSigningWorkflow::new(session_for(Role::Administrador).await, backend.clone());
    let original = other
        .request_sign(&document("50", b"oficio"), SignOptions::default())
        .await
        .expect("sign failed");

    let workflow =
        DocumentSigningWorkflow::new(session_for(Role::Administrador).await, backend.clone());
    let err = workflow
        .request_sign(&document("50", b"oficio"), SignOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, TrustError::AlreadySigned { .. }));
    assert_eq!(backend.submit_calls(), 1);
    match workflow.state("50") {
        SigningState::Signed {
            envelope: Some(envelope),
        } => assert_eq!(*envelope, original),
        other => panic!("expected Signed with envelope, got {other:?}"),
    }
}

#[tokio::test]
async fn test_operator_is_forbidden() {
    let backend = Arc::new(InMemoryBackend::default());
    let workflow = DocumentSigningWorkflow::new(session_for(Role::Operador).await, backend.clone());

    let err = workflow
        .request_sign(&document("1", b"x"), SignOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TrustError::Forbidden {
            capability: Capability::SignDocument
        }
    ));
    assert!(matches!(workflow.state("1"), SigningState::Unsigned));
    assert_eq!(backend.submit_calls(), 0);
}

#[tokio::test]
async fn test_no_session_is_unauthenticated() {
    let backend = Arc::new(InMemoryBackend::default());
    let workflow =
        DocumentSigningWorkflow::new(Arc::new(SessionManager::in_memory()), backend.clone());

    let err = workflow
        .request_sign(&document("1", b"x"), SignOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, TrustError::Unauthenticated { .. }));
    assert!(matches!(workflow.state("1"), SigningState::Unsigned));
}

#[tokio::test]
async fn test_logout_mid_flight_fails_without_submitting() {
    let session = session_for(Role::Administrador).await;
    let backend = Arc::new(InMemoryBackend {
        logout_during_lookup: Some(Arc::clone(&session)),
        ..Default::default()
    });
    let workflow = DocumentSigningWorkflow::new(Arc::clone(&session), backend.clone());

    let err = workflow
        .request_sign(&document("77", b"bytes"), SignOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, TrustError::Unauthenticated { .. }));
    assert_eq!(backend.submit_calls(), 0);
    assert!(matches!(
        workflow.state("77").error(),
        Some(TrustError::Unauthenticated { .. })
    ));
}

#[tokio::test]
async fn test_unavailable_document_fails_then_retry_succeeds() {
    let backend = Arc::new(InMemoryBackend::default());
    let workflow =
        DocumentSigningWorkflow::new(session_for(Role::Administrador).await, backend.clone());
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("acuerdo.pdf");
    let doc = DocumentRef::from_path("9", &path);

    let err = workflow
        .request_sign(&doc, SignOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::DocumentUnavailable { .. }));
    assert!(err.is_retryable());
    assert!(workflow.state("9").error().is_some());
    assert_eq!(backend.submit_calls(), 0);

    std::fs::write(&path, b"ya disponible").unwrap();
    let envelope = workflow
        .request_sign(&doc, SignOptions::default())
        .await
        .expect("retry failed");
    assert_eq!(envelope.digest, HashEngine::digest(b"ya disponible"));
    assert!(workflow.state("9").is_signed());
}

#[tokio::test]
async fn test_concurrent_request_is_in_progress() {
    let hold = Arc::new(Notify::new());
    let backend = Arc::new(InMemoryBackend {
        hold_lookup: Some(Arc::clone(&hold)),
        ..Default::default()
    });
    let workflow = Arc::new(DocumentSigningWorkflow::new(
        session_for(Role::Administrador).await,
        backend.clone(),
    ));

    let first = {
        let workflow = Arc::clone(&workflow);
        tokio::spawn(async move {
            workflow
                .request_sign(&document("3", b"x"), SignOptions::default())
                .await
        })
    };

    // Wait until the first request is parked in the lookup.
    while !workflow.state("3").is_pending() {
        tokio::task::yield_now().await;
    }

    let err = workflow
        .request_sign(&document("3", b"x"), SignOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::SignInProgress { .. }));

    hold.notify_one();
    first.await.unwrap().expect("first request failed");
    assert_eq!(backend.submit_calls(), 1);
}

#[tokio::test]
async fn test_cancelled_request_reverts_to_unsigned() {
    let backend = Arc::new(InMemoryBackend {
        hold_lookup: Some(Arc::new(Notify::new())),
        ..Default::default()
    });
    let workflow =
        DocumentSigningWorkflow::new(session_for(Role::Administrador).await, backend.clone());

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        workflow.request_sign(&document("4", b"x"), SignOptions::default()),
    )
    .await;

    assert!(result.is_err(), "request should still be pending");
    assert!(matches!(workflow.state("4"), SigningState::Unsigned));
    assert_eq!(backend.submit_calls(), 0);
}

#[tokio::test]
async fn test_tampered_bytes_are_detected() {
    let backend = Arc::new(InMemoryBackend::default());
    let workflow =
        DocumentSigningWorkflow::new(session_for(Role::Administrador).await, backend.clone());
    let original = b"Se concede la suspension definitiva.".to_vec();

    let envelope = workflow
        .request_sign(&document("200", &original), SignOptions::default())
        .await
        .expect("sign failed");

    assert!(verify_integrity(&envelope, &original).is_ok());
    assert!(verify_document(&envelope, &document("200", &original))
        .await
        .is_ok());

    let mut tampered = original.clone();
    tampered[3] ^= 0x01;
    let err = verify_document(&envelope, &document("200", &tampered))
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::IntegrityMismatch { .. }));

    // Stored envelope against the tampered bytes
    let err = workflow
        .verify_stored(&document("200", &tampered))
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::IntegrityMismatch { .. }));
    assert_eq!(
        workflow
            .verify_stored(&document("200", &original))
            .await
            .expect("verify stored"),
        envelope
    );
}

#[tokio::test]
async fn test_relogin_mid_flight_fails_without_submitting() {
    let session = session_for(Role::Administrador).await;
    let backend = Arc::new(InMemoryBackend {
        relogin_during_lookup: Some(Arc::clone(&session)),
        ..Default::default()
    });
    let workflow = DocumentSigningWorkflow::new(Arc::clone(&session), backend.clone());

    let err = workflow
        .request_sign(&document("78", b"bytes"), SignOptions::default())
        .await
        .unwrap_err();

    // A session is still present, but it is not the one the request began with.
    assert!(session.is_authenticated());
    assert!(matches!(err, TrustError::Unauthenticated { .. }));
    assert_eq!(backend.submit_calls(), 0);
    assert!(workflow.state("78").error().is_some());
}

#[tokio::test]
async fn test_logout_after_acceptance_still_signs() {
    let session = session_for(Role::Administrador).await;
    let backend = Arc::new(InMemoryBackend {
        logout_after_accept: Some(Arc::clone(&session)),
        ..Default::default()
    });
    let workflow = DocumentSigningWorkflow::new(Arc::clone(&session), backend.clone());

    let envelope = workflow
        .request_sign(&document("79", b"bytes"), SignOptions::default())
        .await
        .expect("accepted signature should settle as signed");

    assert!(session.current_session().is_none());
    assert_eq!(envelope.signer_principal_id, "7");
    assert!(workflow.state("79").is_signed());
    assert!(backend.accepted("79").is_some());
}

#[tokio::test]
async fn test_submit_conflict_settles_signed_without_envelope() {
    let backend = Arc::new(InMemoryBackend {
        conflict_on_submit: true,
        ..Default::default()
    });
    let workflow =
        DocumentSigningWorkflow::new(session_for(Role::Administrador).await, backend.clone());

    let err = workflow
        .request_sign(&document("80", b"bytes"), SignOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, TrustError::AlreadySigned { .. }));
    assert!(matches!(
        workflow.state("80"),
        SigningState::Signed { envelope: None }
    ));
    assert_eq!(backend.submit_calls(), 1);
}

#[tokio::test]
async fn test_transport_failure_then_retry_signs() {
    let backend = Arc::new(InMemoryBackend {
        transport_failures: Mutex::new(1),
        ..Default::default()
    });
    let workflow =
        DocumentSigningWorkflow::new(session_for(Role::Administrador).await, backend.clone());
    let doc = document("81", b"contenido");

    let err = workflow
        .request_sign(&doc, SignOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TrustError::TransportFailure { .. }));
    assert!(err.is_retryable());
    assert!(matches!(
        workflow.state("81").error(),
        Some(TrustError::TransportFailure { .. })
    ));
    assert!(backend.accepted("81").is_none());

    let envelope = workflow
        .request_sign(&doc, SignOptions::default())
        .await
        .expect("retry failed");
    assert_eq!(envelope.digest, HashEngine::digest(b"contenido"));
    assert!(workflow.state("81").is_signed());
    assert_eq!(backend.submit_calls(), 2);
}
