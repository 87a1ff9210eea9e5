//! Session trust and document integrity core for the Amparo client.
//!
//! This crate owns who is logged in, what they may do, and how a document's
//! exact bytes get bound to a signer:
//!
//! - Authenticated session lifecycle with atomic persistence
//! - Role-based authorization policy and route guard
//! - SHA-256 digests over document bytes (streamed)
//! - Base64 JSON signature envelopes
//! - Signing workflow with already-signed protection
//! - Integrity verification of signed documents
//! - HTTP client for the case-management backend
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use amparo_trust::{
//!     BackendClient, DocumentRef, DocumentSigningWorkflow, LoginRequest, SessionManager,
//!     SignOptions, TrustConfig,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = TrustConfig::from_env();
//! let session = Arc::new(SessionManager::with_file(config.resolved_session_path()?));
//! session.restore().await;
//!
//! let client = Arc::new(BackendClient::new(&config, Arc::clone(&session))?);
//! if !session.is_authenticated() {
//!     client.login(&LoginRequest::new("mhernandez", "secreto")).await?;
//! }
//!
//! let workflow = DocumentSigningWorkflow::new(Arc::clone(&session), client);
//! let document = DocumentRef::from_path("118", "acuerdo.pdf");
//! let envelope = workflow.request_sign(&document, SignOptions::default()).await?;
//! println!("signed {} with digest {}", envelope.document_id, envelope.digest);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `AMPARO_API_URL` | Backend base URL (default: `http://localhost:3000/api`) |
//! | `AMPARO_SESSION_FILE` | Persisted session record (default: `<data dir>/amparo/session.json`) |
//! | `AMPARO_HTTP_TIMEOUT` | Request timeout in seconds (default: 30) |

pub mod client;
pub mod config;
pub mod digest;
pub mod document;
pub mod envelope;
pub mod error;
pub mod guard;
pub mod policy;
pub mod session;
pub mod signing;
pub mod types;

// Re-export main types
pub use client::{BackendClient, SigningBackend};
pub use config::TrustConfig;
pub use digest::{DigestStream, DigestValue, HashEngine};
pub use document::{Base64Bytes, DocumentRef, FileBytes, MemoryBytes, RawBytesProvider};
pub use envelope::{EncodedEnvelope, SignatureEnvelope, ENVELOPE_SCHEMA_VERSION};
pub use error::{ErrorKind, TrustError, TrustResult};
pub use guard::{GuardDecision, RedirectTarget, RouteGuard};
pub use policy::{AuthorizationPolicy, Decision};
pub use session::{
    FileSessionStore, MemorySessionStore, SessionManager, SessionSnapshot, SessionStore,
};
pub use signing::{
    verify_document, verify_encoded, verify_integrity, DocumentSigningWorkflow, SignOptions,
    SigningState,
};
pub use types::{Capability, LoginRequest, Principal, Role, Session, StoredDocumentState};
