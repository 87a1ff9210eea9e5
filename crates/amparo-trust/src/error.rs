//! Error types for the trust core.

use std::fmt;

use crate::types::Capability;

/// Trust core errors.
///
/// Every denial or failure maps to a distinct variant so callers can present
/// accurate messaging instead of a generic failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrustError {
    /// No authenticated session, or the session ended mid-operation.
    #[error("unauthenticated: {message}")]
    Unauthenticated { message: String },

    /// The current principal's role may not use this capability.
    #[error("forbidden: {capability} is not permitted for this role")]
    Forbidden { capability: Capability },

    /// The document already carries an accepted envelope.
    #[error("document already signed: {document_id}")]
    AlreadySigned { document_id: String },

    /// Envelope could not be decoded or carries an unknown schema version.
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },

    /// Recomputed digest differs from the digest recorded in the envelope.
    #[error("integrity mismatch for {document_id}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        document_id: String,
        expected: String,
        actual: String,
    },

    /// Envelope belongs to a different document than the one verified.
    #[error("envelope is for document {envelope_document_id}, not {document_id}")]
    DocumentMismatch {
        document_id: String,
        envelope_document_id: String,
    },

    /// Backend could not be reached or the exchange did not complete.
    #[error("transport failure: {message}")]
    TransportFailure { message: String },

    /// Backend answered but refused the submission.
    #[error("submission rejected: {message}")]
    SubmissionRejected { message: String },

    /// Login refused by the backend.
    #[error("invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// Persisted session could not be read.
    #[error("corrupt session state: {message}")]
    CorruptSessionState { message: String },

    /// Document bytes or stored state could not be obtained.
    #[error("document unavailable: {document_id} - {message}")]
    DocumentUnavailable {
        document_id: String,
        message: String,
    },

    /// A signing operation for the document is already pending.
    #[error("signing already in progress: {document_id}")]
    SignInProgress { document_id: String },

    /// Request rejected before any work was done.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Session storage I/O failed.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

/// Stable classification of [`TrustError`] for presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    AlreadySigned,
    MalformedEnvelope,
    IntegrityMismatch,
    DocumentMismatch,
    TransportFailure,
    SubmissionRejected,
    InvalidCredentials,
    CorruptSessionState,
    DocumentUnavailable,
    SignInProgress,
    InvalidRequest,
    Storage,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::AlreadySigned => "already_signed",
            Self::MalformedEnvelope => "malformed_envelope",
            Self::IntegrityMismatch => "integrity_mismatch",
            Self::DocumentMismatch => "document_mismatch",
            Self::TransportFailure => "transport_failure",
            Self::SubmissionRejected => "submission_rejected",
            Self::InvalidCredentials => "invalid_credentials",
            Self::CorruptSessionState => "corrupt_session_state",
            Self::DocumentUnavailable => "document_unavailable",
            Self::SignInProgress => "sign_in_progress",
            Self::InvalidRequest => "invalid_request",
            Self::Storage => "storage",
            Self::Config => "config",
        };
        f.write_str(s)
    }
}

impl TrustError {
    pub(crate) fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::TransportFailure {
            message: message.into(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            reason: reason.into(),
        }
    }

    pub(crate) fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::AlreadySigned { .. } => ErrorKind::AlreadySigned,
            Self::MalformedEnvelope { .. } => ErrorKind::MalformedEnvelope,
            Self::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            Self::DocumentMismatch { .. } => ErrorKind::DocumentMismatch,
            Self::TransportFailure { .. } => ErrorKind::TransportFailure,
            Self::SubmissionRejected { .. } => ErrorKind::SubmissionRejected,
            Self::InvalidCredentials { .. } => ErrorKind::InvalidCredentials,
            Self::CorruptSessionState { .. } => ErrorKind::CorruptSessionState,
            Self::DocumentUnavailable { .. } => ErrorKind::DocumentUnavailable,
            Self::SignInProgress { .. } => ErrorKind::SignInProgress,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    ///
    /// The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportFailure { .. }
                | Self::SignInProgress { .. }
                | Self::DocumentUnavailable { .. }
        )
    }

    /// Whether the outcome is final for this document regardless of retries.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AlreadySigned { .. } | Self::MalformedEnvelope { .. }
        )
    }
}

impl From<reqwest::Error> for TrustError {
    fn from(err: reqwest::Error) -> Self {
        Self::TransportFailure {
            message: err.to_string(),
        }
    }
}

/// Result type for trust core operations.
pub type TrustResult<T> = Result<T, TrustError>;
