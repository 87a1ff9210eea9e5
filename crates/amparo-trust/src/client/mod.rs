//! Backend client for login, document lookup and signature submission.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Method;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::TrustConfig;
use crate::error::{TrustError, TrustResult};
use crate::session::SessionManager;
use crate::types::{
    ApiResponse, DocumentRecord, LoginData, LoginRequest, Session, SignatureSubmission,
    StoredDocumentState,
};

mod http;

use http::{Endpoint, HttpBackend};

const USER_AGENT_VALUE: &str = concat!("amparo-trust/", env!("CARGO_PKG_VERSION"));

/// Backend operations the signing workflow depends on.
#[async_trait]
pub trait SigningBackend: Send + Sync {
    /// Stored signing state of a document.
    async fn document_state(&self, document_id: &str) -> TrustResult<StoredDocumentState>;

    /// Hand a signature over. The backend accepts at most one per document
    /// and answers a second one with `AlreadySigned`.
    async fn submit_signature(&self, submission: &SignatureSubmission) -> TrustResult<()>;
}

/// HTTP client for the case-management backend.
///
/// Authenticated requests carry the current session's token. A 401 on such a
/// request ends that session, unless a newer one replaced it meanwhile.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: HttpBackend,
    session: Arc<SessionManager>,
}

impl BackendClient {
    pub fn new(config: &TrustConfig, session: Arc<SessionManager>) -> TrustResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| TrustError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let base_url = Url::parse(config.api_url.trim()).map_err(|e| TrustError::Config {
            message: format!("invalid API URL '{}': {}", config.api_url, e),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TrustError::Config {
                message: format!("API URL cannot be a base: {}", base_url),
            });
        }

        Ok(Self {
            http: HttpBackend { client, base_url },
            session,
        })
    }

    pub fn from_env(session: Arc<SessionManager>) -> TrustResult<Self> {
        Self::new(&TrustConfig::from_env(), session)
    }

    /// Exchange credentials for a session and make it current.
    ///
    /// On any failure the previous session state is left untouched.
    pub async fn login(&self, request: &LoginRequest) -> TrustResult<Session> {
        let url = self.http.endpoint_url(&["auth", "login"])?;
        debug!(usuario = %request.usuario, "logging in");

        let response: ApiResponse<LoginData> = self
            .http
            .send(Method::POST, url, Endpoint::Login, None, Some(request))
            .await?;

        let data = match response {
            ApiResponse {
                success: true,
                data: Some(data),
                ..
            } => data,
            ApiResponse {
                success: true,
                data: None,
                ..
            } => return Err(TrustError::transport("login response has no data")),
            ApiResponse { message, .. } => {
                return Err(TrustError::InvalidCredentials {
                    message: message.unwrap_or_else(|| "login rejected".to_string()),
                })
            }
        };

        let principal = data.user.to_principal();
        info!(principal_id = %principal.id, "login accepted");
        self.session.begin_session(principal, data.token).await
    }

    /// End the current session.
    pub async fn logout(&self) -> TrustResult<()> {
        self.session.end_session().await
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url.as_str()
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Run an authenticated request, ending the session it was sent with
    /// when the backend reports the token as invalid.
    async fn authorized<B, T>(
        &self,
        method: Method,
        url: Url,
        endpoint: Endpoint<'_>,
        body: Option<&B>,
    ) -> TrustResult<ApiResponse<T>>
    where
        B: serde::Serialize + ?Sized + Sync,
        T: serde::de::DeserializeOwned,
    {
        let epoch = self.session.epoch();
        let token = self.session.bearer_token();

        let result = self
            .http
            .send(method, url, endpoint, token.as_deref(), body)
            .await;

        if let Err(TrustError::Unauthenticated { .. }) = &result {
            match self.session.invalidate(epoch).await {
                Ok(true) => warn!("backend rejected the session token; session ended"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "failed to end rejected session"),
            }
        }

        result
    }
}

#[async_trait]
impl SigningBackend for BackendClient {
    async fn document_state(&self, document_id: &str) -> TrustResult<StoredDocumentState> {
        let url = self
            .http
            .endpoint_url(&["documentos-notificacion", document_id])?;
        debug!(document_id, "fetching stored document state");

        let response: ApiResponse<DocumentRecord> = self
            .authorized::<(), _>(Method::GET, url, Endpoint::DocumentState { document_id }, None)
            .await?;

        match response {
            ApiResponse {
                success: true,
                data: Some(record),
                ..
            } => Ok(record.into_state()),
            ApiResponse { message, .. } => Err(TrustError::DocumentUnavailable {
                document_id: document_id.to_string(),
                message: message.unwrap_or_else(|| "document lookup failed".to_string()),
            }),
        }
    }

    async fn submit_signature(&self, submission: &SignatureSubmission) -> TrustResult<()> {
        let url = self
            .http
            .endpoint_url(&["documentos-notificacion", "firmar"])?;
        let document_id = submission.document_id.as_str();
        debug!(document_id, "submitting signature");

        let response: ApiResponse<serde_json::Value> = self
            .authorized(
                Method::POST,
                url,
                Endpoint::SubmitSignature { document_id },
                Some(submission),
            )
            .await?;

        if !response.success {
            return Err(TrustError::SubmissionRejected {
                message: response
                    .message
                    .unwrap_or_else(|| "signature rejected".to_string()),
            });
        }

        info!(document_id, "signature accepted by backend");
        Ok(())
    }
}
