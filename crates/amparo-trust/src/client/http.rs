//! HTTP layer: request execution and status mapping.
//!
//! This is the ONLY place for status code handling. client/mod.rs never
//! interprets status codes.

use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::{TrustError, TrustResult};
use crate::types::{ApiResponse, Capability};

/// What a request is for; decides how non-2xx statuses are reported.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Endpoint<'a> {
    Login,
    DocumentState { document_id: &'a str },
    SubmitSignature { document_id: &'a str },
}

impl Endpoint<'_> {
    fn document_id(&self) -> Option<&str> {
        match self {
            Self::Login => None,
            Self::DocumentState { document_id } | Self::SubmitSignature { document_id } => {
                Some(*document_id)
            }
        }
    }
}

/// HTTP backend for making requests (holds reqwest client and base URL).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: Url,
}

impl HttpBackend {
    /// `{base_url}/{segments...}`, each segment percent-encoded.
    pub(crate) fn endpoint_url(&self, segments: &[&str]) -> TrustResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TrustError::Config {
                message: format!("API URL cannot be a base: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send one request and decode the `{success, message, data}` body.
    ///
    /// No retries; the caller decides whether a failure is worth repeating.
    pub(crate) async fn send<B, T>(
        &self,
        method: Method,
        url: Url,
        endpoint: Endpoint<'_>,
        token: Option<&str>,
        body: Option<&B>,
    ) -> TrustResult<ApiResponse<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(method = %method, url = %url, "backend request");

        let mut request = self.client.request(method, url);

        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        match (status.as_u16(), endpoint.document_id()) {
            (200..=299, _) => response.json().await.map_err(|e| {
                TrustError::transport(format!("invalid response body: {}", e))
            }),

            (401 | 403, _) if matches!(endpoint, Endpoint::Login) => {
                Err(TrustError::InvalidCredentials {
                    message: rejection_message(response)
                        .await
                        .unwrap_or_else(|| "invalid username or password".to_string()),
                })
            }

            (401, _) => Err(TrustError::unauthenticated("invalid or expired token")),

            (403, _) => Err(TrustError::Forbidden {
                capability: Capability::SignDocument,
            }),

            (404, Some(document_id)) => Err(TrustError::DocumentUnavailable {
                document_id: document_id.to_string(),
                message: "not found".to_string(),
            }),

            (409, Some(document_id)) => Err(TrustError::AlreadySigned {
                document_id: document_id.to_string(),
            }),

            _ => {
                let message = response.text().await.unwrap_or_else(|_| status.to_string());
                Err(TrustError::transport(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    message
                )))
            }
        }
    }
}

/// `message` from an error body, when there is one.
async fn rejection_message(response: reqwest::Response) -> Option<String> {
    let body: ApiResponse<serde_json::Value> = response.json().await.ok()?;
    body.message.filter(|m| !m.is_empty())
}
