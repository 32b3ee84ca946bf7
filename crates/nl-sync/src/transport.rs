//! Request/response transport to the sync server.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use nl_core::EventRecord;
use nl_core::wire::{Health, PairRequest, PairResponse, PullResponse, PushResponse};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Default request timeout for server calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The provided bearer token was invalid.
    #[error("invalid token: {reason}")]
    InvalidToken { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },
    /// The response body was not the expected JSON.
    #[error("invalid response: {0}")]
    Decode(String),
}

/// The two sync round-trips.
///
/// Implementations must be safe to call from spawned tasks.
pub trait Transport: Send + Sync {
    /// Sends locally changed records and returns the server's verdict on each.
    fn push(
        &self,
        records: &[EventRecord],
    ) -> impl Future<Output = Result<PushResponse, TransportError>> + Send;

    /// Fetches every record the server changed after `since`.
    fn pull(&self, since: i64)
    -> impl Future<Output = Result<PullResponse, TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn push(
        &self,
        records: &[EventRecord],
    ) -> impl Future<Output = Result<PushResponse, TransportError>> + Send {
        (**self).push(records)
    }

    fn pull(&self, since: i64) -> impl Future<Output = Result<PullResponse, TransportError>> + Send {
        (**self).pull(since)
    }
}

/// HTTP transport.
///
/// # Thread Safety
///
/// The transport is safe to clone and share across tasks. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Creates a transport for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or whitespace-only, or if the
    /// HTTP client fails to build.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        if let Some(token) = &token {
            if token.trim().is_empty() {
                return Err(TransportError::InvalidToken {
                    reason: "token cannot be empty",
                });
            }
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::ClientBuild)?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchanges a one-time pairing code for a device id and bearer token.
    pub async fn pair(&self, request: &PairRequest) -> Result<PairResponse, TransportError> {
        let response = self
            .http
            .post(self.url("/pair"))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    /// Checks that the server is reachable.
    pub async fn healthz(&self) -> Result<Health, TransportError> {
        let response = self.http.get(self.url("/healthz")).send().await?;
        decode(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl Transport for HttpTransport {
    async fn push(&self, records: &[EventRecord]) -> Result<PushResponse, TransportError> {
        let request = self.http.post(self.url("/sync/push")).json(records);
        let response = self.authorized(request).send().await?;
        decode(response).await
    }

    async fn pull(&self, since: i64) -> Result<PullResponse, TransportError> {
        let request = self.http.get(self.url(&format!("/sync/pull?since={since}")));
        let response = self.authorized(request).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TransportError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(parse_api_error(status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|err| TransportError::Decode(err.to_string()))
}

/// Servers answer errors with `{"detail": "..."}`; anything else is kept verbatim.
fn parse_api_error(status: u16, body: &str) -> TransportError {
    #[derive(serde::Deserialize)]
    struct ErrorPayload {
        detail: String,
    }

    let message = serde_json::from_str::<ErrorPayload>(body)
        .map_or_else(|_| body.trim().to_string(), |payload| payload.detail);
    TransportError::Api { status, message }
}
