use crate::session::SessionToken;
use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use trailstop_core::{Result, TradingError};

type DirectLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// Rate-limited, authenticated JSON client for the broker REST API.
///
/// Each call is a single attempt. Failures are classified into the
/// `TradingError` taxonomy and left to the caller's schedule.
#[derive(Clone)]
pub struct BrokerClient {
    http: Client,
    base_url: String,
    rate_limiter: Arc<DirectLimiter>,
    session: SessionToken,
}

impl std::fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerClient")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl BrokerClient {
    /// # Errors
    /// Returns `TransientNetwork` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        requests_per_second: u32,
        timeout: Duration,
        session: SessionToken,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TradingError::TransientNetwork(format!("failed to build HTTP client: {e}")))?;

        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
            session,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub const fn session(&self) -> &SessionToken {
        &self.session
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self.send(Method::GET, path, |req| req.query(query)).await?;
        Self::check_status(response).await?.json::<T>().await.map_err(map_transport)
    }

    /// GET that maps `404 Not Found` to `None`.
    pub async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self.send(Method::GET, path, |req| req).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = Self::check_status(response).await?;
        body.json::<Option<T>>().await.map_err(map_transport)
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<T> {
        let response = self.send(Method::POST, path, |req| req.json(body)).await?;
        Self::check_status(response).await?.json::<T>().await.map_err(map_transport)
    }

    /// PUT whose response body is ignored.
    pub async fn put<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<()> {
        let response = self.send(Method::PUT, path, |req| req.json(body)).await?;
        Self::check_status(response).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self.send(Method::DELETE, path, |req| req).await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response> {
        let bearer = self.session.bearer().ok_or_else(|| {
            TradingError::AuthenticationExpired("no broker session token".to_string())
        })?;

        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%method, %url, "broker request");

        let request = self
            .http
            .request(method, &url)
            .header("Accept", "application/json")
            .header("Authorization", bearer);

        build(request).send().await.map_err(map_transport)
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(map_status(status, text))
    }
}

fn map_transport(err: reqwest::Error) -> TradingError {
    if err.is_decode() {
        TradingError::InvalidResponse(err.to_string())
    } else {
        TradingError::TransientNetwork(err.to_string())
    }
}

/// 401/403 need a new session, other 4xx are refusals, everything else is
/// retried on the next tick.
pub(crate) fn map_status(status: StatusCode, body: String) -> TradingError {
    let detail = format!("HTTP {}: {body}", status.as_u16());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TradingError::AuthenticationExpired(detail),
        StatusCode::TOO_MANY_REQUESTS => TradingError::TransientNetwork(detail),
        s if s.is_client_error() => TradingError::Rejected(detail),
        _ => TradingError::TransientNetwork(detail),
    }
}

/// Rejects path segments that could escape the endpoint.
pub(crate) fn validate_identifier(id: &str) -> Result<&str> {
    if id.is_empty() || id.len() > 128 {
        return Err(TradingError::Rejected(format!(
            "invalid identifier length: {}",
            id.len()
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        || id.contains("..")
    {
        return Err(TradingError::Rejected(format!("invalid identifier: {id}")));
    }
    Ok(id)
}
