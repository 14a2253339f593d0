//! Retrying HTTP client for the service desk.

use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::{Method, Response, header};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::body::{decode_body, filename_from_disposition};
use crate::{DownloadedFile, RequestBody, Result, RetryPolicy, ServiceDeskError};

/// Header carrying the per-call key, identical across the attempts of one call.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Connection settings for the service desk.
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Bound on a single attempt.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
        }
    }
}

/// HTTP client that retries transient service desk failures.
///
/// Transport errors, 5xx and 429 are retried with exponential backoff; any
/// other 4xx and undecodable success bodies are returned immediately. The
/// wait between attempts races the caller's [`CancellationToken`].
#[derive(Clone)]
pub struct ResilientClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl ResilientClient {
    /// Creates a client with its own connection pool.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceDeskError::InvalidRequest(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sends a request and decodes the JSON response.
    ///
    /// Objects are returned as-is; arrays are wrapped as `{"data": [...]}`.
    #[tracing::instrument(skip(self, params, body, cancel))]
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: RequestBody,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let idempotency_key = Uuid::new_v4().to_string();
        let (method, body, key) = (&method, &body, idempotency_key.as_str());
        self.with_retry(path, cancel, || async move {
            let response = self.send(method, path, params, body, key).await?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ServiceDeskError::Transport(e.to_string()))?;
            decode_body(&bytes)
        })
        .await
    }

    /// Sends a GET request and returns the raw response body.
    #[tracing::instrument(skip(self, params, cancel))]
    pub async fn execute_bytes(
        &self,
        path: &str,
        params: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<DownloadedFile> {
        let idempotency_key = Uuid::new_v4().to_string();
        let key = idempotency_key.as_str();
        self.with_retry(path, cancel, || async move {
            let response = self
                .send(&Method::GET, path, params, &RequestBody::Empty, key)
                .await?;

            let headers = response.headers();
            let content_type = headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let filename = headers
                .get(header::CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok())
                .and_then(filename_from_disposition);

            let bytes = response
                .bytes()
                .await
                .map_err(|e| ServiceDeskError::Transport(e.to_string()))?;

            Ok(DownloadedFile {
                bytes: bytes.to_vec(),
                filename,
                content_type,
            })
        })
        .await
    }

    async fn with_retry<T, F, Fut>(
        &self,
        path: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            return Err(ServiceDeskError::Cancelled);
        }

        let policy = &self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            metrics::counter!("service_desk_requests_total", "path" => path.to_string())
                .increment(1);

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ServiceDeskError::Cancelled),
                result = operation() => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            if attempt >= policy.max_attempts {
                tracing::warn!(path, attempts = attempt, error = %err, "service desk retries exhausted");
                return Err(ServiceDeskError::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = policy.delay_after(attempt);
            tracing::warn!(
                path,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "service desk request failed, retrying"
            );
            metrics::counter!("service_desk_retries_total", "path" => path.to_string())
                .increment(1);

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ServiceDeskError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn send(
        &self,
        method: &Method,
        path: &str,
        params: &[(&str, String)],
        body: &RequestBody,
        idempotency_key: &str,
    ) -> Result<Response> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let mut request = self
            .http
            .request(method.clone(), url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header(header::ACCEPT, "application/json")
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key);
        if !params.is_empty() {
            request = request.query(params);
        }
        request = match body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(value),
            RequestBody::Multipart(multipart) => request.multipart(multipart.to_form()?),
        };

        let start = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| ServiceDeskError::Transport(e.to_string()))?;
        metrics::histogram!("service_desk_request_duration_seconds", "path" => path.to_string())
            .record(start.elapsed().as_secs_f64());

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(path, status = status.as_u16(), "service desk returned error status");
        Err(ServiceDeskError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
