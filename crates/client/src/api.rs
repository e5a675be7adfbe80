//! REST client for the Gamma API.
//!
//! Wraps every request/response endpoint the client consumes (uploads,
//! assets, playlists, auth) using [`reqwest`]. Login sets an HTTP-only
//! session cookie; the client keeps it in its cookie store so every later
//! request carries it.

use std::time::Duration;

use bytes::Bytes;
use gamma_core::models::CreateUploadRequest;
use gamma_core::{AssetRecord, Credentials, PlaybackUrl, UploadRecord, UploadTicket};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};

use crate::progress::{progress_body, ProgressFn};

/// Default timeout for JSON request/response calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP connect timeout, applied to every request including transfers.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for one Gamma API deployment.
pub struct GammaApi {
    client: reqwest::Client,
    api_url: String,
    request_timeout: Duration,
}

/// Errors from the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, decoding, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("Gamma API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ApiError {
    /// HTTP status of a server-side rejection, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::ApiError { status, .. } => Some(*status),
            ApiError::Request(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

impl GammaApi {
    /// Create a client with its own connection pool and cookie store.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:8080`.
    pub fn new(api_url: impl Into<String>, request_timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, api_url, request_timeout))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    ///
    /// The given client must have a cookie store enabled for the session
    /// cookie to survive between calls.
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_url,
            request_timeout,
        }
    }

    /// Base HTTP URL this client talks to.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// `GET /uploads`
    ///
    /// The server encodes an empty list as `null`.
    pub async fn list_uploads(&self) -> Result<Vec<UploadRecord>, ApiError> {
        let response = self
            .client
            .get(format!("{}/uploads", self.api_url))
            .timeout(self.request_timeout)
            .send()
            .await?;

        let uploads: Option<Vec<UploadRecord>> = Self::parse_response(response).await?;
        Ok(uploads.unwrap_or_default())
    }

    /// `GET /uploads/{id}`
    pub async fn get_upload(&self, upload_id: &str) -> Result<UploadRecord, ApiError> {
        let response = self
            .client
            .get(format!("{}/uploads/{}", self.api_url, upload_id))
            .timeout(self.request_timeout)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Open an upload session (`POST /uploads`).
    ///
    /// The server records a `pending` upload and hands back a presigned
    /// target for the byte transfer.
    pub async fn create_upload(&self, filename: &str) -> Result<UploadTicket, ApiError> {
        let response = self
            .client
            .post(format!("{}/uploads", self.api_url))
            .timeout(self.request_timeout)
            .json(&CreateUploadRequest { filename })
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `PUT` the whole payload to a presigned target.
    ///
    /// The body is streamed in chunks and `on_progress` is called with the
    /// cumulative byte count as each chunk is handed to the connection. No
    /// request timeout applies; large files take as long as they take.
    pub async fn transfer(
        &self,
        upload_target: &str,
        body: Bytes,
        content_type: &str,
        on_progress: ProgressFn,
    ) -> Result<(), ApiError> {
        let total = body.len() as u64;
        let response = self
            .client
            .put(upload_target)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, total)
            .body(progress_body(body, on_progress))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// `GET /assets/{id}`
    pub async fn get_asset(&self, asset_id: &str) -> Result<AssetRecord, ApiError> {
        let response = self
            .client
            .get(format!("{}/assets/{}", self.api_url, asset_id))
            .timeout(self.request_timeout)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Short-lived manifest entry point (`GET /assets/{id}/playlist`).
    pub async fn get_asset_playlist(&self, asset_id: &str) -> Result<PlaybackUrl, ApiError> {
        let response = self
            .client
            .get(format!("{}/assets/{}/playlist", self.api_url, asset_id))
            .timeout(self.request_timeout)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `POST /auth/login`. Returns the server's plain-text acknowledgement.
    pub async fn login(&self, credentials: &Credentials) -> Result<String, ApiError> {
        let response = self
            .client
            .post(format!("{}/auth/login", self.api_url))
            .timeout(self.request_timeout)
            .json(credentials)
            .send()
            .await?;

        Self::parse_text(response).await
    }

    /// `POST /auth/logout`. Returns the server's plain-text acknowledgement.
    pub async fn logout(&self) -> Result<String, ApiError> {
        let response = self
            .client
            .post(format!("{}/auth/logout", self.api_url))
            .timeout(self.request_timeout)
            .send()
            .await?;

        Self::parse_text(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Read a successful plain-text response body.
    async fn parse_text(response: reqwest::Response) -> Result<String, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.text().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
