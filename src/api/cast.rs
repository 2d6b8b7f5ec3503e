//! Cast backend API client
//!
//! Four endpoints, all under `/cast`: device registration, credential
//! polling, collection diff and file download. The last two are authorized
//! with the `X-Cast-Access-Token` header.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::EncryptedFileRecord;

/// Header carrying the cast token on collection requests
pub const ACCESS_TOKEN_HEADER: &str = "X-Cast-Access-Token";

/// Default production endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.ente.io";

/// Cast API error types
#[derive(Error, Debug)]
pub enum CastApiError {
    #[error("Resource not found (404)")]
    NotFound,

    #[error("Server error: {0}")]
    ServerError(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// One page of the collection diff
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffPage {
    pub diff: Vec<EncryptedFileRecord>,
    #[serde(default)]
    pub has_more: bool,
}

/// Backend operations the receiver depends on
#[async_trait]
pub trait CastBackend: Send + Sync {
    /// Register a public key (base64) and receive a pairing code
    async fn register_device(&self, public_key: &str) -> Result<String, CastApiError>;

    /// Fetch the sealed credential payload (base64) for a pairing code, if any
    async fn fetch_cast_data(&self, pairing_code: &str) -> Result<Option<String>, CastApiError>;

    /// Fetch one page of collection changes since `since_time`
    async fn fetch_diff(&self, cast_token: &str, since_time: i64) -> Result<DiffPage, CastApiError>;

    /// Download the encrypted content of a file
    async fn fetch_file(&self, cast_token: &str, file_id: u64) -> Result<Vec<u8>, CastApiError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationRequest<'a> {
    public_key: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationResponse {
    pairing_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CastDataResponse {
    #[serde(default)]
    encrypted_payload: Option<String>,
}

/// HTTP client for the cast endpoints
pub struct CastApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl CastApiClient {
    /// Create a client against the production endpoint
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing and self-hosting)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Map non-success statuses to typed errors
    fn check_status(status: StatusCode) -> Result<(), CastApiError> {
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(CastApiError::NotFound),
            s => Err(CastApiError::ServerError(s.as_u16())),
        }
    }

    fn parse<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, CastApiError> {
        serde_json::from_str(body)
            .map_err(|e| CastApiError::InvalidResponse(format!("JSON parse error: {}", e)))
    }
}

impl Default for CastApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CastBackend for CastApiClient {
    async fn register_device(&self, public_key: &str) -> Result<String, CastApiError> {
        let url = format!("{}/cast/device-registration", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&RegistrationRequest { public_key })
            .send()
            .await?;

        Self::check_status(response.status())?;
        let body = response.text().await?;
        let parsed: RegistrationResponse = Self::parse(&body)?;

        if parsed.pairing_code.is_empty() {
            return Err(CastApiError::InvalidResponse("empty pairing code".into()));
        }
        Ok(parsed.pairing_code)
    }

    async fn fetch_cast_data(&self, pairing_code: &str) -> Result<Option<String>, CastApiError> {
        let url = format!(
            "{}/cast/device-credentials?pairingCode={}",
            self.base_url,
            urlencoding::encode(pairing_code)
        );
        let response = self.client.get(&url).send().await?;

        // Nothing posted for this code yet
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::check_status(response.status())?;

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        let parsed: CastDataResponse = Self::parse(&body)?;
        Ok(parsed.encrypted_payload.filter(|p| !p.is_empty()))
    }

    async fn fetch_diff(&self, cast_token: &str, since_time: i64) -> Result<DiffPage, CastApiError> {
        let url = format!("{}/cast/diff?sinceTime={}", self.base_url, since_time);
        let response = self
            .client
            .get(&url)
            .header(ACCESS_TOKEN_HEADER, cast_token)
            .header("Accept", "application/json")
            .send()
            .await?;

        Self::check_status(response.status())?;
        let body = response.text().await?;
        Self::parse(&body)
    }

    async fn fetch_file(&self, cast_token: &str, file_id: u64) -> Result<Vec<u8>, CastApiError> {
        let url = format!("{}/cast/files/{}", self.base_url, file_id);
        let response = self
            .client
            .get(&url)
            .header(ACCESS_TOKEN_HEADER, cast_token)
            .send()
            .await?;

        Self::check_status(response.status())?;
        Ok(response.bytes().await?.to_vec())
    }
}
