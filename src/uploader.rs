//! Report upload port and the default HTTP adapter.
//!
//! Upload is a best-effort side effect: a failed or absent upload shows as
//! "unavailable" in the failure message and never fails the build on its
//! own.

use thiserror::Error;

/// Error type for upload failures.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upload rejected with status {0}")]
    Status(u16),
}

/// Side-effect port: ship the pretty JSON somewhere, maybe get a URL back.
pub trait ReportUploader: Send + Sync {
    fn upload(&self, pretty_json: &str) -> Result<Option<String>, UploadError>;
}

/// POSTs the report to a paste service that answers with the paste URL.
pub struct PasteUploader {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl PasteUploader {
    pub const DEFAULT_ENDPOINT: &'static str = "https://paste.rs";

    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Default for PasteUploader {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ENDPOINT)
    }
}

impl ReportUploader for PasteUploader {
    fn upload(&self, pretty_json: &str) -> Result<Option<String>, UploadError> {
        let response = self
            .client
            .post(&self.endpoint)
            .body(pretty_json.to_string())
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status(status.as_u16()));
        }
        let url = response.text()?.trim().to_string();
        Ok((!url.is_empty()).then_some(url))
    }
}
