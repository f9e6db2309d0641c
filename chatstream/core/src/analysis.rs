//! Document Analysis
//!
//! One-shot upload of an image document (e.g. a scanned report) for analysis.
//! No streaming and no incremental state: the file goes up as multipart form
//! data and a single JSON result comes back.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{join_url, HttpBackend, TransportError};
use crate::config::ClientConfig;

/// Errors from an analysis request
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Only image files are accepted
    #[error("Unsupported file type {mime}; please select an image file")]
    UnsupportedType {
        /// Detected MIME type
        mime: String,
    },

    /// The file could not be read
    #[error("Failed to read {path}: {source}")]
    ReadFile {
        /// File that was attempted
        path: String,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Request failed or the server returned an error status
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Response body was not a valid analysis result
    #[error("Invalid analysis response: {0}")]
    Decode(String),
}

/// Server's assessment of a document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    /// Free-text analysis
    pub analysis: String,
    /// Conditions identified in the document
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Suggested next steps
    #[serde(default)]
    pub recommendations: String,
}

/// A file ready to upload
#[derive(Clone, Debug)]
pub struct DocumentUpload {
    /// File name sent with the form field
    pub file_name: String,
    /// MIME type, must be `image/*`
    pub mime_type: String,
    /// File contents
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    /// Build an upload from in-memory bytes
    ///
    /// # Errors
    ///
    /// [`AnalysisError::UnsupportedType`] unless `mime_type` is `image/*`.
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, AnalysisError> {
        let mime_type = mime_type.into();
        if !mime_type.starts_with("image/") {
            return Err(AnalysisError::UnsupportedType { mime: mime_type });
        }
        Ok(Self {
            file_name: file_name.into(),
            mime_type,
            bytes,
        })
    }

    /// Read a file, inferring its MIME type from the extension
    ///
    /// # Errors
    ///
    /// Fails if the type is not an image or the file cannot be read.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let mime_type = mime_from_extension(path);
        if !mime_type.starts_with("image/") {
            return Err(AnalysisError::UnsupportedType {
                mime: mime_type.to_string(),
            });
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AnalysisError::ReadFile {
                path: path.display().to_string(),
                source: e,
            })?;
        let file_name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());

        Self::new(file_name, mime_type, bytes)
    }
}

/// Guess a MIME type from a file extension
#[must_use]
pub fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Client for the document analysis endpoint
#[derive(Clone, Debug)]
pub struct AnalysisClient {
    url: String,
    http_client: reqwest::Client,
}

impl AnalysisClient {
    /// Share the HTTP client of a chat backend
    #[must_use]
    pub fn new(backend: &HttpBackend, analysis_path: &str) -> Self {
        Self {
            url: join_url(backend.base_url(), analysis_path),
            http_client: backend.http_client().clone(),
        }
    }

    /// Build from the loaded client configuration
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let backend = HttpBackend::from_config(config)?;
        Ok(Self::new(&backend, &config.analysis_path))
    }

    /// Endpoint URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Upload a document and wait for the analysis
    ///
    /// # Errors
    ///
    /// Transport failures, non-success statuses and undecodable bodies.
    pub async fn analyze(&self, upload: DocumentUpload) -> Result<DocumentAnalysis, AnalysisError> {
        tracing::debug!(
            url = %self.url,
            file = %upload.file_name,
            bytes = upload.bytes.len(),
            "Uploading document for analysis"
        );

        let part = reqwest::multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.mime_type)
            .map_err(|e| AnalysisError::UnsupportedType {
                mime: format!("{} ({e})", upload.mime_type),
            })?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http_client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Connect {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body }.into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Read(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| AnalysisError::Decode(e.to_string()))
    }
}
