//! Transport layer for the storage upload endpoint.
//!
//! [`Transport`] is the seam between the upload orchestrator and the wire:
//! one call per file per upload command, cumulative progress reporting, and
//! a normalized success/error outcome. [`HttpTransport`] is the production
//! implementation; tests mock the trait instead.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use tokio::sync::mpsc;

use stowage_protocol::{FileMetadata, TransportError};

mod http;

pub use http::HttpTransport;

/// Where and how to reach the storage service.
///
/// When both credentials are configured, the administrative secret takes
/// precedence over the bearer token.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Base URL of the storage API, e.g. `https://storage.example.com/v1`.
    pub endpoint: String,
    /// Bearer token for the `Authorization` header.
    pub access_token: Option<String>,
    /// Administrative secret header value.
    pub admin_secret: Option<String>,
}

impl TransportConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_token: None,
            admin_secret: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_admin_secret(mut self, secret: impl Into<String>) -> Self {
        self.admin_secret = Some(secret.into());
        self
    }
}

/// One file upload call.
pub struct UploadRequest {
    /// Target bucket, omitted to use the service default.
    pub bucket_id: Option<String>,
    /// Preset file identifier, omitted to let the service assign one.
    pub file_id: Option<String>,
    /// File name including extension.
    pub name: String,
    /// MIME type of the payload, omitted to let the service sniff it.
    pub mime_type: Option<String>,
    /// File contents.
    pub content: Bytes,
    /// Receives cumulative bytes handed to the wire, non-decreasing.
    ///
    /// Implementations that cannot observe incremental progress may report
    /// nothing at all; callers treat completion as 100% regardless.
    pub progress: Option<mpsc::UnboundedSender<u64>>,
}

/// Uploads one file per call and reports incremental byte progress.
///
/// Exactly one outstanding call per unit per upload command. There is no
/// built-in retry or resumption: a failed upload is re-driven by a fresh
/// command from the orchestrator. Using a trait keeps the orchestrator
/// decoupled from HTTP and testable with mocks.
pub trait Transport: Send + Sync + 'static {
    fn upload(
        &self,
        config: TransportConfig,
        request: UploadRequest,
    ) -> Pin<Box<dyn Future<Output = Result<FileMetadata, TransportError>> + Send + '_>>;
}
