//! reqwest-based [`Transport`] implementation.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::multipart;
use tokio::sync::mpsc;
use tracing::debug;

use stowage_protocol::{
    ErrorEnvelope, FileMetadata, TransportError, UploadFileMetadata, UploadResponse,
};

use crate::{Transport, TransportConfig, UploadRequest};

/// Header carrying the administrative secret.
const ADMIN_SECRET_HEADER: &str = "x-hasura-admin-secret";

/// Chunk size for the progress-counting request body.
const BODY_CHUNK_SIZE: usize = 64 * 1024;

/// HTTP transport speaking the storage service's multipart upload endpoint.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with a default client.
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Creates a transport on top of a preconfigured client (proxies,
    /// custom roots, external timeouts).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn upload_inner(
        &self,
        config: TransportConfig,
        request: UploadRequest,
    ) -> Result<FileMetadata, TransportError> {
        let url = format!("{}/files", config.endpoint.trim_end_matches('/'));

        let file_meta = UploadFileMetadata {
            id: request.file_id.clone(),
            name: request.name.clone(),
            metadata: None,
        };
        let file_meta = serde_json::to_string(&file_meta)
            .map_err(|e| TransportError::network(format!("encoding file metadata: {e}")))?;

        let content_len = request.content.len() as u64;
        let body = counting_body(request.content, request.progress);
        let mut part = multipart::Part::stream_with_length(body, content_len)
            .file_name(request.name.clone());
        if let Some(mime) = &request.mime_type {
            part = part
                .mime_str(mime)
                .map_err(|e| TransportError::network(format!("invalid MIME type: {e}")))?;
        }

        let mut form = multipart::Form::new();
        if let Some(bucket) = &request.bucket_id {
            form = form.text("bucket-id", bucket.clone());
        }
        form = form.text("metadata[]", file_meta).part("file[]", part);

        let mut req = self.http.post(&url).multipart(form);
        if let Some((name, value)) = auth_header(&config) {
            req = req.header(name, value);
        }

        debug!(url = %url, name = %request.name, bytes = content_len, "uploading file");

        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::network(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::network(format!("reading response body: {e}")))?;

        if (200..300).contains(&status) {
            let parsed: UploadResponse = serde_json::from_slice(&body).map_err(|e| {
                TransportError::status(status, format!("malformed upload response: {e}"))
            })?;
            parsed.into_record().ok_or_else(|| {
                TransportError::status(status, "upload response contained no file record")
            })
        } else {
            Err(error_from_response(status, &body))
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn upload(
        &self,
        config: TransportConfig,
        request: UploadRequest,
    ) -> Pin<Box<dyn Future<Output = Result<FileMetadata, TransportError>> + Send + '_>> {
        Box::pin(self.upload_inner(config, request))
    }
}

/// Picks the auth header: admin secret wins over the bearer token.
fn auth_header(config: &TransportConfig) -> Option<(&'static str, String)> {
    if let Some(secret) = &config.admin_secret {
        return Some((ADMIN_SECRET_HEADER, secret.clone()));
    }
    config
        .access_token
        .as_ref()
        .map(|token| ("authorization", format!("Bearer {token}")))
}

/// Wraps the payload in a chunked stream that reports the cumulative byte
/// count on `progress` as each chunk is pulled by the HTTP stack.
fn counting_body(content: Bytes, progress: Option<mpsc::UnboundedSender<u64>>) -> reqwest::Body {
    match progress {
        Some(tx) => reqwest::Body::wrap_stream(counting_stream(content, tx)),
        None => reqwest::Body::from(content),
    }
}

fn counting_stream(
    content: Bytes,
    tx: mpsc::UnboundedSender<u64>,
) -> impl futures_util::Stream<Item = Result<Bytes, std::convert::Infallible>> {
    let chunks: Vec<Bytes> = (0..content.len())
        .step_by(BODY_CHUNK_SIZE)
        .map(|start| content.slice(start..(start + BODY_CHUNK_SIZE).min(content.len())))
        .collect();

    futures_util::stream::iter(chunks).scan(0u64, move |sent, chunk| {
        *sent += chunk.len() as u64;
        let _ = tx.send(*sent);
        futures_util::future::ready(Some(Ok(chunk)))
    })
}

/// Maps a non-success response body to a [`TransportError`].
///
/// The service may answer with the structured error envelope or, on the
/// legacy single-file path, with a flat `{status, message, error}` record.
/// The response status line is authoritative either way.
fn error_from_response(status: u16, body: &[u8]) -> TransportError {
    if let Ok(flat) = serde_json::from_slice::<TransportError>(body) {
        return TransportError { status, ..flat };
    }

    if let Ok(env) = serde_json::from_slice::<ErrorEnvelope>(body) {
        if let Some(details) = env.error {
            return TransportError::status(status, details.message);
        }
    }

    let text = String::from_utf8_lossy(body);
    let message = if text.trim().is_empty() {
        format!("upload rejected with status {status}")
    } else {
        text.trim().to_string()
    };
    TransportError::status(status, message)
}
