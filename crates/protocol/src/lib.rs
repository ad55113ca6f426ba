//! Wire types for the storage upload API.
//!
//! Shared between the transport layer and the upload orchestrator. The
//! storage service speaks camelCase JSON; the multipart request fields
//! (`bucket-id`, `metadata[]`, `file[]`) are defined by the upload endpoint.

mod error;
mod types;

pub use error::TransportError;
pub use types::{
    ErrorDetails, ErrorEnvelope, FileMetadata, ProcessedFiles, UploadFileMetadata, UploadResponse,
};
