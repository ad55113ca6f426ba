use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for one stored file, as returned by the storage service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub bucket_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_uploaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Per-file fields sent alongside the binary payload in the `metadata[]`
/// multipart field. Order must match the `file[]` parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadFileMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Success envelope returned by the multi-file upload endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedFiles {
    pub processed_files: Vec<FileMetadata>,
}

/// The two success shapes the upload endpoint may return: a bare record
/// (single-file path) or a list envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum UploadResponse {
    Envelope(ProcessedFiles),
    Single(Box<FileMetadata>),
}

impl UploadResponse {
    /// Normalizes the response to one record for the requesting unit.
    ///
    /// Returns `None` when the envelope contains no records.
    pub fn into_record(self) -> Option<FileMetadata> {
        match self {
            UploadResponse::Single(meta) => Some(*meta),
            UploadResponse::Envelope(env) => env.processed_files.into_iter().next(),
        }
    }
}

/// Error details inside an error response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Error body returned by the storage service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_metadata_camel_case_round_trip() {
        let json = r#"{
            "id": "d5e76ceb-77a2-4153-b7da-1f7c115b2ff2",
            "name": "profile-picture.jpg",
            "size": 245678,
            "bucketId": "users-bucket",
            "etag": "\"a1b2c3d4e5f6\"",
            "createdAt": "2023-01-15T12:34:56Z",
            "updatedAt": "2023-01-16T09:45:32Z",
            "isUploaded": true,
            "mimeType": "image/jpeg"
        }"#;

        let meta: FileMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.bucket_id, "users-bucket");
        assert_eq!(meta.size, 245678);
        assert!(meta.is_uploaded);
        assert!(meta.uploaded_by_user_id.is_none());

        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["bucketId"], "users-bucket");
        assert_eq!(back["mimeType"], "image/jpeg");
    }

    #[test]
    fn file_metadata_minimal_fields() {
        let json = r#"{"id":"f1","name":"a.txt","size":13,"bucketId":"default"}"#;
        let meta: FileMetadata = serde_json::from_str(json).unwrap();
        assert!(!meta.is_uploaded);
        assert!(meta.etag.is_none());
        assert!(meta.created_at.is_none());
    }

    #[test]
    fn upload_response_envelope_shape() {
        let json = r#"{"processedFiles":[
            {"id":"f1","name":"a.txt","size":13,"bucketId":"default","isUploaded":true},
            {"id":"f2","name":"b.txt","size":12,"bucketId":"default","isUploaded":true}
        ]}"#;

        let resp: UploadResponse = serde_json::from_str(json).unwrap();
        let record = resp.into_record().unwrap();
        assert_eq!(record.id, "f1");
    }

    #[test]
    fn upload_response_single_shape() {
        let json = r#"{"id":"f9","name":"c.bin","size":1024,"bucketId":"media"}"#;
        let resp: UploadResponse = serde_json::from_str(json).unwrap();
        let record = resp.into_record().unwrap();
        assert_eq!(record.id, "f9");
        assert_eq!(record.bucket_id, "media");
    }

    #[test]
    fn upload_response_empty_envelope() {
        let json = r#"{"processedFiles":[]}"#;
        let resp: UploadResponse = serde_json::from_str(json).unwrap();
        assert!(resp.into_record().is_none());
    }

    #[test]
    fn upload_file_metadata_skips_absent_fields() {
        let meta = UploadFileMetadata {
            id: None,
            name: "a.txt".into(),
            metadata: None,
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"name":"a.txt"}"#);
    }

    #[test]
    fn error_envelope_parses() {
        let json = r#"{"error":{"message":"File not found"}}"#;
        let env: ErrorEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.error.unwrap().message, "File not found");
    }
}
