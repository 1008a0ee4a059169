//! Wire types shared by the pipeline, the HTTP shim and the client.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata attached to a stored file.
pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BucketType {
    Image,
    File,
}

/// One resolved path segment (`owner` → `"u-1"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathValue {
    pub key: String,
    pub value: String,
}

impl PathValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// What the client claims about the file it wants to upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub extension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_target_url: Option<String>,
    #[serde(default)]
    pub temporary: bool,
}

/// Authoritative file record as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub url: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub path: Vec<PathValue>,
    pub metadata: Metadata,
}

// ---- /init ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub base_url: String,
}

// ---- /request-upload ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestUploadBody {
    pub bucket_name: String,
    #[serde(default)]
    pub input: Value,
    pub file_info: FileInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUrl {
    pub part_number: u32,
    pub upload_url: String,
}

/// Provider state for a multipart transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartHandle {
    pub upload_id: String,
    pub key: String,
    pub part_size: u64,
    pub total_parts: u32,
    pub parts: Vec<PartUrl>,
}

/// Single signed PUT or a multipart handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadTarget {
    Single {
        #[serde(rename = "uploadUrl")]
        upload_url: String,
    },
    Multipart {
        multipart: MultipartHandle,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestUploadResult {
    #[serde(flatten)]
    pub target: UploadTarget,
    pub access_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub path: Vec<PathValue>,
    pub metadata: Metadata,
}

// ---- /request-upload-parts ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartsRequest {
    pub upload_id: String,
    pub parts: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestUploadPartsBody {
    pub multipart: PartsRequest,
    /// Object key of the multipart upload.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedParts {
    pub upload_id: String,
    pub parts: Vec<PartUrl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestUploadPartsResult {
    pub multipart: SignedParts,
}

// ---- /complete-multipart-upload ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    pub part_number: u32,
    #[serde(rename = "eTag")]
    pub e_tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMultipartUploadBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
    pub upload_id: String,
    pub key: String,
    pub parts: Vec<CompletedPart>,
}

// ---- /confirm-upload + /delete-file ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmUploadBody {
    pub bucket_name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFileBody {
    pub bucket_name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResult {
    pub success: bool,
}
