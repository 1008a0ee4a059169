//! The storage provider seam.
//!
//! The pipeline authorizes and shapes every request, then hands a fully
//! resolved description to a [`Provider`]. Providers own everything that
//! touches the object store: URL signing, multipart bookkeeping, lookups and
//! deletes.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::types::{
    BucketType, CompletedPart, FileInfo, FileRecord, Metadata, PartsRequest, PathValue,
    RequestUploadPartsResult, SuccessResult, UploadTarget,
};

#[derive(Debug, Clone)]
pub struct ProviderInitParams {
    pub ctx: Value,
    /// Output of `EdgeStoreRouter::to_json`.
    pub router: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderInitResult {
    pub token: Option<String>,
}

/// A fully authorized upload request.
#[derive(Debug, Clone)]
pub struct RequestUploadParams {
    pub bucket_name: String,
    pub bucket_type: BucketType,
    pub is_public: bool,
    pub path: Vec<PathValue>,
    pub metadata: Metadata,
    pub file_info: FileInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderUploadResult {
    pub target: UploadTarget,
    pub access_url: String,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RequestUploadPartsParams {
    pub multipart: PartsRequest,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct CompleteMultipartUploadParams {
    pub bucket_name: Option<String>,
    pub upload_id: String,
    pub key: String,
    pub parts: Vec<CompletedPart>,
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Called once per `/init`; may mint a provider session token.
    async fn init(&self, params: ProviderInitParams) -> Result<ProviderInitResult>;

    /// Prefix of every access URL this provider hands out.
    fn base_url(&self) -> String;

    async fn get_file(&self, url: &str) -> Result<FileRecord>;

    /// Decide single PUT vs multipart and sign the URL(s).
    async fn request_upload(&self, params: RequestUploadParams) -> Result<ProviderUploadResult>;

    async fn request_upload_parts(
        &self,
        params: RequestUploadPartsParams,
    ) -> Result<RequestUploadPartsResult>;

    /// Assemble the object. On failure the object must not become visible.
    async fn complete_multipart_upload(&self, params: CompleteMultipartUploadParams) -> Result<()>;

    /// Clear the temporary flag of an upload.
    async fn confirm_upload(&self, url: &str) -> Result<SuccessResult>;

    async fn delete_file(&self, url: &str) -> Result<SuccessResult>;
}
