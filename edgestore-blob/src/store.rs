use async_trait::async_trait;
use edgestore_core::PathValue;

use crate::{BlobResult, ByteStream, ObjectMetadata, PutOptions, UploadId};

/// Core blob storage operations - must be implemented by all storage backends
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a blob from a stream
    async fn put(&self, key: &str, options: PutOptions, stream: ByteStream) -> BlobResult<PutResult>;

    /// Get blob metadata without content
    async fn head(&self, key: &str) -> BlobResult<ObjectHead>;

    /// Replace the user metadata of an existing blob
    async fn set_metadata(&self, key: &str, metadata: ObjectMetadata) -> BlobResult<()>;

    /// Delete a blob
    async fn delete(&self, key: &str) -> BlobResult<()>;
}

/// Optional multipart upload support
#[async_trait]
pub trait MultipartBlobStore: BlobStore {
    /// Initialize a multipart upload that must add up to `plan` before it completes
    async fn init_multipart(
        &self,
        key: &str,
        options: PutOptions,
        plan: MultipartPlan,
    ) -> BlobResult<UploadId>;

    /// Upload a part
    async fn put_part(
        &self,
        upload_id: &UploadId,
        part_number: u32,
        stream: ByteStream,
    ) -> BlobResult<PartETag>;

    /// Complete multipart upload. Fails without creating the object unless every
    /// planned part is listed, matches its ETag, and the total size is the declared one.
    async fn complete_multipart(
        &self,
        upload_id: &UploadId,
        key: &str,
        parts: Vec<PartETag>,
    ) -> BlobResult<PutResult>;

    /// Abort multipart upload
    async fn abort_multipart(&self, upload_id: &UploadId) -> BlobResult<()>;
}

/// Optional signed URL support
#[async_trait]
pub trait SignedUrlBlobStore: BlobStore {
    /// Generate a signed URL for writing a whole object
    async fn sign_put(&self, key: &str, options: PutOptions, expires_in_secs: u64) -> BlobResult<String>;

    /// Generate a signed URL for writing one part of a multipart upload
    async fn sign_part(
        &self,
        key: &str,
        upload_id: &UploadId,
        part_number: u32,
        expires_in_secs: u64,
    ) -> BlobResult<String>;
}

/// Result of a successful put operation
#[derive(Debug, Clone)]
pub struct PutResult {
    pub etag: Option<String>,
    pub size_bytes: u64,
}

/// Metadata about a blob
#[derive(Debug, Clone)]
pub struct ObjectHead {
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<i64>,
    pub metadata: ObjectMetadata,
}

/// ETag for a multipart part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartETag {
    pub part_number: u32,
    pub etag: String,
}

/// Shape of a multipart upload, fixed when the session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultipartPlan {
    pub total_parts: u32,
    pub size_bytes: u64,
}

/// Strategy for generating object keys
pub trait BlobKeyStrategy: Send + Sync {
    /// Key of a new object
    fn object_key(&self, bucket: &str, is_public: bool, path: &[PathValue], file_name: &str) -> String;

    /// Bucket name encoded in a key, if the key came from this strategy
    fn bucket_of<'a>(&self, key: &'a str) -> Option<&'a str>;
}

/// Default key strategy: `bucket/[_public/]segment.../file`
#[derive(Debug, Clone, Default)]
pub struct DefaultKeyStrategy;

pub const PUBLIC_MARKER: &str = "_public";

impl BlobKeyStrategy for DefaultKeyStrategy {
    fn object_key(&self, bucket: &str, is_public: bool, path: &[PathValue], file_name: &str) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(path.len() + 3);
        parts.push(sanitize(bucket));
        if is_public {
            parts.push(PUBLIC_MARKER.to_string());
        }
        parts.extend(path.iter().map(|p| sanitize(&p.value)));
        parts.push(sanitize(file_name));
        parts.join("/")
    }

    fn bucket_of<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.split('/').next().filter(|b| !b.is_empty())
    }
}

// Segments must not introduce extra path levels.
fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | '?' | '#' | '%' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
