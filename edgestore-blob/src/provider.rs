//! [`Provider`] implementation over a signing, multipart-capable blob store.
//!
//! Everything the pipeline resolved (path, metadata, visibility, temporary
//! flag) is written into the object's metadata when the URL is signed, so
//! `get_file` can later answer from the store alone.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use edgestore_core::{
    CompleteMultipartUploadParams, FileRecord, Metadata, MultipartHandle, PartUrl, PathValue,
    Provider, ProviderInitParams, ProviderInitResult, ProviderUploadResult, RequestUploadParams,
    RequestUploadPartsParams, RequestUploadPartsResult, SignedParts, SuccessResult, UploadTarget,
};
use uuid::Uuid;

use crate::store::{
    BlobKeyStrategy, DefaultKeyStrategy, MultipartBlobStore, MultipartPlan, PartETag,
    SignedUrlBlobStore,
};
use crate::{BlobError, BlobProviderConfig, BlobResult, ObjectMetadata, PutOptions, UploadId};

const META_PATH: &str = "edgestore-path";
const META_TEMPORARY: &str = "edgestore-temporary";
const META_USER_PREFIX: &str = "meta-";

pub struct BlobProvider<S> {
    store: Arc<S>,
    keys: Arc<dyn BlobKeyStrategy>,
    config: BlobProviderConfig,
}

impl<S> Clone for BlobProvider<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            keys: Arc::clone(&self.keys),
            config: self.config.clone(),
        }
    }
}

impl<S> BlobProvider<S>
where
    S: SignedUrlBlobStore + MultipartBlobStore + 'static,
{
    pub fn new(store: Arc<S>, config: BlobProviderConfig) -> Self {
        Self {
            store,
            keys: Arc::new(DefaultKeyStrategy),
            config,
        }
    }

    pub fn with_key_strategy<K: BlobKeyStrategy + 'static>(mut self, keys: K) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &BlobProviderConfig {
        &self.config
    }

    pub fn access_url(&self, key: &str) -> String {
        format!("{}/{}", self.config.base_url, key)
    }

    /// Object key behind an access URL handed out by this provider.
    pub fn key_from_url<'a>(&self, url: &'a str) -> BlobResult<&'a str> {
        let url = url.split(['?', '#']).next().unwrap_or(url);
        url.strip_prefix(self.config.base_url.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .ok_or_else(|| BlobError::invalid(format!("URL is not served by this provider: {url}")))
    }

    /// Drop a multipart upload and every part received so far.
    pub async fn abort_multipart_upload(&self, upload_id: &str) -> Result<()> {
        self.store
            .abort_multipart(&UploadId::from_string(upload_id.to_string()))
            .await
            .map_err(BlobError::into_anyhow)?;
        tracing::info!(upload_id, "multipart upload aborted");
        Ok(())
    }

    fn ttl_secs(&self) -> u64 {
        self.config.signed_url_ttl.as_secs()
    }

    fn file_name(params: &RequestUploadParams) -> String {
        let info = &params.file_info;
        match info.file_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None if info.extension.is_empty() => Uuid::new_v4().to_string(),
            None => format!("{}.{}", Uuid::new_v4(), info.extension.trim_start_matches('.')),
        }
    }

    fn target_key(&self, params: &RequestUploadParams) -> BlobResult<String> {
        match &params.file_info.replace_target_url {
            Some(url) => {
                let key = self.key_from_url(url)?;
                if self.keys.bucket_of(key) != Some(params.bucket_name.as_str()) {
                    return Err(BlobError::invalid("Replace target belongs to another bucket"));
                }
                Ok(key.to_string())
            }
            None => Ok(self.keys.object_key(
                &params.bucket_name,
                params.is_public,
                &params.path,
                &Self::file_name(params),
            )),
        }
    }

    fn object_metadata(params: &RequestUploadParams) -> BlobResult<ObjectMetadata> {
        let mut meta = ObjectMetadata::new();
        meta.insert(META_PATH.to_string(), serde_json::to_string(&params.path)?);
        if params.file_info.temporary {
            meta.insert(META_TEMPORARY.to_string(), "true".to_string());
        }
        for (k, v) in &params.metadata {
            meta.insert(format!("{META_USER_PREFIX}{k}"), v.clone());
        }
        Ok(meta)
    }

    async fn sign_parts(&self, key: &str, upload_id: &UploadId, parts: &[u32]) -> BlobResult<Vec<PartUrl>> {
        let max = self.config.upload_rules.max_parts;
        let mut out = Vec::with_capacity(parts.len());
        for &part_number in parts {
            if part_number == 0 || part_number > max {
                return Err(BlobError::invalid(format!(
                    "Invalid part number: {part_number} (must be 1-{max})"
                )));
            }
            let upload_url = self
                .store
                .sign_part(key, upload_id, part_number, self.ttl_secs())
                .await?;
            out.push(PartUrl {
                part_number,
                upload_url,
            });
        }
        Ok(out)
    }

    async fn request_upload_inner(&self, params: RequestUploadParams) -> BlobResult<ProviderUploadResult> {
        let key = self.target_key(&params)?;
        let options = PutOptions {
            content_type: Some(params.file_info.mime_type.clone()),
            metadata: Self::object_metadata(&params)?,
        };
        let size = params.file_info.size;

        let target = if size > self.config.multipart_threshold_bytes {
            let (part_size, total_parts) = self.config.plan_parts(size);
            let plan = MultipartPlan {
                total_parts,
                size_bytes: size,
            };
            let upload_id = self.store.init_multipart(&key, options, plan).await?;
            let first_batch: Vec<u32> =
                (1..=total_parts.min(self.config.upload_rules.presign_batch.max(1))).collect();
            let parts = self.sign_parts(&key, &upload_id, &first_batch).await?;

            tracing::debug!(%upload_id, key = %key, total_parts, part_size, "multipart upload started");
            UploadTarget::Multipart {
                multipart: MultipartHandle {
                    upload_id: upload_id.to_string(),
                    key: key.clone(),
                    part_size,
                    total_parts,
                    parts,
                },
            }
        } else {
            let upload_url = self.store.sign_put(&key, options, self.ttl_secs()).await?;
            UploadTarget::Single { upload_url }
        };

        Ok(ProviderUploadResult {
            target,
            access_url: self.access_url(&key),
            thumbnail_url: None,
        })
    }

    async fn get_file_inner(&self, url: &str) -> BlobResult<FileRecord> {
        let key = self.key_from_url(url)?;
        let head = self.store.head(key).await?;

        let path: Vec<PathValue> = match head.metadata.get(META_PATH) {
            Some(raw) => serde_json::from_str(raw)?,
            None => Vec::new(),
        };
        let metadata: Metadata = head
            .metadata
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(META_USER_PREFIX).map(|k| (k.to_string(), v.clone())))
            .collect();
        let uploaded_at: DateTime<Utc> = head
            .last_modified
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        Ok(FileRecord {
            url: self.access_url(key),
            size: head.size_bytes,
            uploaded_at,
            path,
            metadata,
        })
    }
}

#[async_trait]
impl<S> Provider for BlobProvider<S>
where
    S: SignedUrlBlobStore + MultipartBlobStore + 'static,
{
    async fn init(&self, _params: ProviderInitParams) -> Result<ProviderInitResult> {
        Ok(ProviderInitResult::default())
    }

    fn base_url(&self) -> String {
        self.config.base_url.clone()
    }

    async fn get_file(&self, url: &str) -> Result<FileRecord> {
        self.get_file_inner(url).await.map_err(BlobError::into_anyhow)
    }

    async fn request_upload(&self, params: RequestUploadParams) -> Result<ProviderUploadResult> {
        self.request_upload_inner(params)
            .await
            .map_err(BlobError::into_anyhow)
    }

    async fn request_upload_parts(
        &self,
        params: RequestUploadPartsParams,
    ) -> Result<RequestUploadPartsResult> {
        let upload_id = UploadId::from_string(params.multipart.upload_id.clone());
        let parts = self
            .sign_parts(&params.key, &upload_id, &params.multipart.parts)
            .await
            .map_err(BlobError::into_anyhow)?;
        Ok(RequestUploadPartsResult {
            multipart: SignedParts {
                upload_id: params.multipart.upload_id,
                parts,
            },
        })
    }

    async fn complete_multipart_upload(&self, params: CompleteMultipartUploadParams) -> Result<()> {
        let mut parts: Vec<PartETag> = params
            .parts
            .into_iter()
            .map(|p| PartETag {
                part_number: p.part_number,
                etag: p.e_tag,
            })
            .collect();
        parts.sort_by_key(|p| p.part_number);

        let upload_id = UploadId::from_string(params.upload_id);
        let result = self
            .store
            .complete_multipart(&upload_id, &params.key, parts)
            .await
            .map_err(|e| {
                tracing::warn!(%upload_id, error = %e, "multipart completion refused");
                e.into_anyhow()
            })?;
        tracing::info!(%upload_id, key = %params.key, size = result.size_bytes, "multipart upload completed");
        Ok(())
    }

    async fn confirm_upload(&self, url: &str) -> Result<SuccessResult> {
        let confirm = async {
            let key = self.key_from_url(url)?;
            let mut meta = self.store.head(key).await?.metadata;
            if meta.remove(META_TEMPORARY).is_some() {
                self.store.set_metadata(key, meta).await?;
            }
            BlobResult::Ok(())
        };
        confirm.await.map_err(BlobError::into_anyhow)?;
        Ok(SuccessResult { success: true })
    }

    async fn delete_file(&self, url: &str) -> Result<SuccessResult> {
        let key = self.key_from_url(url).map_err(BlobError::into_anyhow)?;
        self.store.delete(key).await.map_err(BlobError::into_anyhow)?;
        tracing::info!(key, "object deleted");
        Ok(SuccessResult { success: true })
    }
}

/// Whether an object is still awaiting `confirm_upload`.
pub fn is_temporary(metadata: &ObjectMetadata) -> bool {
    metadata.get(META_TEMPORARY).is_some_and(|v| v == "true")
}
