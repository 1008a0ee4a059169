//! The framework-agnostic request pipeline.
//!
//! [`EdgeStoreHandler`] runs every EdgeStore operation against the immutable
//! router. HTTP shims only translate cookies/bodies in and results/errors out.
//!
//! `request_upload` stages, in order:
//! 1. open the context token (`UNAUTHORIZED` when absent or invalid)
//! 2. look up the bucket and validate the input
//! 3. `beforeUpload` (`UPLOAD_NOT_ALLOWED` on `false`)
//! 4. image type / max size / accept list
//! 5. path resolution
//! 6. access control against the resolved path, and against the stored
//!    path of the object named by `replaceTargetUrl`
//! 7. metadata
//! 8. provider delegation, then `uploadedAt` stamping

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::bucket::{Bucket, IMAGE_MIME_TYPES};
use crate::config::EdgeStoreConfig;
use crate::context::ContextCodec;
use crate::errors::EdgeStoreError;
use crate::hooks::{BeforeDeleteArgs, BeforeUploadArgs, MetadataArgs};
use crate::logger::Logger;
use crate::provider::{
    CompleteMultipartUploadParams, Provider, ProviderInitParams, RequestUploadParams,
    RequestUploadPartsParams,
};
use crate::router::EdgeStoreRouter;
use crate::types::{
    BucketType, CompleteMultipartUploadBody, ConfirmUploadBody, DeleteFileBody, FileInfo,
    InitResponse, Metadata, RequestUploadBody, RequestUploadPartsBody, RequestUploadPartsResult,
    RequestUploadResult, SuccessResult,
};

/// Result of `/init`: cookie values plus the response body.
#[derive(Debug, Clone, PartialEq)]
pub struct InitOutcome {
    pub ctx_token: String,
    pub provider_token: Option<String>,
    pub body: InitResponse,
}

pub struct EdgeStoreHandler<C> {
    router: EdgeStoreRouter<C>,
    provider: Arc<dyn Provider>,
    codec: Arc<dyn ContextCodec>,
    config: Arc<EdgeStoreConfig>,
    logger: Logger,
}

impl<C> Clone for EdgeStoreHandler<C> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
            provider: Arc::clone(&self.provider),
            codec: Arc::clone(&self.codec),
            config: Arc::clone(&self.config),
            logger: self.logger,
        }
    }
}

impl<C> EdgeStoreHandler<C>
where
    C: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(
        router: EdgeStoreRouter<C>,
        provider: Arc<dyn Provider>,
        codec: Arc<dyn ContextCodec>,
    ) -> Self {
        Self::with_config(router, provider, codec, EdgeStoreConfig::default())
    }

    pub fn with_config(
        router: EdgeStoreRouter<C>,
        provider: Arc<dyn Provider>,
        codec: Arc<dyn ContextCodec>,
        config: EdgeStoreConfig,
    ) -> Self {
        let logger = config.logger();
        Self {
            router,
            provider,
            codec,
            config: Arc::new(config),
            logger,
        }
    }

    pub fn router(&self) -> &EdgeStoreRouter<C> {
        &self.router
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn config(&self) -> &EdgeStoreConfig {
        &self.config
    }

    pub fn logger(&self) -> Logger {
        self.logger
    }

    pub fn health(&self) -> &'static str {
        "OK"
    }

    /// Seal `ctx` into a cookie value and let the provider mint its token.
    pub async fn init(&self, ctx: C) -> Result<InitOutcome> {
        let ctx_value = serde_json::to_value(&ctx).context("serializing context")?;
        let ctx_token = self.codec.seal(&ctx_value)?;

        let init = self
            .provider
            .init(ProviderInitParams {
                ctx: ctx_value,
                router: self.router.to_json(),
            })
            .await?;

        self.logger.debug("init: context sealed");
        Ok(InitOutcome {
            ctx_token,
            provider_token: init.token.clone(),
            body: InitResponse {
                token: init.token,
                base_url: self.provider.base_url(),
            },
        })
    }

    pub async fn request_upload(
        &self,
        ctx_token: Option<&str>,
        body: RequestUploadBody,
    ) -> Result<RequestUploadResult> {
        let (ctx, ctx_value) = self.open_context(ctx_token)?;
        let bucket = self.bucket(&body.bucket_name)?;
        let input = bucket.parse_input(&body.input)?;
        let file_info = body.file_info;

        self.logger.debug(format_args!(
            "request-upload: bucket={} size={} type={}",
            body.bucket_name, file_info.size, file_info.mime_type
        ));

        if let Some(hook) = bucket.before_upload_hook() {
            let allowed = hook
                .run(BeforeUploadArgs {
                    ctx: ctx.clone(),
                    input: input.clone(),
                    file_info: file_info.clone(),
                })
                .await?;
            if !allowed {
                return Err(EdgeStoreError::upload_not_allowed().into_anyhow());
            }
        }

        check_file(bucket, &file_info)?;

        let attrs = json!({ "ctx": ctx_value, "input": input });
        let path = bucket.resolve_path(&attrs)?;

        if let Some(rule) = bucket.access_rule() {
            if !rule.evaluate(&ctx_value, &path)? {
                return Err(EdgeStoreError::upload_not_allowed().into_anyhow());
            }
            // the replaced object keeps whoever owns it now, not the caller
            if let Some(target) = &file_info.replace_target_url {
                let existing = self.provider.get_file(target).await?;
                if !rule.evaluate(&ctx_value, &existing.path)? {
                    self.logger.debug(format_args!(
                        "request-upload: replace of {target} denied by access control"
                    ));
                    return Err(EdgeStoreError::upload_not_allowed().into_anyhow());
                }
            }
        }

        let metadata = match bucket.metadata_resolver() {
            Some(resolver) => {
                resolver
                    .resolve(MetadataArgs {
                        ctx: ctx.clone(),
                        input: input.clone(),
                    })
                    .await?
            }
            None => Metadata::new(),
        };

        let size = file_info.size;
        let uploaded = self
            .provider
            .request_upload(RequestUploadParams {
                bucket_name: body.bucket_name.clone(),
                bucket_type: bucket.bucket_type(),
                is_public: bucket.is_public(),
                path: path.clone(),
                metadata: metadata.clone(),
                file_info,
            })
            .await?;

        self.logger.info(format_args!(
            "request-upload: bucket={} access_url={}",
            body.bucket_name, uploaded.access_url
        ));

        Ok(RequestUploadResult {
            target: uploaded.target,
            access_url: uploaded.access_url,
            thumbnail_url: uploaded.thumbnail_url,
            size,
            uploaded_at: Utc::now(),
            path,
            metadata,
        })
    }

    /// Only the context is re-checked; `request_upload` already authorized the transfer.
    pub async fn request_upload_parts(
        &self,
        ctx_token: Option<&str>,
        body: RequestUploadPartsBody,
    ) -> Result<RequestUploadPartsResult> {
        self.open_context(ctx_token)?;
        self.logger.debug(format_args!(
            "request-upload-parts: upload_id={} parts={:?}",
            body.multipart.upload_id, body.multipart.parts
        ));
        self.provider
            .request_upload_parts(RequestUploadPartsParams {
                multipart: body.multipart,
                key: body.path,
            })
            .await
    }

    pub async fn complete_multipart_upload(
        &self,
        ctx_token: Option<&str>,
        body: CompleteMultipartUploadBody,
    ) -> Result<()> {
        self.open_context(ctx_token)?;
        if let Some(name) = &body.bucket_name {
            self.bucket(name)?;
        }
        self.logger.debug(format_args!(
            "complete-multipart-upload: upload_id={} parts={}",
            body.upload_id,
            body.parts.len()
        ));
        self.provider
            .complete_multipart_upload(CompleteMultipartUploadParams {
                bucket_name: body.bucket_name,
                upload_id: body.upload_id,
                key: body.key,
                parts: body.parts,
            })
            .await
    }

    pub async fn confirm_upload(
        &self,
        ctx_token: Option<&str>,
        body: ConfirmUploadBody,
    ) -> Result<SuccessResult> {
        self.open_context(ctx_token)?;
        self.bucket(&body.bucket_name)?;
        self.logger
            .debug(format_args!("confirm-upload: bucket={} url={}", body.bucket_name, body.url));
        self.provider.confirm_upload(&body.url).await
    }

    pub async fn delete_file(
        &self,
        ctx_token: Option<&str>,
        body: DeleteFileBody,
    ) -> Result<SuccessResult> {
        let (ctx, ctx_value) = self.open_context(ctx_token)?;
        let bucket = self.bucket(&body.bucket_name)?;

        let Some(hook) = bucket.before_delete_hook() else {
            self.logger.error(format_args!(
                "delete-file: bucket `{}` has no beforeDelete",
                body.bucket_name
            ));
            return Err(EdgeStoreError::server_error(
                "You need to define beforeDelete if you want to delete files directly from the frontend.",
            )
            .into_anyhow());
        };

        let record = self.provider.get_file(&body.url).await?;

        if let Some(rule) = bucket.access_rule() {
            if !rule.evaluate(&ctx_value, &record.path)? {
                return Err(EdgeStoreError::delete_not_allowed().into_anyhow());
            }
        }

        let allowed = hook
            .run(BeforeDeleteArgs {
                ctx,
                file_info: record,
            })
            .await?;
        if !allowed {
            return Err(EdgeStoreError::delete_not_allowed().into_anyhow());
        }

        self.logger
            .info(format_args!("delete-file: bucket={} url={}", body.bucket_name, body.url));
        self.provider.delete_file(&body.url).await
    }

    fn open_context(&self, token: Option<&str>) -> Result<(C, Value)> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| EdgeStoreError::unauthorized("Missing edgestore-ctx cookie").into_anyhow())?;

        let value = self.codec.open(token).map_err(|e| {
            self.logger.debug(format_args!("context token rejected: {e:#}"));
            EdgeStoreError::unauthorized("Invalid edgestore-ctx cookie").into_anyhow()
        })?;

        let ctx = serde_json::from_value::<C>(value.clone()).map_err(|e| {
            self.logger.debug(format_args!("context shape mismatch: {e}"));
            EdgeStoreError::unauthorized("Invalid edgestore-ctx cookie").into_anyhow()
        })?;
        Ok((ctx, value))
    }

    fn bucket(&self, name: &str) -> Result<&Bucket<C>> {
        self.router.bucket(name).ok_or_else(|| {
            EdgeStoreError::bad_request(format!("Bucket {name} not found")).into_anyhow()
        })
    }
}

fn check_file<C>(bucket: &Bucket<C>, file_info: &FileInfo) -> Result<()> {
    if bucket.bucket_type() == BucketType::Image
        && !IMAGE_MIME_TYPES.contains(&file_info.mime_type.as_str())
    {
        let allowed: Vec<String> = IMAGE_MIME_TYPES.iter().map(|s| s.to_string()).collect();
        return Err(EdgeStoreError::mime_type_not_allowed(&allowed, &file_info.mime_type).into_anyhow());
    }

    let config = bucket.config();
    if let Some(max) = config.max_size {
        if file_info.size > max {
            return Err(EdgeStoreError::file_too_large(max, file_info.size).into_anyhow());
        }
    }

    if let Some(accept) = &config.accept {
        if !config.accepts(&file_info.mime_type) {
            return Err(EdgeStoreError::mime_type_not_allowed(accept, &file_info.mime_type).into_anyhow());
        }
    }
    Ok(())
}
