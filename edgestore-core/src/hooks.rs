//! Bucket lifecycle hooks and the metadata resolver.
//!
//! Each seam is an async trait. Plain async closures implement them, so a
//! declaration reads:
//!
//! ```rust
//! use edgestore_core::{Bucket, BeforeUploadArgs};
//!
//! #[derive(Clone, serde::Serialize, serde::Deserialize)]
//! struct Ctx { user_id: String, role: String }
//!
//! let bucket: Bucket<Ctx> = Bucket::file()
//!     .before_upload(|args: BeforeUploadArgs<Ctx>| async move { Ok(args.ctx.role == "admin") });
//! ```

use std::future::Future;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::types::{FileInfo, FileRecord, Metadata};

/// Arguments for `beforeUpload`: validated input + client-declared file info.
#[derive(Debug, Clone)]
pub struct BeforeUploadArgs<C> {
    pub ctx: C,
    pub input: Value,
    pub file_info: FileInfo,
}

/// Arguments for `beforeDelete`: the provider's record, not the client's claim.
#[derive(Debug, Clone)]
pub struct BeforeDeleteArgs<C> {
    pub ctx: C,
    pub file_info: FileRecord,
}

#[derive(Debug, Clone)]
pub struct MetadataArgs<C> {
    pub ctx: C,
    pub input: Value,
}

/// Veto an upload by returning `false`.
#[async_trait]
pub trait BeforeUploadHook<C>: Send + Sync {
    async fn run(&self, args: BeforeUploadArgs<C>) -> Result<bool>;
}

/// Veto a delete by returning `false`.
#[async_trait]
pub trait BeforeDeleteHook<C>: Send + Sync {
    async fn run(&self, args: BeforeDeleteArgs<C>) -> Result<bool>;
}

/// Compute the metadata stored alongside an upload.
#[async_trait]
pub trait MetadataResolver<C>: Send + Sync {
    async fn resolve(&self, args: MetadataArgs<C>) -> Result<Metadata>;
}

#[async_trait]
impl<C, F, Fut> BeforeUploadHook<C> for F
where
    C: Send + 'static,
    F: Fn(BeforeUploadArgs<C>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    async fn run(&self, args: BeforeUploadArgs<C>) -> Result<bool> {
        (self)(args).await
    }
}

#[async_trait]
impl<C, F, Fut> BeforeDeleteHook<C> for F
where
    C: Send + 'static,
    F: Fn(BeforeDeleteArgs<C>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    async fn run(&self, args: BeforeDeleteArgs<C>) -> Result<bool> {
        (self)(args).await
    }
}

#[async_trait]
impl<C, F, Fut> MetadataResolver<C> for F
where
    C: Send + 'static,
    F: Fn(MetadataArgs<C>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Metadata>> + Send + 'static,
{
    async fn resolve(&self, args: MetadataArgs<C>) -> Result<Metadata> {
        (self)(args).await
    }
}
