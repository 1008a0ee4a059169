//! Bucket declarations.
//!
//! A [`Bucket`] is an immutable value. Every builder method takes `&self` and
//! returns a new bucket that shares unchanged parts with the old one, so a
//! partially configured bucket can be reused as a template:
//!
//! ```rust
//! use edgestore_core::{Bucket, BucketConfig};
//! use edgestore_core::access::{field, path_ref};
//! use edgestore_core::expr::ctx;
//!
//! #[derive(Clone, serde::Serialize, serde::Deserialize)]
//! struct Ctx { user_id: String }
//!
//! let base: Bucket<Ctx> = Bucket::image_with(BucketConfig::new().with_max_size(1024 * 1024));
//! let avatars = base
//!     .path([("owner", ctx("user_id"))])
//!     .access_control(field("user_id").eq(path_ref("owner")));
//!
//! assert!(base.is_public());
//! assert!(!avatars.is_public());
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use validator::Validate;

use crate::access::AccessControl;
use crate::expr::{FieldPath, ResolveError};
use crate::hooks::{
    BeforeDeleteArgs, BeforeDeleteHook, BeforeUploadArgs, BeforeUploadHook, MetadataArgs,
    MetadataResolver,
};
use crate::schema::InputSchema;
use crate::types::{BucketType, Metadata, PathValue};

/// MIME types accepted by image buckets.
pub const IMAGE_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/avif",
    "image/svg+xml",
    "image/bmp",
    "image/tiff",
    "image/x-icon",
    "image/vnd.microsoft.icon",
    "image/heic",
    "image/heif",
];

/// Declaration-time problems, reported when the router is built.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("bucket names must not be empty")]
    EmptyBucketName,

    #[error("bucket `{0}` is declared more than once")]
    DuplicateBucket(String),

    #[error("bucket `{bucket}`: path segment names must not be empty")]
    EmptySegmentName { bucket: String },

    #[error("bucket `{bucket}`: path segment `{segment}` is declared more than once")]
    DuplicateSegment { bucket: String, segment: String },

    #[error("bucket `{bucket}`: path segment `{segment}` does not reference any field")]
    EmptyFieldPath { bucket: String, segment: String },

    #[error("bucket `{bucket}`: access control references unknown path segment `{segment}`")]
    UnknownPathReference { bucket: String, segment: String },
}

/// Size/MIME limits for a bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<Vec<String>>,
}

impl BucketConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    /// Exact MIME types or `type/*` wildcards.
    pub fn with_accept<I, S>(mut self, accept: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accept = Some(accept.into_iter().map(Into::into).collect());
        self
    }

    /// Case-sensitive match, honouring trailing `/*` wildcards.
    pub fn accepts(&self, mime_type: &str) -> bool {
        match &self.accept {
            None => true,
            Some(list) => list.iter().any(|accepted| match accepted.strip_suffix("/*") {
                Some(prefix) => mime_type
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/')),
                None => mime_type == accepted,
            }),
        }
    }
}

/// One named component of the storage path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub name: String,
    pub source: FieldPath,
}

pub struct Bucket<C> {
    bucket_type: BucketType,
    config: BucketConfig,
    input: Option<InputSchema>,
    path: Arc<Vec<PathSegment>>,
    metadata: Option<Arc<dyn MetadataResolver<C>>>,
    access_control: Option<Arc<AccessControl>>,
    before_upload: Option<Arc<dyn BeforeUploadHook<C>>>,
    before_delete: Option<Arc<dyn BeforeDeleteHook<C>>>,
}

impl<C> Clone for Bucket<C> {
    fn clone(&self) -> Self {
        Self {
            bucket_type: self.bucket_type,
            config: self.config.clone(),
            input: self.input.clone(),
            path: Arc::clone(&self.path),
            metadata: self.metadata.clone(),
            access_control: self.access_control.clone(),
            before_upload: self.before_upload.clone(),
            before_delete: self.before_delete.clone(),
        }
    }
}

impl<C> fmt::Debug for Bucket<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("type", &self.bucket_type)
            .field("config", &self.config)
            .field("input", &self.input)
            .field("path", &self.path)
            .field("access_control", &self.access_control)
            .field("metadata", &self.metadata.is_some())
            .field("before_upload", &self.before_upload.is_some())
            .field("before_delete", &self.before_delete.is_some())
            .finish()
    }
}

impl<C> Bucket<C>
where
    C: Send + 'static,
{
    fn with_type(bucket_type: BucketType, config: BucketConfig) -> Self {
        Self {
            bucket_type,
            config,
            input: None,
            path: Arc::new(Vec::new()),
            metadata: None,
            access_control: None,
            before_upload: None,
            before_delete: None,
        }
    }

    pub fn image() -> Self {
        Self::with_type(BucketType::Image, BucketConfig::default())
    }

    pub fn image_with(config: BucketConfig) -> Self {
        Self::with_type(BucketType::Image, config)
    }

    pub fn file() -> Self {
        Self::with_type(BucketType::File, BucketConfig::default())
    }

    pub fn file_with(config: BucketConfig) -> Self {
        Self::with_type(BucketType::File, config)
    }

    /// Declare the input type clients must send with each upload.
    pub fn input<T>(&self) -> Self
    where
        T: DeserializeOwned + Serialize + Validate + 'static,
    {
        let mut next = self.clone();
        next.input = Some(InputSchema::of::<T>());
        next
    }

    /// Declare the ordered path segments, e.g. `[("owner", ctx("userId"))]`.
    pub fn path<I, S>(&self, segments: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldPath)>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.path = Arc::new(
            segments
                .into_iter()
                .map(|(name, source)| PathSegment {
                    name: name.into(),
                    source,
                })
                .collect(),
        );
        next
    }

    pub fn metadata<F, Fut>(&self, resolver: F) -> Self
    where
        F: Fn(MetadataArgs<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Metadata>> + Send + 'static,
    {
        let mut next = self.clone();
        next.metadata = Some(Arc::new(resolver));
        next
    }

    /// Make the bucket protected. Without this the bucket is public.
    pub fn access_control(&self, rule: impl Into<AccessControl>) -> Self {
        let mut next = self.clone();
        next.access_control = Some(Arc::new(rule.into()));
        next
    }

    pub fn before_upload<F, Fut>(&self, hook: F) -> Self
    where
        F: Fn(BeforeUploadArgs<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        let mut next = self.clone();
        next.before_upload = Some(Arc::new(hook));
        next
    }

    /// Opt this bucket into client-side deletes.
    pub fn before_delete<F, Fut>(&self, hook: F) -> Self
    where
        F: Fn(BeforeDeleteArgs<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        let mut next = self.clone();
        next.before_delete = Some(Arc::new(hook));
        next
    }
}

impl<C> Bucket<C> {
    pub fn bucket_type(&self) -> BucketType {
        self.bucket_type
    }

    pub fn config(&self) -> &BucketConfig {
        &self.config
    }

    pub fn path_segments(&self) -> &[PathSegment] {
        &self.path
    }

    pub fn access_rule(&self) -> Option<&AccessControl> {
        self.access_control.as_deref()
    }

    pub fn is_public(&self) -> bool {
        self.access_control.is_none()
    }

    pub(crate) fn before_upload_hook(&self) -> Option<&Arc<dyn BeforeUploadHook<C>>> {
        self.before_upload.as_ref()
    }

    pub(crate) fn before_delete_hook(&self) -> Option<&Arc<dyn BeforeDeleteHook<C>>> {
        self.before_delete.as_ref()
    }

    pub(crate) fn metadata_resolver(&self) -> Option<&Arc<dyn MetadataResolver<C>>> {
        self.metadata.as_ref()
    }

    /// Parse client input. Buckets without a schema accept only `null` or `{}`.
    pub fn parse_input(&self, input: &Value) -> Result<Value> {
        match &self.input {
            Some(schema) => schema.parse(input),
            None => match input {
                Value::Null => Ok(Value::Null),
                Value::Object(m) if m.is_empty() => Ok(Value::Null),
                _ => Err(crate::errors::EdgeStoreError::bad_request(
                    "This bucket does not accept input",
                )
                .into_anyhow()),
            },
        }
    }

    /// Resolve every segment against `{ ctx, input }`, in declaration order.
    pub fn resolve_path(&self, attrs: &Value) -> Result<Vec<PathValue>, ResolveError> {
        self.path
            .iter()
            .map(|seg| {
                seg.source
                    .resolve_segment(attrs)
                    .map(|value| PathValue::new(seg.name.clone(), value))
            })
            .collect()
    }

    /// Check the declaration itself; called once when the router is built.
    pub fn validate(&self, bucket: &str) -> Result<(), DefinitionError> {
        let mut seen = std::collections::BTreeSet::new();
        for seg in self.path.iter() {
            if seg.name.trim().is_empty() {
                return Err(DefinitionError::EmptySegmentName {
                    bucket: bucket.to_string(),
                });
            }
            if !seen.insert(seg.name.as_str()) {
                return Err(DefinitionError::DuplicateSegment {
                    bucket: bucket.to_string(),
                    segment: seg.name.clone(),
                });
            }
            if seg.source.is_empty() {
                return Err(DefinitionError::EmptyFieldPath {
                    bucket: bucket.to_string(),
                    segment: seg.name.clone(),
                });
            }
        }

        if let Some(rule) = &self.access_control {
            for segment in rule.referenced_segments() {
                if !seen.contains(segment) {
                    return Err(DefinitionError::UnknownPathReference {
                        bucket: bucket.to_string(),
                        segment: segment.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Function-free view of the bucket for the routing table.
    pub fn to_json(&self) -> Value {
        json!({
            "type": self.bucket_type,
            "input": self.input.as_ref().map(InputSchema::name),
            "path": self.path.iter().map(|s| json!({ s.name.clone(): s.source.to_string() })).collect::<Vec<_>>(),
            "metadata": self.metadata.is_some(),
            "accessControl": self.access_control.as_ref().map(|a| a.to_json()),
            "bucketConfig": self.config,
            "beforeDelete": self.before_delete.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{field, path_ref};
    use crate::expr::{ctx, input};

    #[derive(Clone, Serialize, Deserialize)]
    struct Ctx {
        user_id: String,
    }

    #[test]
    fn builder_methods_do_not_mutate_the_receiver() {
        let base: Bucket<Ctx> = Bucket::file();
        let with_path = base.path([("owner", ctx("user_id"))]);
        assert!(base.path_segments().is_empty());
        assert_eq!(with_path.path_segments().len(), 1);

        let protected = with_path.access_control(field("user_id").eq(path_ref("owner")));
        assert!(with_path.is_public());
        assert!(!protected.is_public());
        assert_eq!(protected.path_segments(), with_path.path_segments());
    }

    #[test]
    fn accept_matches_exact_and_wildcards() {
        let cfg = BucketConfig::new().with_accept(["image/*", "application/pdf"]);
        assert!(cfg.accepts("image/png"));
        assert!(cfg.accepts("application/pdf"));
        assert!(!cfg.accepts("Application/PDF"));
        assert!(!cfg.accepts("imagex/png"));
        assert!(!cfg.accepts("text/plain"));
        assert!(BucketConfig::new().accepts("anything/else"));
    }

    #[test]
    fn duplicate_segments_are_rejected() {
        let b: Bucket<Ctx> = Bucket::file().path([("a", ctx("user_id")), ("a", input("x"))]);
        assert_eq!(
            b.validate("docs"),
            Err(DefinitionError::DuplicateSegment {
                bucket: "docs".into(),
                segment: "a".into()
            })
        );
    }

    #[test]
    fn access_rules_must_reference_declared_segments() {
        let b: Bucket<Ctx> = Bucket::file()
            .path([("owner", ctx("user_id"))])
            .access_control(field("user_id").eq(path_ref("author")));
        assert!(matches!(
            b.validate("docs"),
            Err(DefinitionError::UnknownPathReference { .. })
        ));
    }

    #[test]
    fn schema_less_buckets_reject_input() {
        let b: Bucket<Ctx> = Bucket::file();
        assert!(b.parse_input(&Value::Null).is_ok());
        assert!(b.parse_input(&json!({})).is_ok());
        assert!(b.parse_input(&json!({ "x": 1 })).is_err());
    }

    #[test]
    fn serialized_definition_lists_path_sources() {
        let b: Bucket<Ctx> = Bucket::image().path([("owner", ctx("user_id"))]);
        let v = b.to_json();
        assert_eq!(v["type"], "IMAGE");
        assert_eq!(v["path"], json!([{ "owner": "ctx.user_id" }]));
        assert!(v["accessControl"].is_null());
    }
}
