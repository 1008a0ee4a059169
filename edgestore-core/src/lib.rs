//! edgestore-core: bucket declarations and the framework-agnostic upload pipeline.

pub mod access;
pub mod bucket;
pub mod config;
pub mod context;
pub mod errors;
pub mod expr;
pub mod hooks;
pub mod logger;
pub mod pipeline;
pub mod provider;
pub mod router;
pub mod schema;
pub mod types;

pub use access::{field, path_ref, AccessControl, AccessControlError};
pub use bucket::{Bucket, BucketConfig, DefinitionError, PathSegment, IMAGE_MIME_TYPES};
pub use config::EdgeStoreConfig;
pub use context::ContextCodec;
pub use errors::{EdgeStoreError, EdgeStoreResult, ErrorKind};
pub use expr::{ctx, input, FieldPath, ResolveError};
pub use hooks::{BeforeDeleteArgs, BeforeUploadArgs, MetadataArgs};
pub use logger::{LogLevel, Logger};
pub use pipeline::{EdgeStoreHandler, InitOutcome};
pub use provider::{
    CompleteMultipartUploadParams, Provider, ProviderInitParams, ProviderInitResult,
    ProviderUploadResult, RequestUploadParams, RequestUploadPartsParams,
};
pub use router::{EdgeStoreRouter, RouterBuilder};
pub use types::*;
