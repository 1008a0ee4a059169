//! # edgestore-blob: reference EdgeStore provider
//!
//! `BlobProvider` implements the EdgeStore `Provider` contract over any store
//! that can sign PUT URLs and run multipart uploads. Clients never stream
//! bytes through the application server; they PUT straight to the signed
//! URLs this crate hands out.
//!
//! ```text
//! ┌─────────────────┐
//! │ EdgeStoreHandler│  ← authorization, paths, metadata
//! ├─────────────────┤
//! │  BlobProvider   │  ← keys, signing, multipart bookkeeping
//! ├─────────────────┤
//! │   BlobStore     │  ← storage primitives (MemoryStore, S3, ...)
//! └─────────────────┘
//! ```
//!
//! ```rust
//! use std::sync::Arc;
//! use edgestore_blob::{BlobProvider, BlobProviderConfig, MemoryStore};
//!
//! let store = Arc::new(MemoryStore::new("http://localhost:3000/files"));
//! let provider = BlobProvider::new(store, BlobProviderConfig::new("http://localhost:3000/files"));
//! assert_eq!(provider.access_url("docs/a.txt"), "http://localhost:3000/files/docs/a.txt");
//! ```

mod config;
mod error;
pub mod memory;
pub mod provider;
pub mod store;
mod types;

pub use config::{BlobProviderConfig, UploadRules};
pub use error::{BlobError, BlobResult};
pub use memory::MemoryStore;
pub use provider::{is_temporary, BlobProvider};
pub use store::{
    BlobKeyStrategy, BlobStore, DefaultKeyStrategy, MultipartBlobStore, MultipartPlan, ObjectHead,
    PartETag, PutResult, SignedUrlBlobStore, PUBLIC_MARKER,
};
pub use types::{ByteStream, ObjectMetadata, PutOptions, UploadId};
