//! edgestore-client: talks to an EdgeStore handler and moves bytes to signed URLs.
//!
//! [`EdgeStoreClient::connect`] calls `/init` so the context cookie is set,
//! then gives per-bucket handles for one-off uploads; the
//! [`Uploader`] adds a file registry with progress, cancellation and a FIFO
//! bound on concurrent transfers.
//!
//! ```rust,no_run
//! use edgestore_client::{EdgeStoreClient, UploadFile, Uploader, UploaderConfig};
//!
//! # async fn run() -> Result<(), edgestore_client::ClientError> {
//! let client = EdgeStoreClient::connect("http://localhost:3000/api/edgestore").await?;
//! let uploader = Uploader::new(
//!     client.bucket("images"),
//!     UploaderConfig::new().with_max_concurrent_uploads(2),
//! );
//! uploader.add_files(vec![UploadFile::new("cat.png", "image/png", vec![0u8; 16])]);
//! uploader.upload_files(None).await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod gate;
pub mod transport;
pub mod uploader;

pub use api::{EdgeStoreApi, HttpApi};
pub use client::{BucketClient, EdgeStoreClient, ProgressFn, UploadFile, UploadOptions, UploadedFile};
pub use error::{ClientError, ClientResult};
pub use gate::{GatePermit, Ticket, UploadGate};
pub use transport::{ProgressSink, PutRequest, PutResponse, ReqwestTransport, UploadTransport};
pub use uploader::{FileState, UploadStatus, Uploader, UploaderBuilder, UploaderConfig};
