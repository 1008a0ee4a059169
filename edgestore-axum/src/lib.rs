//! edgestore-axum: Axum adapter for the EdgeStore pipeline.
//!
//! ```rust,no_run
//! # use edgestore_axum::edgestore;
//! # use edgestore_core::EdgeStoreHandler;
//! # async fn run(handler: EdgeStoreHandler<String>) -> anyhow::Result<()> {
//! edgestore(handler, |req| async move {
//!     Ok(req.header("x-user-id").unwrap_or("anonymous").to_string())
//! })
//! .listen("127.0.0.1:3000")
//! .await
//! # }
//! ```

pub mod app;
pub mod context;
pub mod cookies;
pub mod routes;
pub mod state;
mod error;
pub use error::EdgeStoreAxumError;
pub use state::EdgeStoreState;

pub use app::{edgestore, EdgeStoreApp};
pub use context::{CreateContext, RequestInfo};
pub use routes::Endpoint;
