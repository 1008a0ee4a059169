//! edgestore-auth: sealed session-context tokens for EdgeStore.

pub mod codec;
pub mod error;
pub mod jwt;
pub mod options;

pub use codec::JwtContextCodec;
pub use error::ContextError;
pub use jwt::JwtSigner;
pub use options::{JwtAlgorithm, JwtContextOptions, SECRET_ENV};
