use edgestore_core::EdgeStoreError;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The transfer was cancelled through its token.
    #[error("Upload aborted")]
    Aborted,

    /// The EdgeStore handler answered with a structured error.
    #[error("{}", .0.message)]
    Api(#[from] EdgeStoreError),

    /// The storage endpoint refused a PUT.
    #[error("Transfer failed with status {status}: {message}")]
    Transfer { status: u16, message: String },

    #[error("No signed URL for part {0}")]
    MissingPartUrl(u32),

    #[error("Storage response for part {0} carried no ETag")]
    MissingETag(u32),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Wire code of an API error, e.g. `FILE_TOO_LARGE`.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Api(e) => Some(e.code()),
            _ => None,
        }
    }
}
