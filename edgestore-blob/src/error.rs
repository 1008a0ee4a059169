use edgestore_core::EdgeStoreError;
use thiserror::Error;

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur during blob operations
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Blob not found: {key}")]
    NotFound { key: String },

    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Upload session not found: {upload_id}")]
    UploadNotFound { upload_id: String },

    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("Signed URL is invalid or expired")]
    BadSignature,

    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl BlobError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(key: S) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create an upload not found error
    pub fn upload_not_found<S: Into<String>>(upload_id: S) -> Self {
        Self::UploadNotFound {
            upload_id: upload_id.into(),
        }
    }

    /// Create an upload failed error
    pub fn upload_failed<S: Into<String>>(reason: S) -> Self {
        Self::UploadFailed {
            reason: reason.into(),
        }
    }

    /// Client mistakes become `BAD_REQUEST`; backend faults stay opaque.
    pub fn into_anyhow(self) -> anyhow::Error {
        let client_fault = matches!(
            self,
            BlobError::NotFound { .. }
                | BlobError::Invalid { .. }
                | BlobError::UploadNotFound { .. }
                | BlobError::UploadFailed { .. }
                | BlobError::BadSignature
        );
        if client_fault {
            EdgeStoreError::bad_request(self.to_string())
                .with_source(anyhow::Error::new(self))
                .into_anyhow()
        } else {
            anyhow::Error::new(self)
        }
    }
}
