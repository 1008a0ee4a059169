use thiserror::Error;

/// Failures while sealing or opening a context token.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("context secret must be {expected} bytes, got {actual}")]
    InvalidSecretLength { expected: usize, actual: usize },

    #[error("context secret is not valid base64: {0}")]
    SecretEncoding(#[from] base64::DecodeError),

    #[error("missing environment variable {0}")]
    MissingSecret(String),

    #[error("token is not valid base64")]
    Malformed,

    #[error("token is too short")]
    Truncated,

    #[error("token could not be encrypted")]
    Encrypt,

    #[error("token failed authentication")]
    Decrypt,

    #[error("jwt: {0}")]
    Jwt(String),

    #[error("JWT support is disabled (enable one of: jwt-aws-lc-rs, jwt-rust-crypto)")]
    Disabled,

    #[error("token payload: {0}")]
    Payload(#[from] serde_json::Error),
}
