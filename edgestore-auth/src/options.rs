// Context token options.

use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::ContextError;

pub const SECRET_ENV: &str = "EDGE_STORE_SECRET";
pub const SECRET_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

const SIGNING_LABEL: &[u8] = b"edgestore-ctx/jwt-signing";
const ENCRYPTION_LABEL: &[u8] = b"edgestore-ctx/aes-256-gcm";

/// HMAC algorithms usable with a shared secret.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum JwtAlgorithm {
    #[default]
    HS256,
    HS384,
    HS512,
}

#[derive(Clone)]
pub struct JwtContextOptions {
    /// HMAC-SHA256(secret, label) per use, so the JWT and the envelope never share a key.
    pub(crate) signing_key: [u8; SECRET_LEN],
    pub(crate) encryption_key: [u8; SECRET_LEN],
    pub issuer: String,
    pub audience: Vec<String>,
    pub algorithm: JwtAlgorithm,
    pub max_age: Duration,
}

impl std::fmt::Debug for JwtContextOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtContextOptions")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("algorithm", &self.algorithm)
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl JwtContextOptions {
    pub fn new(secret: &[u8]) -> Result<Self, ContextError> {
        if secret.len() != SECRET_LEN {
            return Err(ContextError::InvalidSecretLength {
                expected: SECRET_LEN,
                actual: secret.len(),
            });
        }
        Ok(Self {
            signing_key: derive_key(secret, SIGNING_LABEL)?,
            encryption_key: derive_key(secret, ENCRYPTION_LABEL)?,
            issuer: "edgestore".to_string(),
            audience: vec!["edgestore".to_string()],
            algorithm: JwtAlgorithm::default(),
            max_age: Duration::from_secs(30 * 24 * 60 * 60),
        })
    }

    /// Standard base64 of a 32-byte key.
    pub fn from_base64(secret: &str) -> Result<Self, ContextError> {
        let bytes = general_purpose::STANDARD.decode(secret.trim())?;
        Self::new(&bytes)
    }

    /// Reads `EDGE_STORE_SECRET`.
    pub fn from_env() -> Result<Self, ContextError> {
        let raw = std::env::var(SECRET_ENV)
            .map_err(|_| ContextError::MissingSecret(SECRET_ENV.to_string()))?;
        Self::from_base64(&raw)
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_audience<I, S>(mut self, audience: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audience = audience.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_algorithm(mut self, algorithm: JwtAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Keep in step with the cookie max-age.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

fn derive_key(secret: &[u8], label: &[u8]) -> Result<[u8; SECRET_LEN], ContextError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| ContextError::InvalidSecretLength {
        expected: SECRET_LEN,
        actual: secret.len(),
    })?;
    mac.update(label);
    let mut key = [0u8; SECRET_LEN];
    key.copy_from_slice(&mac.finalize().into_bytes());
    Ok(key)
}
