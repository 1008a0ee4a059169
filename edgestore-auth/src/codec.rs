//! The `edgestore-ctx` cookie codec.
//!
//! The context is wrapped in a JWT (`ctx`, `iat`, `exp`, `jti`, `iss`, `aud`)
//! and the JWT is then sealed with AES-256-GCM, so the cookie is both opaque
//! and tamper-evident. Layout: `base64url(nonce || ciphertext)`. The signing
//! and encryption keys are derived separately from the one configured secret.

use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use edgestore_core::ContextCodec;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ContextError;
use crate::jwt::{default_signer, JwtSigner};
use crate::options::JwtContextOptions;

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct JwtContextCodec {
    options: JwtContextOptions,
    cipher: Aes256Gcm,
    signer: Arc<dyn JwtSigner>,
}

impl std::fmt::Debug for JwtContextCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtContextCodec")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl JwtContextCodec {
    pub fn new(options: JwtContextOptions) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&options.encryption_key));
        Self {
            options,
            cipher,
            signer: default_signer(),
        }
    }

    pub fn from_env() -> Result<Self, ContextError> {
        Ok(Self::new(JwtContextOptions::from_env()?))
    }

    pub fn options(&self) -> &JwtContextOptions {
        &self.options
    }

    pub(crate) fn seal_at(&self, ctx: &Value, now: DateTime<Utc>) -> Result<String, ContextError> {
        let iat = now.timestamp();
        let exp = iat + self.options.max_age.as_secs() as i64;
        let claims = json!({
            "ctx": ctx,
            "iat": iat,
            "exp": exp,
            "jti": Uuid::new_v4().to_string(),
            "iss": self.options.issuer,
            "aud": self.options.audience,
        });
        let jwt = self.signer.sign(&self.options, &claims)?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, jwt.as_bytes())
            .map_err(|_| ContextError::Encrypt)?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(&combined))
    }

    pub fn seal_value(&self, ctx: &Value) -> Result<String, ContextError> {
        self.seal_at(ctx, Utc::now())
    }

    pub fn open_value(&self, token: &str) -> Result<Value, ContextError> {
        let combined = general_purpose::URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| ContextError::Malformed)?;
        if combined.len() <= NONCE_LEN {
            return Err(ContextError::Truncated);
        }

        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ContextError::Decrypt)?;
        let jwt = String::from_utf8(plaintext).map_err(|_| ContextError::Malformed)?;

        let mut claims = self.signer.verify(&self.options, &jwt)?;
        if claims.get("jti").and_then(Value::as_str).is_none() {
            return Err(ContextError::Jwt("missing jti".into()));
        }
        match claims.get_mut("ctx").map(Value::take) {
            Some(ctx) => Ok(ctx),
            None => Err(ContextError::Jwt("missing ctx claim".into())),
        }
    }
}

impl ContextCodec for JwtContextCodec {
    fn seal(&self, ctx: &Value) -> anyhow::Result<String> {
        Ok(self.seal_value(ctx)?)
    }

    fn open(&self, token: &str) -> anyhow::Result<Value> {
        self.open_value(token).map_err(|e| {
            tracing::debug!(error = %e, "rejected context token");
            e.into()
        })
    }
}
