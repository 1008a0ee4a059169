// JWT signing backends.

use serde_json::Value;

use crate::error::ContextError;
use crate::options::JwtContextOptions;

pub trait JwtSigner: Send + Sync {
    fn sign(&self, options: &JwtContextOptions, claims: &Value) -> Result<String, ContextError>;

    /// Checks signature, `exp`, `iss` and `aud`; returns the claims.
    fn verify(&self, options: &JwtContextOptions, token: &str) -> Result<Value, ContextError>;
}

pub(crate) fn default_signer() -> std::sync::Arc<dyn JwtSigner> {
    #[cfg(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto"))]
    {
        std::sync::Arc::new(JsonwebtokenSigner)
    }
    #[cfg(not(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto")))]
    {
        std::sync::Arc::new(NoJwtSigner)
    }
}

#[cfg(not(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto")))]
struct NoJwtSigner;

#[cfg(not(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto")))]
impl JwtSigner for NoJwtSigner {
    fn sign(&self, _options: &JwtContextOptions, _claims: &Value) -> Result<String, ContextError> {
        Err(ContextError::Disabled)
    }

    fn verify(&self, _options: &JwtContextOptions, _token: &str) -> Result<Value, ContextError> {
        Err(ContextError::Disabled)
    }
}

#[cfg(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto"))]
struct JsonwebtokenSigner;

#[cfg(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto"))]
impl JsonwebtokenSigner {
    fn algorithm(alg: crate::options::JwtAlgorithm) -> jsonwebtoken::Algorithm {
        use crate::options::JwtAlgorithm;
        match alg {
            JwtAlgorithm::HS256 => jsonwebtoken::Algorithm::HS256,
            JwtAlgorithm::HS384 => jsonwebtoken::Algorithm::HS384,
            JwtAlgorithm::HS512 => jsonwebtoken::Algorithm::HS512,
        }
    }
}

#[cfg(any(feature = "jwt-aws-lc-rs", feature = "jwt-rust-crypto"))]
impl JwtSigner for JsonwebtokenSigner {
    fn sign(&self, options: &JwtContextOptions, claims: &Value) -> Result<String, ContextError> {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let header = Header::new(Self::algorithm(options.algorithm));
        encode(&header, claims, &EncodingKey::from_secret(&options.signing_key))
            .map_err(|e| ContextError::Jwt(e.to_string()))
    }

    fn verify(&self, options: &JwtContextOptions, token: &str) -> Result<Value, ContextError> {
        use jsonwebtoken::{decode, DecodingKey, Validation};

        let mut validation = Validation::new(Self::algorithm(options.algorithm));
        validation.leeway = 0;
        validation.set_issuer(&[options.issuer.as_str()]);
        validation.set_audience(&options.audience.iter().map(String::as_str).collect::<Vec<_>>());
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let decoded = decode::<Value>(token, &DecodingKey::from_secret(&options.signing_key), &validation)
            .map_err(|e| ContextError::Jwt(e.to_string()))?;
        Ok(decoded.claims)
    }
}
