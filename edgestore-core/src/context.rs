//! Sealing of the session context cookie.

use anyhow::Result;
use serde_json::Value;

/// Turns a serialized context into an opaque cookie value and back.
///
/// Implementations must authenticate the token and reject expired ones;
/// `open` failing is reported to clients as `UNAUTHORIZED`.
pub trait ContextCodec: Send + Sync {
    fn seal(&self, ctx: &Value) -> Result<String>;

    fn open(&self, token: &str) -> Result<Value>;
}
