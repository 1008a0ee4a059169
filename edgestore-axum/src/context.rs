use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, Uri};

use crate::cookies;

/// What the application sees of the `/init` request when building its context.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    pub raw_query: Option<String>,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
}

impl RequestInfo {
    pub fn from_parts(method: &Method, uri: &Uri, headers: &HeaderMap) -> Self {
        let mut out = Self {
            method: method.to_string(),
            path: uri.path().to_string(),
            raw_query: uri.query().map(|s| s.to_string()),
            headers: HashMap::new(),
            cookies: cookies::parse(headers),
        };

        for (k, v) in headers.iter() {
            if let Ok(s) = v.to_str() {
                out.headers.insert(k.to_string(), s.to_string());
            }
        }

        out
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// Application factory for the session context sealed at `/init`.
///
/// Any error becomes `CREATE_CONTEXT_ERROR`.
#[async_trait]
pub trait CreateContext<C>: Send + Sync {
    async fn create(&self, request: RequestInfo) -> anyhow::Result<C>;
}

#[async_trait]
impl<C, F, Fut> CreateContext<C> for F
where
    C: Send + 'static,
    F: Fn(RequestInfo) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<C>> + Send + 'static,
{
    async fn create(&self, request: RequestInfo) -> anyhow::Result<C> {
        (self)(request).await
    }
}
