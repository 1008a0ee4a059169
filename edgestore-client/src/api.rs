//! The EdgeStore HTTP contract as seen from the client.

use async_trait::async_trait;
use edgestore_core::{
    CompleteMultipartUploadBody, ConfirmUploadBody, DeleteFileBody, EdgeStoreError, InitResponse,
    RequestUploadBody, RequestUploadPartsBody, RequestUploadPartsResult, RequestUploadResult,
    SuccessResult,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{ClientError, ClientResult};

#[async_trait]
pub trait EdgeStoreApi: Send + Sync {
    async fn request_upload(&self, body: RequestUploadBody) -> ClientResult<RequestUploadResult>;

    async fn request_upload_parts(
        &self,
        body: RequestUploadPartsBody,
    ) -> ClientResult<RequestUploadPartsResult>;

    async fn complete_multipart_upload(&self, body: CompleteMultipartUploadBody) -> ClientResult<()>;

    async fn confirm_upload(&self, body: ConfirmUploadBody) -> ClientResult<SuccessResult>;

    async fn delete_file(&self, body: DeleteFileBody) -> ClientResult<SuccessResult>;
}

/// reqwest-backed API. Cookies set by `/init` are kept in the client's jar.
#[derive(Debug, Clone)]
pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self::with_client(http, base_url))
    }

    /// The client should have a cookie store, or `/init` cookies are lost.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn init(&self) -> ClientResult<InitResponse> {
        let res = self.http.post(self.endpoint("/init")).send().await?;
        Self::decode(Self::check(res).await?).await
    }

    pub async fn health(&self) -> ClientResult<bool> {
        let res = self.http.get(self.endpoint("/health")).send().await?;
        Ok(res.status().is_success())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> ClientResult<reqwest::Response> {
        let res = self.http.post(self.endpoint(path)).json(body).send().await?;
        Self::check(res).await
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> ClientResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        Self::decode(self.post(path, body).await?).await
    }

    async fn decode<R: DeserializeOwned>(res: reqwest::Response) -> ClientResult<R> {
        let bytes = res.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // Non-2xx bodies carry `{message, code, details?}`; anything else is a bare server error.
    async fn check(res: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let text = res.text().await.unwrap_or_default();
        let err = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(body) => EdgeStoreError::from_json(&body),
            Err(_) => EdgeStoreError::from_json(&serde_json::json!({ "message": text })),
        };
        tracing::debug!(status = status.as_u16(), code = err.code(), "edgestore request failed");
        Err(ClientError::Api(err))
    }
}

#[async_trait]
impl EdgeStoreApi for HttpApi {
    async fn request_upload(&self, body: RequestUploadBody) -> ClientResult<RequestUploadResult> {
        self.post_json("/request-upload", &body).await
    }

    async fn request_upload_parts(
        &self,
        body: RequestUploadPartsBody,
    ) -> ClientResult<RequestUploadPartsResult> {
        self.post_json("/request-upload-parts", &body).await
    }

    async fn complete_multipart_upload(&self, body: CompleteMultipartUploadBody) -> ClientResult<()> {
        self.post("/complete-multipart-upload", &body).await?;
        Ok(())
    }

    async fn confirm_upload(&self, body: ConfirmUploadBody) -> ClientResult<SuccessResult> {
        self.post_json("/confirm-upload", &body).await
    }

    async fn delete_file(&self, body: DeleteFileBody) -> ClientResult<SuccessResult> {
        self.post_json("/delete-file", &body).await
    }
}
