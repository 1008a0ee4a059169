//! Byte transfer to signed storage URLs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use reqwest::header::{CONTENT_TYPE, ETAG};
use tokio_util::sync::CancellationToken;

use crate::{ClientError, ClientResult};

const CHUNK_SIZE: usize = 64 * 1024;

/// Receives the number of bytes of the current request sent so far.
pub type ProgressSink = Arc<dyn Fn(u64) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct PutRequest {
    pub url: String,
    pub body: Bytes,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PutResponse {
    pub etag: Option<String>,
}

#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// PUT `request.body`. Must resolve to [`ClientError::Aborted`] once `cancel` fires.
    async fn put(
        &self,
        request: PutRequest,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> ClientResult<PutResponse>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl UploadTransport for ReqwestTransport {
    async fn put(
        &self,
        request: PutRequest,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> ClientResult<PutResponse> {
        let total = request.body.len();
        let sent = Arc::new(AtomicU64::new(0));

        // Progress is reported as chunks are pulled by the connection
        let chunks: Vec<Bytes> = (0..total)
            .step_by(CHUNK_SIZE)
            .map(|start| request.body.slice(start..(start + CHUNK_SIZE).min(total)))
            .collect();
        let counted = stream::iter(chunks.into_iter().map({
            let sent = Arc::clone(&sent);
            move |chunk| {
                let now = sent.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
                progress(now);
                Ok::<_, std::io::Error>(chunk)
            }
        }));

        let mut builder = self
            .http
            .put(&request.url)
            .header(reqwest::header::CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(counted));
        if let Some(ct) = &request.content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }

        let res = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Aborted),
            res = builder.send() => res?,
        };

        let status = res.status();
        if !status.is_success() {
            let message = res.text().await.unwrap_or_default();
            return Err(ClientError::Transfer {
                status: status.as_u16(),
                message,
            });
        }

        let etag = res
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        tracing::trace!(url = %request.url, bytes = total, "put complete");
        Ok(PutResponse { etag })
    }
}
