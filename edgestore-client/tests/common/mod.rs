#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use edgestore_client::{
    ClientError, ClientResult, EdgeStoreApi, EdgeStoreClient, ProgressSink, PutRequest,
    PutResponse, UploadTransport,
};
use edgestore_core::{
    CompleteMultipartUploadBody, ConfirmUploadBody, DeleteFileBody, EdgeStoreError, Metadata,
    MultipartHandle, PartUrl, RequestUploadBody, RequestUploadPartsBody, RequestUploadPartsResult,
    RequestUploadResult, SignedParts, SuccessResult, UploadTarget,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct FakeApi {
    /// `(part_size, presigned)`: files larger than `part_size` go multipart
    pub multipart: Option<(u64, u32)>,
    pub max_size: Option<u64>,
    pub requested: Mutex<Vec<RequestUploadBody>>,
    pub part_requests: Mutex<Vec<Vec<u32>>>,
    pub completed: Mutex<Vec<CompleteMultipartUploadBody>>,
    pub deleted: Mutex<Vec<String>>,
}

fn part_url(size: u64, n: u32) -> PartUrl {
    PartUrl {
        part_number: n,
        upload_url: format!("mem://{size}/part/{n}"),
    }
}

#[async_trait]
impl EdgeStoreApi for FakeApi {
    async fn request_upload(&self, body: RequestUploadBody) -> ClientResult<RequestUploadResult> {
        let size = body.file_info.size;
        if let Some(max) = self.max_size.filter(|max| size > *max) {
            return Err(EdgeStoreError::file_too_large(max, size).into());
        }
        self.requested.lock().push(body);

        let target = match self.multipart {
            Some((part_size, presigned)) if size > part_size => {
                let total_parts = size.div_ceil(part_size) as u32;
                UploadTarget::Multipart {
                    multipart: MultipartHandle {
                        upload_id: format!("upl_{size}"),
                        key: format!("docs/{size}"),
                        part_size,
                        total_parts,
                        parts: (1..=presigned.min(total_parts)).map(|n| part_url(size, n)).collect(),
                    },
                }
            }
            _ => UploadTarget::Single {
                upload_url: format!("mem://{size}"),
            },
        };

        Ok(RequestUploadResult {
            target,
            access_url: format!("https://files.test/docs/{size}"),
            thumbnail_url: None,
            size,
            uploaded_at: Utc::now(),
            path: Vec::new(),
            metadata: Metadata::new(),
        })
    }

    async fn request_upload_parts(
        &self,
        body: RequestUploadPartsBody,
    ) -> ClientResult<RequestUploadPartsResult> {
        self.part_requests.lock().push(body.multipart.parts.clone());
        let size: u64 = body
            .path
            .trim_start_matches("docs/")
            .parse()
            .map_err(|_| EdgeStoreError::bad_request(format!("Unknown key {}", body.path)))?;
        Ok(RequestUploadPartsResult {
            multipart: SignedParts {
                upload_id: body.multipart.upload_id,
                parts: body.multipart.parts.iter().map(|n| part_url(size, *n)).collect(),
            },
        })
    }

    async fn complete_multipart_upload(&self, body: CompleteMultipartUploadBody) -> ClientResult<()> {
        self.completed.lock().push(body);
        Ok(())
    }

    async fn confirm_upload(&self, _body: ConfirmUploadBody) -> ClientResult<SuccessResult> {
        Ok(SuccessResult { success: true })
    }

    async fn delete_file(&self, body: DeleteFileBody) -> ClientResult<SuccessResult> {
        self.deleted.lock().push(body.url);
        Ok(SuccessResult { success: true })
    }
}

/// Scripted PUTs: reports each fraction of the body, sleeping `delay` between
/// steps, then either finishes or waits for cancellation.
#[derive(Default)]
pub struct FakeTransport {
    pub delay: Duration,
    pub script: Vec<f64>,
    pub block_until_cancel: bool,
    pub started: Mutex<Vec<String>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UploadTransport for FakeTransport {
    async fn put(
        &self,
        request: PutRequest,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> ClientResult<PutResponse> {
        self.started.lock().push(request.url.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let len = request.body.len() as f64;
        for frac in &self.script {
            progress((len * frac) as u64);
            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Aborted),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
        if self.block_until_cancel {
            cancel.cancelled().await;
            return Err(ClientError::Aborted);
        }
        progress(request.body.len() as u64);
        Ok(PutResponse {
            etag: Some(format!("\"{}\"", request.url)),
        })
    }
}

pub fn client(api: Arc<FakeApi>, transport: Arc<FakeTransport>) -> EdgeStoreClient {
    EdgeStoreClient::new(api, transport)
}

/// Poll until `check` holds; panics after a second.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}
