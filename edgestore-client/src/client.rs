use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use edgestore_core::{
    CompleteMultipartUploadBody, CompletedPart, ConfirmUploadBody, DeleteFileBody, FileInfo,
    Metadata, MultipartHandle, PartsRequest, PathValue, RequestUploadBody, RequestUploadPartsBody,
    SuccessResult, UploadTarget,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::api::{EdgeStoreApi, HttpApi};
use crate::transport::{ProgressSink, PutRequest, ReqwestTransport, UploadTransport};
use crate::{ClientError, ClientResult};

/// Percentage of the whole file, not rounded.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// A file held in memory, ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Text after the last `.` of the name; empty when there is none.
    pub fn extension(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext,
            _ => "",
        }
    }
}

#[derive(Clone, Default)]
pub struct UploadOptions {
    pub input: Value,
    pub temporary: bool,
    pub replace_target_url: Option<String>,
    pub manual_file_name: Option<String>,
    pub on_progress: Option<ProgressFn>,
    pub cancel: Option<CancellationToken>,
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("input", &self.input)
            .field("temporary", &self.temporary)
            .field("replace_target_url", &self.replace_target_url)
            .field("manual_file_name", &self.manual_file_name)
            .finish_non_exhaustive()
    }
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn replacing(mut self, url: impl Into<String>) -> Self {
        self.replace_target_url = Some(url.into());
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.manual_file_name = Some(name.into());
        self
    }

    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub path: Vec<PathValue>,
    pub metadata: Metadata,
}

#[derive(Clone)]
pub struct EdgeStoreClient {
    api: Arc<dyn EdgeStoreApi>,
    transport: Arc<dyn UploadTransport>,
}

impl EdgeStoreClient {
    pub fn new(api: Arc<dyn EdgeStoreApi>, transport: Arc<dyn UploadTransport>) -> Self {
        Self { api, transport }
    }

    /// reqwest API and transport against `base_url`, e.g. `http://localhost:3000/api/edgestore`.
    /// Does not call `/init`; see [`EdgeStoreClient::connect`].
    pub fn http(base_url: impl Into<String>) -> ClientResult<Self> {
        Ok(Self::new(
            Arc::new(HttpApi::new(base_url)?),
            Arc::new(ReqwestTransport::new()),
        ))
    }

    /// Like [`EdgeStoreClient::http`], after calling `/init` so the context cookie is set.
    pub async fn connect(base_url: impl Into<String>) -> ClientResult<Self> {
        let api = HttpApi::new(base_url)?;
        let init = api.init().await?;
        tracing::debug!(base_url = %init.base_url, "edgestore session initialised");
        Ok(Self::new(Arc::new(api), Arc::new(ReqwestTransport::new())))
    }

    pub fn bucket(&self, name: impl Into<String>) -> BucketClient {
        BucketClient {
            name: name.into(),
            api: Arc::clone(&self.api),
            transport: Arc::clone(&self.transport),
        }
    }
}

#[derive(Clone)]
pub struct BucketClient {
    name: String,
    api: Arc<dyn EdgeStoreApi>,
    transport: Arc<dyn UploadTransport>,
}

impl fmt::Debug for BucketClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketClient").field("name", &self.name).finish_non_exhaustive()
    }
}

impl BucketClient {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn upload(&self, file: &UploadFile, options: UploadOptions) -> ClientResult<UploadedFile> {
        let cancel = options.cancel.clone().unwrap_or_default();
        if cancel.is_cancelled() {
            return Err(ClientError::Aborted);
        }

        let res = self
            .api
            .request_upload(RequestUploadBody {
                bucket_name: self.name.clone(),
                input: options.input.clone(),
                file_info: FileInfo {
                    size: file.size(),
                    mime_type: file.mime_type.clone(),
                    extension: file.extension().to_string(),
                    file_name: options.manual_file_name.clone(),
                    replace_target_url: options.replace_target_url.clone(),
                    temporary: options.temporary,
                },
            })
            .await?;

        let total = file.size();
        let report = options.on_progress.clone();
        let progress_at = move |offset: u64| -> ProgressSink {
            let report = report.clone();
            Arc::new(move |sent: u64| {
                if let Some(report) = &report {
                    let pct = if total == 0 {
                        100.0
                    } else {
                        (offset + sent) as f64 * 100.0 / total as f64
                    };
                    report(pct.min(100.0));
                }
            })
        };

        match res.target {
            UploadTarget::Single { upload_url } => {
                self.transport
                    .put(
                        PutRequest {
                            url: upload_url,
                            body: file.bytes.clone(),
                            content_type: Some(file.mime_type.clone()),
                        },
                        progress_at(0),
                        cancel.clone(),
                    )
                    .await?;
            }
            UploadTarget::Multipart { multipart } => {
                self.upload_parts(file, multipart, &progress_at, &cancel).await?;
            }
        }

        tracing::debug!(bucket = %self.name, url = %res.access_url, size = total, "upload finished");
        Ok(UploadedFile {
            url: res.access_url,
            thumbnail_url: res.thumbnail_url,
            size: res.size,
            uploaded_at: res.uploaded_at,
            path: res.path,
            metadata: res.metadata,
        })
    }

    async fn upload_parts(
        &self,
        file: &UploadFile,
        handle: MultipartHandle,
        progress_at: &(dyn Fn(u64) -> ProgressSink + Send + Sync),
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        let total = file.size();
        let batch = handle.parts.len().max(1) as u32;
        let mut urls: BTreeMap<u32, String> = handle
            .parts
            .into_iter()
            .map(|p| (p.part_number, p.upload_url))
            .collect();
        let mut completed = Vec::with_capacity(handle.total_parts as usize);

        for part_number in 1..=handle.total_parts {
            if !urls.contains_key(&part_number) {
                let wanted: Vec<u32> = (part_number..=handle.total_parts)
                    .filter(|n| !urls.contains_key(n))
                    .take(batch as usize)
                    .collect();
                let more = self
                    .api
                    .request_upload_parts(RequestUploadPartsBody {
                        multipart: PartsRequest {
                            upload_id: handle.upload_id.clone(),
                            parts: wanted,
                        },
                        path: handle.key.clone(),
                    })
                    .await?;
                urls.extend(more.multipart.parts.into_iter().map(|p| (p.part_number, p.upload_url)));
            }
            let url = urls
                .remove(&part_number)
                .ok_or(ClientError::MissingPartUrl(part_number))?;

            let start = (u64::from(part_number - 1) * handle.part_size).min(total);
            let end = (start + handle.part_size).min(total);
            let put = self
                .transport
                .put(
                    PutRequest {
                        url,
                        body: file.bytes.slice(start as usize..end as usize),
                        content_type: None,
                    },
                    progress_at(start),
                    cancel.clone(),
                )
                .await?;
            completed.push(CompletedPart {
                part_number,
                e_tag: put.etag.ok_or(ClientError::MissingETag(part_number))?,
            });
        }

        if cancel.is_cancelled() {
            return Err(ClientError::Aborted);
        }
        self.api
            .complete_multipart_upload(CompleteMultipartUploadBody {
                bucket_name: Some(self.name.clone()),
                upload_id: handle.upload_id,
                key: handle.key,
                parts: completed,
            })
            .await
    }

    /// Mark a temporary upload as permanent.
    pub async fn confirm_upload(&self, url: impl Into<String>) -> ClientResult<SuccessResult> {
        self.api
            .confirm_upload(ConfirmUploadBody {
                bucket_name: self.name.clone(),
                url: url.into(),
            })
            .await
    }

    pub async fn delete(&self, url: impl Into<String>) -> ClientResult<SuccessResult> {
        self.api
            .delete_file(DeleteFileBody {
                bucket_name: self.name.clone(),
                url: url.into(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_comes_from_the_name() {
        assert_eq!(UploadFile::new("a.tar.gz", "x", Bytes::new()).extension(), "gz");
        assert_eq!(UploadFile::new(".env", "x", Bytes::new()).extension(), "");
        assert_eq!(UploadFile::new("README", "x", Bytes::new()).extension(), "");
    }
}
