//! Uploader state machine.
//!
//! ```text
//! PENDING --upload_files--> UPLOADING --ok--> COMPLETE
//!                              |  \--error--> ERROR
//!                              \--abort--> PENDING (or removed when auto-uploaded)
//! ```
//!
//! All state lives in one `watch` channel holding every [`FileState`]. Each
//! transfer only ever writes its own key. Concurrency is bounded by an
//! [`UploadGate`] shared by all transfers of this uploader; a transfer takes
//! its ticket when it is started, so admission follows the order files were
//! started in.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::{BucketClient, UploadFile, UploadOptions};
use crate::gate::{Ticket, UploadGate};
use crate::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileState {
    pub key: String,
    pub file: UploadFile,
    /// 0..=100, two decimals
    pub progress: f64,
    pub status: UploadStatus,
    pub url: Option<String>,
    pub error: Option<String>,
    pub auto_upload: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UploaderConfig {
    pub max_concurrent_uploads: Option<usize>,
    pub auto_upload: bool,
}

impl UploaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent_uploads(mut self, n: usize) -> Self {
        self.max_concurrent_uploads = Some(n);
        self
    }

    pub fn auto_upload(mut self) -> Self {
        self.auto_upload = true;
        self
    }
}

pub type FileProgressFn = Arc<dyn Fn(&str, f64) + Send + Sync>;

struct Inner {
    bucket: BucketClient,
    config: UploaderConfig,
    input: Value,
    gate: Arc<UploadGate>,
    files: watch::Sender<Vec<FileState>>,
    controllers: Mutex<HashMap<String, CancellationToken>>,
    on_progress: Option<FileProgressFn>,
}

#[derive(Clone)]
pub struct Uploader {
    inner: Arc<Inner>,
}

impl fmt::Debug for Uploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Uploader")
            .field("bucket", &self.inner.bucket.name())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

pub struct UploaderBuilder {
    bucket: BucketClient,
    config: UploaderConfig,
    input: Value,
    on_progress: Option<FileProgressFn>,
}

impl UploaderBuilder {
    pub fn config(mut self, config: UploaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Bucket input sent with every upload.
    pub fn input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    /// Raw progress events, per file key, before rounding.
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, f64) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Uploader {
        let (files, _) = watch::channel(Vec::new());
        Uploader {
            inner: Arc::new(Inner {
                gate: UploadGate::new(self.config.max_concurrent_uploads),
                bucket: self.bucket,
                config: self.config,
                input: self.input,
                files,
                controllers: Mutex::new(HashMap::new()),
                on_progress: self.on_progress,
            }),
        }
    }
}

impl Uploader {
    pub fn new(bucket: BucketClient, config: UploaderConfig) -> Self {
        Self::builder(bucket).config(config).build()
    }

    pub fn builder(bucket: BucketClient) -> UploaderBuilder {
        UploaderBuilder {
            bucket,
            config: UploaderConfig::default(),
            input: Value::Null,
            on_progress: None,
        }
    }

    pub fn files(&self) -> Vec<FileState> {
        self.inner.files.borrow().clone()
    }

    pub fn file(&self, key: &str) -> Option<FileState> {
        self.inner.files.borrow().iter().find(|f| f.key == key).cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<FileState>> {
        self.inner.files.subscribe()
    }

    /// Register files as PENDING and return their keys. With `auto_upload`
    /// they are started immediately, in the given order.
    ///
    /// Auto-upload spawns onto the current Tokio runtime.
    pub fn add_files(&self, files: Vec<UploadFile>) -> Vec<String> {
        let auto = self.inner.config.auto_upload;
        let added: Vec<FileState> = files
            .into_iter()
            .map(|file| FileState {
                key: new_key(&file.name),
                file,
                progress: 0.0,
                status: UploadStatus::Pending,
                url: None,
                error: None,
                auto_upload: auto,
            })
            .collect();
        let keys: Vec<String> = added.iter().map(|f| f.key.clone()).collect();

        self.inner.files.send_modify(|all| all.extend(added));
        tracing::debug!(count = keys.len(), auto, "files added");

        if auto {
            // Detached; progress and results land in the registry
            self.start(Some(&keys));
        }
        keys
    }

    /// Upload every PENDING file (or only those in `keys`) concurrently and
    /// wait for all of them to settle.
    pub async fn upload_files(&self, keys: Option<&[String]>) {
        let handles = self.start(keys);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "upload task failed");
            }
        }
    }

    /// Abort a running transfer. Does nothing unless the file is UPLOADING
    /// below 100%.
    pub fn cancel_upload(&self, key: &str) -> bool {
        let cancellable = self
            .file(key)
            .is_some_and(|f| f.status == UploadStatus::Uploading && f.progress < 100.0);
        if !cancellable {
            return false;
        }
        match self.inner.controllers.lock().get(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove_file(&self, key: &str) {
        self.inner.files.send_if_modified(|all| {
            let before = all.len();
            all.retain(|f| f.key != key);
            all.len() != before
        });
    }

    pub fn reset_files(&self) {
        self.inner.files.send_modify(Vec::clear);
    }

    /// Resolve once no file is UPLOADING.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `inner`, so the channel cannot close here
        let _ = rx
            .wait_for(|all| all.iter().all(|f| f.status != UploadStatus::Uploading))
            .await;
    }

    /// Claim the selected PENDING files in one registry update, so a file is
    /// never started twice by racing callers.
    fn start(&self, keys: Option<&[String]>) -> Vec<JoinHandle<()>> {
        let inner = &self.inner;
        let mut claimed: Vec<(FileState, Ticket, CancellationToken)> = Vec::new();
        inner.files.send_if_modified(|all| {
            let selected = all
                .iter_mut()
                .filter(|f| f.status == UploadStatus::Pending)
                .filter(|f| keys.map_or(true, |keys| keys.contains(&f.key)));
            for f in selected {
                f.status = UploadStatus::Uploading;
                f.progress = 0.0;
                f.error = None;

                let cancel = CancellationToken::new();
                inner.controllers.lock().insert(f.key.clone(), cancel.clone());
                claimed.push((f.clone(), inner.gate.ticket(), cancel));
            }
            !claimed.is_empty()
        });

        claimed
            .into_iter()
            .map(|(state, ticket, cancel)| {
                tokio::spawn(run_upload(Arc::clone(inner), state, ticket, cancel))
            })
            .collect()
    }
}

async fn run_upload(inner: Arc<Inner>, state: FileState, ticket: Ticket, cancel: CancellationToken) {
    let key = state.key.clone();

    let result = tokio::select! {
        _ = cancel.cancelled() => Err(ClientError::Aborted),
        permit = ticket.admit() => {
            tracing::debug!(key = %key, "upload admitted");
            let options = UploadOptions::new()
                .with_input(inner.input.clone())
                .with_cancel(cancel.clone())
                .on_progress({
                    let inner = Arc::clone(&inner);
                    let key = key.clone();
                    move |pct| record_progress(&inner, &key, pct)
                });
            let res = inner.bucket.upload(&state.file, options).await;
            drop(permit);
            res
        }
    };

    inner.controllers.lock().remove(&key);

    match result {
        Ok(uploaded) => {
            record_progress(&inner, &key, 100.0);
            update_file_state(&inner, &key, |f| {
                f.status = UploadStatus::Complete;
                f.url = Some(uploaded.url);
            });
            tracing::info!(key = %key, "upload complete");
        }
        Err(e) if e.is_aborted() => {
            if state.auto_upload {
                inner.files.send_if_modified(|all| {
                    let before = all.len();
                    all.retain(|f| f.key != key);
                    all.len() != before
                });
            } else {
                update_file_state(&inner, &key, |f| {
                    f.status = UploadStatus::Pending;
                    f.progress = 0.0;
                });
            }
            tracing::debug!(key = %key, "upload aborted");
        }
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "upload failed");
            update_file_state(&inner, &key, |f| {
                f.status = UploadStatus::Error;
                f.progress = 0.0;
                f.error = Some(e.to_string());
            });
        }
    }
}

fn record_progress(inner: &Inner, key: &str, pct: f64) {
    if let Some(cb) = &inner.on_progress {
        cb(key, pct);
    }
    let rounded = round_progress(pct);
    inner.files.send_if_modified(|all| {
        match all.iter_mut().find(|f| f.key == key) {
            Some(f) if f.status == UploadStatus::Uploading && rounded > f.progress => {
                f.progress = rounded;
                true
            }
            _ => false,
        }
    });
}

/// Shallow update of one file; unknown keys are ignored.
fn update_file_state(inner: &Inner, key: &str, apply: impl FnOnce(&mut FileState)) {
    inner.files.send_if_modified(|all| match all.iter_mut().find(|f| f.key == key) {
        Some(f) => {
            apply(f);
            true
        }
        None => false,
    });
}

fn round_progress(pct: f64) -> f64 {
    (pct.clamp(0.0, 100.0) * 100.0).round() / 100.0
}

fn new_key(name: &str) -> String {
    let salt: u32 = rand::thread_rng().gen();
    format!("{}-{}-{:08x}", name, Utc::now().timestamp_millis(), salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_rounded_to_two_decimals() {
        assert_eq!(round_progress(100.0 / 3.0), 33.33);
        assert_eq!(round_progress(66.666), 66.67);
        assert_eq!(round_progress(120.0), 100.0);
        assert_eq!(round_progress(-1.0), 0.0);
    }

    #[test]
    fn keys_are_unique_per_add() {
        let a = new_key("cat.png");
        let b = new_key("cat.png");
        assert!(a.starts_with("cat.png-"));
        assert_ne!(a, b);
    }
}
