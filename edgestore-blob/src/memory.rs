//! In-process blob store.
//!
//! Behaves like an S3 bucket with presigned URLs: [`MemoryStore::receive_put`]
//! plays the role of the object store's HTTP endpoint, accepting the bytes a
//! client sends to a signed URL.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::StreamExt;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::store::{
    BlobStore, MultipartBlobStore, MultipartPlan, ObjectHead, PartETag, PutResult,
    SignedUrlBlobStore,
};
use crate::{BlobError, BlobResult, ByteStream, ObjectMetadata, PutOptions, UploadId};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Bytes,
    content_type: Option<String>,
    etag: String,
    last_modified: i64,
    metadata: ObjectMetadata,
}

#[derive(Debug, Clone)]
enum GrantTarget {
    Object(PutOptions),
    Part { upload_id: UploadId, part_number: u32 },
}

#[derive(Debug, Clone)]
struct Grant {
    key: String,
    target: GrantTarget,
    expires_at: i64,
}

#[derive(Debug)]
struct Session {
    key: String,
    options: PutOptions,
    plan: MultipartPlan,
    parts: BTreeMap<u32, (Bytes, String)>,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<String, StoredObject>,
    grants: HashMap<String, Grant>,
    sessions: HashMap<UploadId, Session>,
}

#[derive(Debug)]
pub struct MemoryStore {
    base_url: String,
    state: RwLock<State>,
}

impl MemoryStore {
    /// `base_url` must match the provider's so signed URLs resolve back to keys.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            state: RwLock::new(State::default()),
        }
    }

    /// Accept the body of a PUT to a URL signed by this store.
    pub async fn receive_put(&self, url: &str, body: Bytes) -> BlobResult<PutResult> {
        let (path, query) = url.split_once('?').ok_or(BlobError::BadSignature)?;
        let signature = query
            .split('&')
            .find_map(|kv| kv.strip_prefix("signature="))
            .ok_or(BlobError::BadSignature)?;

        let grant = self
            .state
            .read()
            .grants
            .get(signature)
            .cloned()
            .ok_or(BlobError::BadSignature)?;

        if grant.expires_at < Utc::now().timestamp() {
            self.state.write().grants.remove(signature);
            return Err(BlobError::BadSignature);
        }
        if path != self.url_for(&grant.key) {
            return Err(BlobError::BadSignature);
        }

        let stream: ByteStream = Box::pin(futures::stream::once(async move { Ok(body) }));
        match grant.target {
            GrantTarget::Object(options) => {
                let put = self.put(&grant.key, options, stream).await?;
                // object URLs are single use; part URLs live until the session ends
                self.state.write().grants.remove(signature);
                Ok(put)
            }
            GrantTarget::Part {
                upload_id,
                part_number,
            } => {
                let part = self.put_part(&upload_id, part_number, stream).await?;
                let size_bytes = self
                    .state
                    .read()
                    .sessions
                    .get(&upload_id)
                    .and_then(|s| s.parts.get(&part_number))
                    .map(|(b, _)| b.len() as u64)
                    .unwrap_or(0);
                Ok(PutResult {
                    etag: Some(part.etag),
                    size_bytes,
                })
            }
        }
    }

    pub fn get_bytes(&self, key: &str) -> BlobResult<Bytes> {
        self.state
            .read()
            .objects
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| BlobError::not_found(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.read().objects.contains_key(key)
    }

    pub fn open_sessions(&self) -> usize {
        self.state.read().sessions.len()
    }

    /// Signed URLs that can still be used.
    pub fn live_grants(&self) -> usize {
        self.state.read().grants.len()
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn grant(&self, key: &str, target: GrantTarget, expires_in_secs: u64) -> String {
        let signature = Uuid::new_v4().simple().to_string();
        let now = Utc::now().timestamp();
        let expires_at = now + expires_in_secs as i64;
        let mut state = self.state.write();
        state.grants.retain(|_, g| g.expires_at >= now);
        state.grants.insert(
            signature.clone(),
            Grant {
                key: key.to_string(),
                target,
                expires_at,
            },
        );
        signature
    }
}

async fn collect(mut stream: ByteStream) -> BlobResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

fn etag_of(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("\"{:016x}\"", hasher.finish())
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put(&self, key: &str, options: PutOptions, stream: ByteStream) -> BlobResult<PutResult> {
        let bytes = collect(stream).await?;
        let etag = etag_of(&bytes);
        let size_bytes = bytes.len() as u64;
        self.state.write().objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: options.content_type,
                etag: etag.clone(),
                last_modified: Utc::now().timestamp_millis(),
                metadata: options.metadata,
            },
        );
        Ok(PutResult {
            etag: Some(etag),
            size_bytes,
        })
    }

    async fn head(&self, key: &str) -> BlobResult<ObjectHead> {
        let state = self.state.read();
        let obj = state.objects.get(key).ok_or_else(|| BlobError::not_found(key))?;
        Ok(ObjectHead {
            size_bytes: obj.bytes.len() as u64,
            content_type: obj.content_type.clone(),
            etag: Some(obj.etag.clone()),
            last_modified: Some(obj.last_modified),
            metadata: obj.metadata.clone(),
        })
    }

    async fn set_metadata(&self, key: &str, metadata: ObjectMetadata) -> BlobResult<()> {
        let mut state = self.state.write();
        let obj = state
            .objects
            .get_mut(key)
            .ok_or_else(|| BlobError::not_found(key))?;
        obj.metadata = metadata;
        Ok(())
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.state
            .write()
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BlobError::not_found(key))
    }
}

#[async_trait]
impl MultipartBlobStore for MemoryStore {
    async fn init_multipart(
        &self,
        key: &str,
        options: PutOptions,
        plan: MultipartPlan,
    ) -> BlobResult<UploadId> {
        if plan.total_parts == 0 {
            return Err(BlobError::invalid("A multipart upload needs at least one part"));
        }
        let upload_id = UploadId::new();
        self.state.write().sessions.insert(
            upload_id.clone(),
            Session {
                key: key.to_string(),
                options,
                plan,
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn put_part(
        &self,
        upload_id: &UploadId,
        part_number: u32,
        stream: ByteStream,
    ) -> BlobResult<PartETag> {
        if part_number == 0 {
            return Err(BlobError::invalid("Part numbers start at 1"));
        }
        let bytes = collect(stream).await?;
        let etag = etag_of(&bytes);

        let mut state = self.state.write();
        let session = state
            .sessions
            .get_mut(upload_id)
            .ok_or_else(|| BlobError::upload_not_found(upload_id.as_str()))?;
        if part_number > session.plan.total_parts {
            return Err(BlobError::invalid(format!(
                "Part {part_number} is beyond the planned {} parts",
                session.plan.total_parts
            )));
        }
        session.parts.insert(part_number, (bytes, etag.clone()));
        Ok(PartETag { part_number, etag })
    }

    async fn complete_multipart(
        &self,
        upload_id: &UploadId,
        key: &str,
        parts: Vec<PartETag>,
    ) -> BlobResult<PutResult> {
        let mut state = self.state.write();
        let session = state
            .sessions
            .get(upload_id)
            .ok_or_else(|| BlobError::upload_not_found(upload_id.as_str()))?;

        if session.key != key {
            return Err(BlobError::invalid("Key does not match the multipart upload"));
        }
        if parts.is_empty() {
            return Err(BlobError::invalid("No parts listed"));
        }
        let planned = session.plan.total_parts;

        let mut assembled = BytesMut::new();
        for (idx, part) in parts.iter().enumerate() {
            let expected = idx as u32 + 1;
            if part.part_number != expected {
                return Err(BlobError::invalid(format!("Missing part {expected}")));
            }
            match session.parts.get(&part.part_number) {
                Some((bytes, etag)) if *etag == part.etag => assembled.extend_from_slice(bytes),
                Some(_) => {
                    return Err(BlobError::invalid(format!(
                        "ETag mismatch for part {}",
                        part.part_number
                    )))
                }
                None => {
                    return Err(BlobError::invalid(format!(
                        "Part {} was never uploaded",
                        part.part_number
                    )))
                }
            }
        }
        if parts.len() as u32 != planned {
            let listed = parts.len() as u32;
            return Err(BlobError::invalid(if listed < planned {
                format!("Missing part {}", listed + 1)
            } else {
                format!("Listed {listed} parts but only {planned} were planned")
            }));
        }
        if assembled.len() as u64 != session.plan.size_bytes {
            return Err(BlobError::invalid(format!(
                "Assembled {} bytes but {} were declared",
                assembled.len(),
                session.plan.size_bytes
            )));
        }

        let Some(session) = state.sessions.remove(upload_id) else {
            return Err(BlobError::upload_not_found(upload_id.as_str()));
        };
        let bytes = assembled.freeze();
        let etag = format!("{}-{}", etag_of(&bytes).trim_matches('"'), parts.len());
        let size_bytes = bytes.len() as u64;
        state.objects.insert(
            session.key,
            StoredObject {
                bytes,
                content_type: session.options.content_type,
                etag: etag.clone(),
                last_modified: Utc::now().timestamp_millis(),
                metadata: session.options.metadata,
            },
        );
        state.grants.retain(|_, g| match &g.target {
            GrantTarget::Part { upload_id: id, .. } => id != upload_id,
            GrantTarget::Object(_) => true,
        });
        Ok(PutResult {
            etag: Some(etag),
            size_bytes,
        })
    }

    async fn abort_multipart(&self, upload_id: &UploadId) -> BlobResult<()> {
        let mut state = self.state.write();
        state
            .sessions
            .remove(upload_id)
            .ok_or_else(|| BlobError::upload_not_found(upload_id.as_str()))?;
        state.grants.retain(|_, g| match &g.target {
            GrantTarget::Part { upload_id: id, .. } => id != upload_id,
            GrantTarget::Object(_) => true,
        });
        Ok(())
    }
}

#[async_trait]
impl SignedUrlBlobStore for MemoryStore {
    async fn sign_put(&self, key: &str, options: PutOptions, expires_in_secs: u64) -> BlobResult<String> {
        let signature = self.grant(key, GrantTarget::Object(options), expires_in_secs);
        Ok(format!("{}?signature={signature}", self.url_for(key)))
    }

    async fn sign_part(
        &self,
        key: &str,
        upload_id: &UploadId,
        part_number: u32,
        expires_in_secs: u64,
    ) -> BlobResult<String> {
        {
            let state = self.state.read();
            let session = state
                .sessions
                .get(upload_id)
                .ok_or_else(|| BlobError::upload_not_found(upload_id.as_str()))?;
            if session.key != key {
                return Err(BlobError::invalid("Key does not match the multipart upload"));
            }
            if part_number == 0 || part_number > session.plan.total_parts {
                return Err(BlobError::invalid(format!(
                    "Invalid part number: {part_number} (must be 1-{})",
                    session.plan.total_parts
                )));
            }
        }
        let signature = self.grant(
            key,
            GrantTarget::Part {
                upload_id: upload_id.clone(),
                part_number,
            },
            expires_in_secs,
        );
        Ok(format!(
            "{}?uploadId={upload_id}&partNumber={part_number}&signature={signature}",
            self.url_for(key)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new("http://blobs.test/")
    }

    #[tokio::test]
    async fn signed_put_round_trip() {
        let s = store();
        let url = s
            .sign_put("docs/a.txt", PutOptions::new().with_content_type("text/plain"), 60)
            .await
            .unwrap();
        assert!(url.starts_with("http://blobs.test/docs/a.txt?signature="));

        assert_eq!(s.live_grants(), 1);
        s.receive_put(&url, Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(s.live_grants(), 0);
        assert_eq!(s.get_bytes("docs/a.txt").unwrap(), Bytes::from_static(b"hello"));
        assert!(matches!(
            s.receive_put(&url, Bytes::from_static(b"again")).await,
            Err(BlobError::BadSignature)
        ));
        let head = s.head("docs/a.txt").await.unwrap();
        assert_eq!(head.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn unknown_or_expired_signatures_are_refused() {
        let s = store();
        let err = s
            .receive_put("http://blobs.test/x?signature=nope", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::BadSignature));

        let url = s.sign_put("x", PutOptions::new(), 0).await.unwrap();
        s.state.write().grants.values_mut().for_each(|g| g.expires_at -= 10);
        assert!(matches!(
            s.receive_put(&url, Bytes::new()).await,
            Err(BlobError::BadSignature)
        ));
        assert!(!s.contains("x"));
    }

    #[tokio::test]
    async fn signing_sweeps_expired_grants() {
        let s = store();
        for n in 0..3 {
            s.sign_put(&format!("k{n}"), PutOptions::new(), 60).await.unwrap();
        }
        s.state.write().grants.values_mut().for_each(|g| g.expires_at -= 120);
        s.sign_put("fresh", PutOptions::new(), 60).await.unwrap();
        assert_eq!(s.live_grants(), 1);
    }

    #[tokio::test]
    async fn incomplete_multipart_never_becomes_visible() {
        let s = store();
        let plan = MultipartPlan { total_parts: 2, size_bytes: 4 };
        let id = s.init_multipart("big.bin", PutOptions::new(), plan).await.unwrap();
        let u1 = s.sign_part("big.bin", &id, 1, 60).await.unwrap();
        let r1 = s.receive_put(&u1, Bytes::from_static(b"aa")).await.unwrap();

        let err = s
            .complete_multipart(
                &id,
                "big.bin",
                vec![
                    PartETag { part_number: 1, etag: r1.etag.clone().unwrap() },
                    PartETag { part_number: 2, etag: "\"x\"".into() },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::Invalid { .. }));
        assert!(!s.contains("big.bin"));
        assert_eq!(s.open_sessions(), 1);

        s.abort_multipart(&id).await.unwrap();
        assert_eq!(s.open_sessions(), 0);
        assert!(!s.contains("big.bin"));
    }
}
