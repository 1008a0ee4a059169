use std::sync::Arc;

use bytes::Bytes;
use edgestore_blob::{is_temporary, BlobProvider, BlobProviderConfig, BlobStore, MemoryStore, UploadRules};
use edgestore_core::{
    CompleteMultipartUploadParams, CompletedPart, FileInfo, Metadata, PartsRequest, PathValue,
    Provider, RequestUploadParams, RequestUploadPartsParams, UploadTarget, BucketType,
};

const BASE: &str = "http://files.test";

fn provider(threshold: u64) -> BlobProvider<MemoryStore> {
    let store = Arc::new(MemoryStore::new(BASE));
    BlobProvider::new(
        store,
        BlobProviderConfig::new(BASE)
            .with_multipart_threshold(threshold)
            .with_upload_rules(UploadRules::new().with_part_size(4).with_presign_batch(2)),
    )
}

fn params(size: u64) -> RequestUploadParams {
    let mut metadata = Metadata::new();
    metadata.insert("kind".into(), "avatar".into());
    RequestUploadParams {
        bucket_name: "docs".into(),
        bucket_type: BucketType::File,
        is_public: false,
        path: vec![PathValue::new("owner", "u1")],
        metadata,
        file_info: FileInfo {
            size,
            mime_type: "text/plain".into(),
            extension: "txt".into(),
            file_name: None,
            replace_target_url: None,
            temporary: false,
        },
    }
}

#[tokio::test]
async fn single_put_then_lookup() {
    let p = provider(1024);
    let res = p.request_upload(params(5)).await.unwrap();
    assert!(res.access_url.starts_with("http://files.test/docs/u1/"));
    assert!(res.access_url.ends_with(".txt"));

    let UploadTarget::Single { upload_url } = res.target else {
        panic!("expected a single PUT");
    };
    p.store().receive_put(&upload_url, Bytes::from_static(b"hello")).await.unwrap();

    let record = p.get_file(&res.access_url).await.unwrap();
    assert_eq!(record.size, 5);
    assert_eq!(record.path, vec![PathValue::new("owner", "u1")]);
    assert_eq!(record.metadata.get("kind").map(String::as_str), Some("avatar"));

    assert!(p.delete_file(&res.access_url).await.unwrap().success);
    assert!(p.get_file(&res.access_url).await.is_err());
}

#[tokio::test]
async fn public_uploads_live_under_the_marker() {
    let p = provider(1024);
    let mut req = params(1);
    req.is_public = true;
    req.file_info.file_name = Some("report.txt".into());
    let res = p.request_upload(req).await.unwrap();
    assert_eq!(res.access_url, "http://files.test/docs/_public/u1/report.txt");
}

#[tokio::test]
async fn multipart_flow_with_late_part_urls() {
    let p = provider(8);
    let res = p.request_upload(params(10)).await.unwrap();
    let UploadTarget::Multipart { multipart } = res.target else {
        panic!("expected multipart");
    };
    assert_eq!(multipart.total_parts, 3);
    assert_eq!(multipart.part_size, 4);
    assert_eq!(multipart.parts.len(), 2);

    let more = p
        .request_upload_parts(RequestUploadPartsParams {
            multipart: PartsRequest {
                upload_id: multipart.upload_id.clone(),
                parts: vec![3],
            },
            key: multipart.key.clone(),
        })
        .await
        .unwrap();

    let mut urls = multipart.parts.clone();
    urls.extend(more.multipart.parts);
    let chunks: [&[u8]; 3] = [b"abcd", b"efgh", b"ij"];
    let mut done = Vec::new();
    for (part, chunk) in urls.iter().zip(chunks) {
        let put = p
            .store()
            .receive_put(&part.upload_url, Bytes::copy_from_slice(chunk))
            .await
            .unwrap();
        done.push(CompletedPart {
            part_number: part.part_number,
            e_tag: put.etag.unwrap(),
        });
    }

    // out of order on the wire is fine
    done.reverse();
    p.complete_multipart_upload(CompleteMultipartUploadParams {
        bucket_name: Some("docs".into()),
        upload_id: multipart.upload_id,
        key: multipart.key.clone(),
        parts: done,
    })
    .await
    .unwrap();

    assert_eq!(
        p.store().get_bytes(&multipart.key).unwrap(),
        Bytes::from_static(b"abcdefghij")
    );
}

#[tokio::test]
async fn completing_with_missing_parts_exposes_nothing() {
    let p = provider(8);
    let res = p.request_upload(params(10)).await.unwrap();
    let UploadTarget::Multipart { multipart } = res.target else {
        panic!("expected multipart");
    };
    let first = &multipart.parts[0];
    let put = p
        .store()
        .receive_put(&first.upload_url, Bytes::from_static(b"abcd"))
        .await
        .unwrap();

    let err = p
        .complete_multipart_upload(CompleteMultipartUploadParams {
            bucket_name: None,
            upload_id: multipart.upload_id.clone(),
            key: multipart.key.clone(),
            parts: vec![
                CompletedPart { part_number: 1, e_tag: put.etag.unwrap() },
                CompletedPart { part_number: 3, e_tag: "\"x\"".into() },
            ],
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Missing part 2"));
    assert!(!p.store().contains(&multipart.key));

    p.abort_multipart_upload(&multipart.upload_id).await.unwrap();
    assert_eq!(p.store().open_sessions(), 0);
}

#[tokio::test]
async fn completing_a_prefix_of_the_parts_is_refused() {
    let p = provider(8);
    let res = p.request_upload(params(12)).await.unwrap();
    let UploadTarget::Multipart { multipart } = res.target else {
        panic!("expected multipart");
    };
    assert_eq!(multipart.total_parts, 3);

    let put = p
        .store()
        .receive_put(&multipart.parts[0].upload_url, Bytes::from_static(b"aaaa"))
        .await
        .unwrap();
    let err = p
        .complete_multipart_upload(CompleteMultipartUploadParams {
            bucket_name: Some("docs".into()),
            upload_id: multipart.upload_id.clone(),
            key: multipart.key.clone(),
            parts: vec![CompletedPart { part_number: 1, e_tag: put.etag.unwrap() }],
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Missing part 2"), "{err}");
    assert!(!p.store().contains(&multipart.key));
    assert_eq!(p.store().open_sessions(), 1);
}

#[tokio::test]
async fn short_parts_do_not_add_up_to_the_declared_size() {
    let p = provider(8);
    let res = p.request_upload(params(10)).await.unwrap();
    let UploadTarget::Multipart { multipart } = res.target else {
        panic!("expected multipart");
    };
    let more = p
        .request_upload_parts(RequestUploadPartsParams {
            multipart: PartsRequest {
                upload_id: multipart.upload_id.clone(),
                parts: vec![3],
            },
            key: multipart.key.clone(),
        })
        .await
        .unwrap();

    let mut urls = multipart.parts.clone();
    urls.extend(more.multipart.parts);
    let mut done = Vec::new();
    for part in &urls {
        let put = p
            .store()
            .receive_put(&part.upload_url, Bytes::from_static(b"a"))
            .await
            .unwrap();
        done.push(CompletedPart {
            part_number: part.part_number,
            e_tag: put.etag.unwrap(),
        });
    }

    let err = p
        .complete_multipart_upload(CompleteMultipartUploadParams {
            bucket_name: None,
            upload_id: multipart.upload_id,
            key: multipart.key.clone(),
            parts: done,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("declared"), "{err}");
    assert!(!p.store().contains(&multipart.key));
}

#[tokio::test]
async fn parts_beyond_the_plan_cannot_be_signed() {
    let p = provider(8);
    let res = p.request_upload(params(10)).await.unwrap();
    let UploadTarget::Multipart { multipart } = res.target else {
        panic!("expected multipart");
    };
    let err = p
        .request_upload_parts(RequestUploadPartsParams {
            multipart: PartsRequest {
                upload_id: multipart.upload_id,
                parts: vec![4],
            },
            key: multipart.key,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Invalid part number"), "{err}");
}

#[tokio::test]
async fn a_file_at_the_threshold_is_a_single_put() {
    let p = provider(8);
    let res = p.request_upload(params(8)).await.unwrap();
    assert!(matches!(res.target, UploadTarget::Single { .. }));

    let res = p.request_upload(params(9)).await.unwrap();
    assert!(matches!(res.target, UploadTarget::Multipart { .. }));
}

#[tokio::test]
async fn temporary_uploads_are_confirmed() {
    let p = provider(1024);
    let mut req = params(2);
    req.file_info.temporary = true;
    let res = p.request_upload(req).await.unwrap();
    let UploadTarget::Single { upload_url } = res.target else {
        panic!("expected a single PUT");
    };
    p.store().receive_put(&upload_url, Bytes::from_static(b"ok")).await.unwrap();

    let key = p.key_from_url(&res.access_url).unwrap().to_string();
    assert!(is_temporary(&p.store().head(&key).await.unwrap().metadata));

    assert!(p.confirm_upload(&res.access_url).await.unwrap().success);
    assert!(!is_temporary(&p.store().head(&key).await.unwrap().metadata));
}

#[tokio::test]
async fn replace_target_reuses_the_key() {
    let p = provider(1024);
    let first = p.request_upload(params(1)).await.unwrap();

    let mut req = params(1);
    req.file_info.replace_target_url = Some(first.access_url.clone());
    let second = p.request_upload(req).await.unwrap();
    assert_eq!(second.access_url, first.access_url);

    let mut foreign = params(1);
    foreign.bucket_name = "other".into();
    foreign.file_info.replace_target_url = Some(first.access_url);
    assert!(p.request_upload(foreign).await.is_err());
}

#[tokio::test]
async fn foreign_urls_are_rejected() {
    let p = provider(1024);
    assert!(p.get_file("https://elsewhere.test/docs/a.txt").await.is_err());
    assert!(p.key_from_url("http://files.test/").is_err());
}
