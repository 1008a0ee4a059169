mod common;

use std::sync::Arc;

use common::{client, FakeApi, FakeTransport};
use edgestore_client::{UploadFile, UploadOptions};
use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn multipart_uploads_fetch_missing_part_urls() {
    let api = Arc::new(FakeApi {
        multipart: Some((4, 1)),
        ..Default::default()
    });
    let transport = Arc::new(FakeTransport::default());
    let bucket = client(Arc::clone(&api), Arc::clone(&transport)).bucket("docs");

    let progress = Arc::new(Mutex::new(Vec::new()));
    let file = UploadFile::new("big.bin", "application/octet-stream", b"abcdefghij".to_vec());
    let uploaded = bucket
        .upload(
            &file,
            UploadOptions::new().on_progress({
                let progress = Arc::clone(&progress);
                move |pct| progress.lock().push(pct)
            }),
        )
        .await
        .unwrap();

    assert_eq!(uploaded.url, "https://files.test/docs/10");
    assert_eq!(*api.part_requests.lock(), vec![vec![2], vec![3]]);
    assert_eq!(
        transport.started(),
        vec!["mem://10/part/1", "mem://10/part/2", "mem://10/part/3"]
    );

    let completed = api.completed.lock();
    assert_eq!(completed.len(), 1);
    let done = &completed[0];
    assert_eq!(done.bucket_name.as_deref(), Some("docs"));
    assert_eq!(done.upload_id, "upl_10");
    assert_eq!(done.key, "docs/10");
    let numbers: Vec<u32> = done.parts.iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(done.parts[2].e_tag, "\"mem://10/part/3\"");

    // 4 + 4 + 2 bytes
    assert_eq!(*progress.lock(), vec![40.0, 80.0, 100.0]);
}

#[tokio::test]
async fn upload_sends_file_info_and_options() {
    let api = Arc::new(FakeApi::default());
    let bucket = client(Arc::clone(&api), Arc::new(FakeTransport::default())).bucket("docs");

    bucket
        .upload(
            &UploadFile::new("report.pdf", "application/pdf", b"%PDF".to_vec()),
            UploadOptions::new()
                .with_input(json!({ "kind": "report" }))
                .temporary()
                .with_file_name("q3.pdf")
                .replacing("https://files.test/docs/old.pdf"),
        )
        .await
        .unwrap();

    let sent = api.requested.lock();
    let body = &sent[0];
    assert_eq!(body.bucket_name, "docs");
    assert_eq!(body.input, json!({ "kind": "report" }));
    assert_eq!(body.file_info.size, 4);
    assert_eq!(body.file_info.mime_type, "application/pdf");
    assert_eq!(body.file_info.extension, "pdf");
    assert_eq!(body.file_info.file_name.as_deref(), Some("q3.pdf"));
    assert_eq!(
        body.file_info.replace_target_url.as_deref(),
        Some("https://files.test/docs/old.pdf")
    );
    assert!(body.file_info.temporary);
}

#[tokio::test]
async fn api_errors_keep_their_code() {
    let api = Arc::new(FakeApi {
        max_size: Some(1),
        ..Default::default()
    });
    let bucket = client(api, Arc::new(FakeTransport::default())).bucket("docs");

    let err = bucket
        .upload(&UploadFile::new("a.bin", "x/y", vec![0u8; 2]), UploadOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("FILE_TOO_LARGE"));
    assert!(!err.is_aborted());
}

#[tokio::test]
async fn a_cancelled_token_stops_before_any_request() {
    let api = Arc::new(FakeApi::default());
    let bucket = client(Arc::clone(&api), Arc::new(FakeTransport::default())).bucket("docs");
    let token = CancellationToken::new();
    token.cancel();

    let err = bucket
        .upload(
            &UploadFile::new("a.bin", "x/y", vec![0u8; 2]),
            UploadOptions::new().with_cancel(token),
        )
        .await
        .unwrap_err();
    assert!(err.is_aborted());
    assert!(api.requested.lock().is_empty());
}

#[tokio::test]
async fn delete_and_confirm_are_bucket_scoped() {
    let api = Arc::new(FakeApi::default());
    let bucket = client(Arc::clone(&api), Arc::new(FakeTransport::default())).bucket("docs");

    assert!(bucket.confirm_upload("https://files.test/docs/1").await.unwrap().success);
    assert!(bucket.delete("https://files.test/docs/1").await.unwrap().success);
    assert_eq!(*api.deleted.lock(), vec!["https://files.test/docs/1".to_string()]);
}
