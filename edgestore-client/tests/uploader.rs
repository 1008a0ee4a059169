mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{client, eventually, FakeApi, FakeTransport};
use edgestore_client::{UploadFile, UploadStatus, Uploader, UploaderConfig};
use parking_lot::Mutex;

fn file(name: &str, size: usize) -> UploadFile {
    UploadFile::new(name, "application/octet-stream", vec![7u8; size])
}

fn uploader(transport: &Arc<FakeTransport>, config: UploaderConfig) -> Uploader {
    let client = client(Arc::new(FakeApi::default()), Arc::clone(transport));
    Uploader::new(client.bucket("docs"), config)
}

#[tokio::test]
async fn auto_upload_runs_fifo_one_at_a_time() {
    let transport = Arc::new(FakeTransport {
        delay: Duration::from_millis(10),
        script: vec![0.5],
        ..Default::default()
    });
    let up = uploader(
        &transport,
        UploaderConfig::new().auto_upload().with_max_concurrent_uploads(1),
    );

    let keys = up.add_files(vec![file("a.bin", 1), file("b.bin", 2), file("c.bin", 3)]);
    assert_eq!(keys.len(), 3);
    up.wait_idle().await;

    assert_eq!(transport.started(), vec!["mem://1", "mem://2", "mem://3"]);
    assert_eq!(transport.max_in_flight(), 1);
    for state in up.files() {
        assert_eq!(state.status, UploadStatus::Complete);
        assert_eq!(state.progress, 100.0);
        assert!(state.url.is_some());
    }
}

#[tokio::test]
async fn in_flight_transfers_never_exceed_the_limit() {
    let transport = Arc::new(FakeTransport {
        delay: Duration::from_millis(15),
        script: vec![0.5],
        ..Default::default()
    });
    let up = uploader(&transport, UploaderConfig::new().with_max_concurrent_uploads(2));

    up.add_files((1..=6).map(|n| file(&format!("{n}.bin"), n)).collect());
    up.upload_files(None).await;

    assert_eq!(transport.started().len(), 6);
    assert_eq!(transport.max_in_flight(), 2);
    assert!(up.files().iter().all(|f| f.status == UploadStatus::Complete));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_upload_calls_start_each_file_once() {
    let transport = Arc::new(FakeTransport {
        delay: Duration::from_millis(1),
        script: vec![0.5],
        ..Default::default()
    });
    let up = uploader(&transport, UploaderConfig::new().with_max_concurrent_uploads(8));
    up.add_files((1..=200).map(|n| file(&format!("{n}.bin"), n)).collect());

    let runs: Vec<_> = (0..4)
        .map(|_| {
            let up = up.clone();
            tokio::spawn(async move { up.upload_files(None).await })
        })
        .collect();
    for run in runs {
        run.await.unwrap();
    }

    let mut started = transport.started();
    assert_eq!(started.len(), 200);
    started.sort();
    started.dedup();
    assert_eq!(started.len(), 200);
    assert!(transport.max_in_flight() <= 8);
    assert!(up.files().iter().all(|f| f.status == UploadStatus::Complete));
}

#[tokio::test]
async fn upload_files_skips_what_auto_upload_already_started() {
    let transport = Arc::new(FakeTransport {
        delay: Duration::from_millis(2),
        script: vec![0.5],
        ..Default::default()
    });
    let up = uploader(&transport, UploaderConfig::new().auto_upload());
    up.add_files(vec![file("a.bin", 1), file("b.bin", 2)]);

    up.upload_files(None).await;
    up.wait_idle().await;

    assert_eq!(transport.started(), vec!["mem://1", "mem://2"]);
}

#[tokio::test]
async fn upload_files_only_picks_selected_pending_keys() {
    let transport = Arc::new(FakeTransport::default());
    let up = uploader(&transport, UploaderConfig::new());

    let keys = up.add_files(vec![file("a.bin", 1), file("b.bin", 2)]);
    up.upload_files(Some(&keys[1..])).await;

    assert_eq!(up.file(&keys[0]).unwrap().status, UploadStatus::Pending);
    assert_eq!(up.file(&keys[1]).unwrap().status, UploadStatus::Complete);
    assert_eq!(transport.started(), vec!["mem://2"]);
}

#[tokio::test]
async fn cancel_is_a_no_op_outside_uploading() {
    let transport = Arc::new(FakeTransport::default());
    let up = uploader(&transport, UploaderConfig::new());

    let keys = up.add_files(vec![file("a.bin", 4)]);
    let before = up.files();
    assert!(!up.cancel_upload(&keys[0]));
    assert_eq!(up.files(), before);

    up.upload_files(None).await;
    let done = up.files();
    assert_eq!(done[0].status, UploadStatus::Complete);
    assert!(!up.cancel_upload(&keys[0]));
    assert!(!up.cancel_upload(&keys[0]));
    assert_eq!(up.files(), done);
    assert!(!up.cancel_upload("unknown"));
}

#[tokio::test]
async fn cancelled_manual_upload_returns_to_pending() {
    let transport = Arc::new(FakeTransport {
        script: vec![0.25],
        block_until_cancel: true,
        ..Default::default()
    });
    let up = uploader(&transport, UploaderConfig::new());
    let keys = up.add_files(vec![file("a.bin", 100)]);

    let running = tokio::spawn({
        let up = up.clone();
        async move { up.upload_files(None).await }
    });
    eventually(|| up.file(&keys[0]).is_some_and(|f| f.progress == 25.0)).await;

    assert!(up.cancel_upload(&keys[0]));
    running.await.unwrap();

    let state = up.file(&keys[0]).unwrap();
    assert_eq!(state.status, UploadStatus::Pending);
    assert_eq!(state.progress, 0.0);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn cancelled_auto_upload_is_removed() {
    let transport = Arc::new(FakeTransport {
        block_until_cancel: true,
        ..Default::default()
    });
    let up = uploader(&transport, UploaderConfig::new().auto_upload());
    let keys = up.add_files(vec![file("a.bin", 10)]);

    eventually(|| transport.started().len() == 1).await;
    assert!(up.cancel_upload(&keys[0]));
    up.wait_idle().await;

    assert!(up.files().is_empty());
}

#[tokio::test]
async fn queued_uploads_can_be_cancelled_without_blocking_the_queue() {
    let transport = Arc::new(FakeTransport {
        block_until_cancel: true,
        ..Default::default()
    });
    let up = uploader(&transport, UploaderConfig::new().with_max_concurrent_uploads(1));
    let keys = up.add_files(vec![file("a.bin", 1), file("b.bin", 2), file("c.bin", 3)]);

    let running = tokio::spawn({
        let up = up.clone();
        async move { up.upload_files(None).await }
    });
    eventually(|| transport.started().len() == 1).await;

    // b is UPLOADING but still waiting for a slot
    assert_eq!(up.file(&keys[1]).unwrap().status, UploadStatus::Uploading);
    assert!(up.cancel_upload(&keys[1]));
    eventually(|| up.file(&keys[1]).is_some_and(|f| f.status == UploadStatus::Pending)).await;

    assert!(up.cancel_upload(&keys[0]));
    eventually(|| transport.started().len() == 2).await;
    assert_eq!(transport.started()[1], "mem://3");

    assert!(up.cancel_upload(&keys[2]));
    running.await.unwrap();
    assert!(up.files().iter().all(|f| f.status == UploadStatus::Pending));
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_at_100() {
    let transport = Arc::new(FakeTransport {
        delay: Duration::from_millis(5),
        script: vec![0.5, 0.25, 0.75],
        ..Default::default()
    });
    let raw = Arc::new(Mutex::new(Vec::new()));
    let client = client(Arc::new(FakeApi::default()), Arc::clone(&transport));
    let up = Uploader::builder(client.bucket("docs"))
        .on_progress({
            let raw = Arc::clone(&raw);
            move |_key, pct| raw.lock().push(pct)
        })
        .build();
    let keys = up.add_files(vec![file("a.bin", 1000)]);

    let mut rx = up.subscribe();
    let key = keys[0].clone();
    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().iter().find(|f| f.key == key).cloned();
            let Some(state) = state else { break };
            seen.push((state.status, state.progress));
            if state.status == UploadStatus::Complete {
                break;
            }
        }
        seen
    });

    up.upload_files(None).await;
    let seen = observer.await.unwrap();

    let uploading: Vec<f64> = seen
        .iter()
        .filter(|(s, _)| *s == UploadStatus::Uploading)
        .map(|(_, p)| *p)
        .collect();
    assert!(uploading.windows(2).all(|w| w[0] <= w[1]), "{uploading:?}");
    assert_eq!(seen.last(), Some(&(UploadStatus::Complete, 100.0)));

    // raw events are forwarded as reported, including the regression
    let raw = raw.lock().clone();
    assert_eq!(&raw[..3], &[50.0, 25.0, 75.0]);
    assert_eq!(raw.last(), Some(&100.0));
}

#[tokio::test]
async fn failures_become_error_state() {
    let transport = Arc::new(FakeTransport::default());
    let api = Arc::new(FakeApi {
        max_size: Some(4),
        ..Default::default()
    });
    let up = Uploader::new(client(api, Arc::clone(&transport)).bucket("docs"), UploaderConfig::new());
    let keys = up.add_files(vec![file("big.bin", 10)]);

    up.upload_files(None).await;

    let state = up.file(&keys[0]).unwrap();
    assert_eq!(state.status, UploadStatus::Error);
    assert_eq!(state.progress, 0.0);
    assert_eq!(state.error.as_deref(), Some("File size is too big. Max size is 4"));
    assert!(transport.started().is_empty());
}

#[tokio::test]
async fn remove_and_reset_are_local() {
    let transport = Arc::new(FakeTransport::default());
    let up = uploader(&transport, UploaderConfig::new());
    let keys = up.add_files(vec![file("a.bin", 1), file("b.bin", 1)]);

    up.remove_file(&keys[0]);
    assert_eq!(up.files().len(), 1);
    up.reset_files();
    assert!(up.files().is_empty());
    assert!(transport.started().is_empty());
}
