//! End-to-end ingestion: append lines to a watched file and observe submissions.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use uqw_artifact::ArtifactWriter;
use uqw_client::ScriptedService;
use uqw_core::{OutputPolicy, PollSettings, QueueStatus, SubmissionParams, SubmitterSettings};
use uqw_ingest::IngestWorker;

fn append(path: &Path, text: &str) {
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    f.write_all(text.as_bytes()).unwrap();
}

fn source(file: PathBuf, output: OutputPolicy) -> SubmitterSettings {
    SubmitterSettings {
        file,
        enabled: true,
        settings: SubmissionParams {
            access: "private".into(),
            tags: vec!["feed".into()],
            meta: Default::default(),
        },
        output,
    }
}

fn fast_poll() -> PollSettings {
    PollSettings {
        interval_secs: 1,
        max_attempts: Some(3),
        max_duration_secs: None,
    }
}

async fn start_worker(
    svc: &Arc<ScriptedService>,
    base: &Path,
    src: SubmitterSettings,
) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let writer = Arc::new(ArtifactWriter::with_base_dir(svc.clone(), base));
    let worker = IngestWorker::new(src, svc.clone(), writer, fast_poll(), Duration::from_millis(20));
    let (tx, rx) = watch::channel(false);
    let handle = worker.start(rx).await.unwrap();
    (tx, handle)
}

/// Wait until `check` holds, failing the test after a few seconds.
async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn submits_appended_lines_in_order_and_skips_existing() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("urls.txt");
    append(&path, "https://already-there.example\n");

    let svc = Arc::new(ScriptedService::new());
    let (tx, handle) = start_worker(&svc, tmp.path(), source(path.clone(), OutputPolicy::default())).await;

    append(&path, "https://1.example\nhttps://2.example\n");
    append(&path, "\n   \nhttps://3.example\n");
    append(&path, "  https://4.example  \n");

    eventually(|| svc.submissions().len() >= 4).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        svc.submitted_urls(),
        vec![
            "https://1.example",
            "https://2.example",
            "https://3.example",
            "https://4.example",
        ]
    );
    let first = &svc.submissions()[0];
    assert_eq!(first.access, "private");
    assert_eq!(first.tags, vec!["feed"]);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker should stop on shutdown")
        .unwrap();
}

#[tokio::test]
async fn creates_missing_file_without_truncating() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("new.txt");
    let existing = tmp.path().join("old.txt");
    append(&existing, "keep me\n");

    IngestWorker::prepare(&missing).unwrap();
    IngestWorker::prepare(&existing).unwrap();

    assert!(missing.exists());
    assert_eq!(std::fs::read_to_string(&existing).unwrap(), "keep me\n");
}

#[tokio::test]
async fn submit_failure_does_not_stop_ingestion() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("urls.txt");

    let svc = Arc::new(ScriptedService::new());
    svc.fail_submit("https://bad.example");
    let (tx, _handle) = start_worker(&svc, tmp.path(), source(path.clone(), OutputPolicy::default())).await;

    append(&path, "https://bad.example\nhttps://good.example\n");
    eventually(|| svc.submissions().len() >= 2).await;

    assert_eq!(svc.submitted_urls(), vec!["https://bad.example", "https://good.example"]);
    tx.send(true).unwrap();
}

#[tokio::test]
async fn survives_delete_and_recreate() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("urls.txt");

    let svc = Arc::new(ScriptedService::new());
    let (tx, _handle) = start_worker(&svc, tmp.path(), source(path.clone(), OutputPolicy::default())).await;

    append(&path, "https://before.example\n");
    eventually(|| svc.submissions().len() >= 1).await;

    std::fs::remove_file(&path).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    append(&path, "https://after.example\n");

    eventually(|| svc.submissions().len() >= 2).await;
    assert_eq!(svc.submitted_urls(), vec!["https://before.example", "https://after.example"]);
    tx.send(true).unwrap();
}

#[tokio::test]
async fn enabled_output_launches_poller_and_writes_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("urls.txt");

    let svc = Arc::new(ScriptedService::new());
    svc.script_status("queue-1", [QueueStatus::done("rep-1")]);
    let output = OutputPolicy {
        enabled: true,
        path: "artifacts".into(),
        report: true,
        screenshot: false,
        domain_graph: true,
    };
    let (tx, _handle) = start_worker(&svc, tmp.path(), source(path.clone(), output)).await;

    append(&path, "https://scan-me.example\n");

    let report = tmp.path().join("artifacts/report_rep-1.json");
    let graph = tmp.path().join("artifacts/domain_graph_rep-1.gif");
    eventually(|| report.exists() && graph.exists()).await;
    assert!(!tmp.path().join("artifacts/screenshot_rep-1.jpg").exists());
    tx.send(true).unwrap();
}

#[tokio::test]
async fn disabled_output_never_polls() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("urls.txt");

    let svc = Arc::new(ScriptedService::new());
    let (tx, _handle) = start_worker(&svc, tmp.path(), source(path.clone(), OutputPolicy::default())).await;

    append(&path, "https://fire-and-forget.example\n");
    eventually(|| svc.submissions().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(svc.status_queries().is_empty());
    tx.send(true).unwrap();
}

#[tokio::test]
async fn dropped_shutdown_sender_stops_worker() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("urls.txt");

    let svc = Arc::new(ScriptedService::new());
    let (tx, handle) = start_worker(&svc, tmp.path(), source(path, OutputPolicy::default())).await;
    drop(tx);

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("worker should stop when the shutdown sender is gone")
        .unwrap();
}
