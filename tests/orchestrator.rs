//! Upload queue tests: sequential submission, per-job failure isolation,
//! removal, re-download, and a full run against a live gateway.

use async_trait::async_trait;
use bytes::Bytes;
use petite_souris::remote::RemoteJob;
use petite_souris::{
    build_router, AppState, ConversionClient, ConversionService, ConvertedFile, DirectorySink,
    Error, FileType, GatewayConfig, JobError, JobStatus, MemorySink, Orchestrator,
    OrchestratorConfig, QueueProgressCallback, QueueSummary, SourceFile,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Route library logs through the test harness; `RUST_LOG` overrides the level.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

/// Client that records how many requests overlap and fails on chosen names.
#[derive(Default)]
struct RecordingClient {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ConversionClient for RecordingClient {
    async fn convert(&self, file: &SourceFile, output: FileType) -> Result<ConvertedFile, JobError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(file.name.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if file.name.starts_with("bad") {
            return Err(JobError::Rejected {
                status: 500,
                message: "Export task failed or file URL not found: corrupt".into(),
            });
        }
        Ok(ConvertedFile {
            file_name: petite_souris::format::output_file_name(&file.name, output),
            format: output,
            content_type: output.content_type().into(),
            bytes: Bytes::from(format!("{}→{}", file.name, output)),
        })
    }
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl QueueProgressCallback for EventLog {
    fn on_status_change(&self, _id: &str, status: JobStatus) {
        self.events.lock().unwrap().push(status.to_string());
    }

    fn on_queue_complete(&self, summary: &QueueSummary) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {}/{}", summary.succeeded, summary.attempted));
    }
}

#[tokio::test]
async fn queue_is_processed_one_at_a_time_in_order() {
    init_tracing();
    let client = Arc::new(RecordingClient::default());
    let log = Arc::new(EventLog::default());
    let mut queue = Orchestrator::new(OrchestratorConfig::default(), client.clone())
        .with_progress(log.clone());

    let a = queue.add_file(SourceFile::new("a.txt", b"a".to_vec()), FileType::Pdf).unwrap();
    let b = queue.add_file(SourceFile::new("bad.docx", b"b".to_vec()), FileType::Pdf).unwrap();
    let c = queue.add_file(SourceFile::new("c.html", b"c".to_vec()), FileType::Odt).unwrap();

    let summary = queue.start_all().await;

    assert_eq!(client.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(*client.calls.lock().unwrap(), ["a.txt", "bad.docx", "c.html"]);
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    assert_eq!(queue.job(&a).unwrap().status, JobStatus::Success);
    let failed = queue.job(&b).unwrap();
    assert_eq!(failed.status, JobStatus::Error);
    assert!(failed.error.as_deref().unwrap().starts_with("Export task failed"));
    assert!(failed.result().is_none());
    assert_eq!(queue.job(&c).unwrap().result().unwrap().file_name(), "c.odt");

    let events = log.events.lock().unwrap().clone();
    assert_eq!(
        events,
        [
            "uploading", "converting", "success",
            "uploading", "converting", "error",
            "uploading", "converting", "success",
            "done 2/3",
        ]
    );
}

#[tokio::test]
async fn successful_results_are_auto_saved() {
    init_tracing();
    let sink = Arc::new(MemorySink::new());
    let mut queue = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(RecordingClient::default()),
    )
    .with_sink(sink.clone());

    queue.add_file(SourceFile::new("one.pdf", b"1".to_vec()), FileType::Docx).unwrap();
    queue.add_file(SourceFile::new("bad.pdf", b"2".to_vec()), FileType::Docx).unwrap();
    queue.start_all().await;

    assert_eq!(sink.len(), 1);
    assert_eq!(sink.get("one.docx").unwrap(), "one.pdf→docx".as_bytes());
}

#[tokio::test]
async fn remove_and_clear_do_not_disturb_other_jobs() {
    init_tracing();
    let mut queue = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(RecordingClient::default()),
    );
    let a = queue.add_file(SourceFile::new("a.rtf", b"a".to_vec()), FileType::Pdf).unwrap();
    let b = queue.add_file(SourceFile::new("b.rtf", b"b".to_vec()), FileType::Pdf).unwrap();
    queue.start_all().await;

    assert!(queue.remove_job(&a));
    assert!(!queue.remove_job("missing"));
    assert_eq!(queue.jobs().len(), 1);
    assert_eq!(queue.jobs()[0].id, b);
    assert!(queue.jobs()[0].result().is_some());

    // Jobs added after a run are picked up by the next one.
    let c = queue.add_file(SourceFile::new("c.rtf", b"c".to_vec()), FileType::Txt).unwrap();
    assert_eq!(queue.counts().pending, 1);
    let summary = queue.start_all().await;
    assert_eq!(summary.attempted, 1);
    assert_eq!(queue.job(&c).unwrap().status, JobStatus::Success);

    assert_eq!(queue.clear_all(), 2);
    assert!(queue.jobs().is_empty());
}

#[tokio::test]
async fn download_job_writes_to_directory() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let mut queue = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(RecordingClient::default()),
    )
    .with_sink(Arc::new(DirectorySink::new(tmp.path())));

    let id = queue.add_file(SourceFile::new("memo.odt", b"m".to_vec()), FileType::Html).unwrap();
    queue.start_all().await;

    let saved = tmp.path().join("memo.html");
    std::fs::remove_file(&saved).unwrap();
    let path = queue.download_job(&id).await.unwrap();
    assert_eq!(path, saved);
    assert_eq!(std::fs::read(&path).unwrap(), "memo.odt→html".as_bytes());

    assert!(matches!(
        queue.download_job("nope").await,
        Err(Error::JobNotFound { .. })
    ));
}

#[tokio::test]
async fn same_stem_results_are_both_kept() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let mut queue = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(RecordingClient::default()),
    )
    .with_sink(Arc::new(DirectorySink::new(tmp.path())));

    let txt = queue.add_file(SourceFile::new("report.txt", b"t".to_vec()), FileType::Pdf).unwrap();
    let doc = queue.add_file(SourceFile::new("report.doc", b"d".to_vec()), FileType::Pdf).unwrap();
    let summary = queue.start_all().await;
    assert_eq!(summary.succeeded, 2);

    let first = queue.job(&txt).unwrap().result().unwrap().saved_path().unwrap();
    let second = queue.job(&doc).unwrap().result().unwrap().saved_path().unwrap();
    assert_eq!(first, tmp.path().join("report.pdf"));
    assert_eq!(second, tmp.path().join("report (1).pdf"));
    assert_eq!(std::fs::read(first).unwrap(), "report.txt→pdf".as_bytes());
    assert_eq!(std::fs::read(second).unwrap(), "report.doc→pdf".as_bytes());
}

#[tokio::test]
async fn add_path_reads_from_disk() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("draft.txt");
    std::fs::write(&source, b"draft").unwrap();

    let mut queue = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(RecordingClient::default()),
    );
    let id = queue.add_path(&source, FileType::Pdf).await.unwrap();
    let job = queue.job(&id).unwrap();
    assert_eq!(job.source.name, "draft.txt");
    assert_eq!(job.input_format, FileType::Txt);

    let err = queue
        .add_path(tmp.path().join("missing.txt"), FileType::Pdf)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ReadFailed { .. }));
}

/// Remote side that finishes every job with a fixed payload.
struct InstantService;

fn finished_job() -> RemoteJob {
    serde_json::from_value(json!({
        "id": "job-1",
        "status": "finished",
        "tasks": [{
            "id": "t-export",
            "name": "export-file",
            "status": "finished",
            "result": { "files": [{ "url": "https://storage.invalid/out" }] }
        }]
    }))
    .unwrap()
}

#[async_trait]
impl ConversionService for InstantService {
    async fn create_job(&self, _input: FileType, _output: FileType) -> Result<RemoteJob, Error> {
        Ok(finished_job())
    }

    async fn upload(&self, _job: &RemoteJob, _file_name: &str, _bytes: Bytes) -> Result<(), Error> {
        Ok(())
    }

    async fn wait(&self, _job_id: &str) -> Result<RemoteJob, Error> {
        Ok(finished_job())
    }

    async fn download(&self, _url: &str) -> Result<Bytes, Error> {
        Ok(Bytes::from_static(b"%PDF-1.7"))
    }

    async fn delete_job(&self, _job_id: &str) -> Result<(), Error> {
        Ok(())
    }
}

#[tokio::test]
async fn http_client_against_live_gateway() {
    init_tracing();
    let config = GatewayConfig::builder().api_key("unused").build().unwrap();
    let state = AppState::new(config, Arc::new(InstantService));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    let tmp = tempfile::tempdir().unwrap();
    let mut queue = Orchestrator::http(OrchestratorConfig::new(format!("http://{addr}")))
        .unwrap()
        .with_sink(Arc::new(DirectorySink::new(tmp.path())));

    let ok = queue.add_file(SourceFile::new("essay.docx", b"PK".to_vec()), FileType::Pdf).unwrap();
    let summary = queue.start_all().await;

    assert_eq!(summary.succeeded, 1);
    let job = queue.job(&ok).unwrap();
    assert_eq!(job.status, JobStatus::Success);
    let result = job.result().unwrap();
    assert_eq!(result.content_type(), "application/pdf");
    assert_eq!(result.bytes(), b"%PDF-1.7");
    assert_eq!(std::fs::read(tmp.path().join("essay.pdf")).unwrap(), b"%PDF-1.7");
}
