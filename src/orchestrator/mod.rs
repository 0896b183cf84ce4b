//! Client-side upload queue.
//!
//! The [`Orchestrator`] owns an ordered list of [`ConversionJob`]s and feeds
//! them to a gateway **one at a time**. Sequential submission is a
//! backpressure policy toward the remote conversion service, so
//! [`Orchestrator::start_all`] never has more than one request in flight.
//!
//! ## Job lifecycle
//!
//! ```text
//! add_file ──▶ idle ──▶ uploading ──▶ converting ──▶ success
//!                                               └──▶ error
//! ```
//!
//! Every mutating operation takes `&mut self`, which makes the orchestrator
//! the single writer of its queue: a status update can never race an
//! insertion or a removal.
//!
//! A failed job keeps its error message and does not stop the queue.

mod client;
mod sink;

pub use client::{ConversionClient, HttpConversionClient};
pub use sink::{DirectorySink, MemorySink, ResultSink};

use crate::config::OrchestratorConfig;
use crate::error::Error;
use crate::format::{self, FileType};
use crate::gateway::{self, ConvertedFile};
use crate::progress::ProgressCallback;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A file picked by the user, held in memory until it is converted.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Status of one queued conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Uploading,
    Converting,
    Success,
    Error,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Idle => "idle",
            JobStatus::Uploading => "uploading",
            JobStatus::Converting => "converting",
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Owned bytes of a converted file, pending save or disposal.
///
/// Dropping the handle frees the buffer; [`Orchestrator::remove_job`] and
/// [`Orchestrator::clear_all`] release handles through
/// [`ResultHandle::release`].
#[derive(Debug)]
pub struct ResultHandle {
    file_name: String,
    content_type: String,
    bytes: Bytes,
    saved_to: Option<PathBuf>,
}

impl ResultHandle {
    fn new(converted: ConvertedFile, file_name: String) -> Self {
        Self {
            file_name,
            content_type: converted.content_type,
            bytes: converted.bytes,
            saved_to: None,
        }
    }

    /// Name derived from the source file. The sink may store the result
    /// under a numbered variant; see [`Self::saved_path`].
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Where auto-save put the result, if it was saved.
    pub fn saved_path(&self) -> Option<&Path> {
        self.saved_to.as_deref()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Free the buffer. Returns how many bytes were held.
    pub fn release(self) -> usize {
        let len = self.bytes.len();
        drop(self);
        len
    }
}

/// One entry of the upload queue.
#[derive(Debug)]
pub struct ConversionJob {
    pub id: String,
    pub source: SourceFile,
    pub input_format: FileType,
    pub output_format: FileType,
    pub status: JobStatus,
    pub error: Option<String>,
    result: Option<ResultHandle>,
}

impl ConversionJob {
    pub fn result(&self) -> Option<&ResultHandle> {
        self.result.as_ref()
    }

    /// Name derived for the converted file.
    pub fn output_file_name(&self) -> String {
        format::output_file_name(&self.source.name, self.output_format)
    }
}

/// Outcome of one [`Orchestrator::start_all`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Jobs per status group, as shown next to the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// The upload queue.
pub struct Orchestrator {
    config: OrchestratorConfig,
    client: Arc<dyn ConversionClient>,
    sink: Option<Arc<dyn ResultSink>>,
    progress: Option<ProgressCallback>,
    jobs: Vec<ConversionJob>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("sink", &self.sink.as_ref().map(|_| "<dyn ResultSink>"))
            .field("jobs", &self.jobs.len())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, client: Arc<dyn ConversionClient>) -> Self {
        Self {
            config,
            client,
            sink: None,
            progress: None,
            jobs: Vec::new(),
        }
    }

    /// Orchestrator talking to the gateway at `config.server_url`.
    pub fn http(config: OrchestratorConfig) -> Result<Self, Error> {
        let client = HttpConversionClient::new(&config)?;
        Ok(Self::new(config, Arc::new(client)))
    }

    /// Auto-save successful results (and serve [`Self::download_job`]) through `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn jobs(&self) -> &[ConversionJob] {
        &self.jobs
    }

    pub fn job(&self, id: &str) -> Option<&ConversionJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn counts(&self) -> QueueCounts {
        self.jobs.iter().fold(QueueCounts::default(), |mut c, j| {
            match j.status {
                JobStatus::Idle => c.pending += 1,
                JobStatus::Uploading | JobStatus::Converting => c.in_flight += 1,
                JobStatus::Success => c.succeeded += 1,
                JobStatus::Error => c.failed += 1,
            }
            c
        })
    }

    /// Queue `file` for conversion to `output`.
    ///
    /// # Errors
    /// [`Error::FileTooLarge`], [`Error::UnsupportedFormat`] or
    /// [`Error::IdenticalFormats`]; the queue is unchanged in that case.
    pub fn add_file(&mut self, file: SourceFile, output: FileType) -> Result<String, Error> {
        let plan = gateway::plan(
            &file.name,
            file.size(),
            Some(output.as_str()),
            self.config.max_file_size,
        )?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        debug!("Queued '{}' as {} ({} → {})", file.name, id, plan.input, plan.output);
        self.jobs.push(ConversionJob {
            id: id.clone(),
            source: file,
            input_format: plan.input,
            output_format: plan.output,
            status: JobStatus::Idle,
            error: None,
            result: None,
        });
        Ok(id)
    }

    /// Read `path` from disk and queue it.
    pub async fn add_path(&mut self, path: impl AsRef<Path>, output: FileType) -> Result<String, Error> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| Error::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.add_file(SourceFile::new(name, bytes), output)
    }

    /// Convert every `idle` job, strictly one after another.
    ///
    /// Jobs are drawn in queue order. A failure is recorded on its job and
    /// the run moves on to the next one.
    pub async fn start_all(&mut self) -> QueueSummary {
        let mut summary = QueueSummary::default();
        let total = self.counts().pending;
        if total == 0 {
            info!("No files to convert");
            return summary;
        }

        info!("Converting {} file(s) via {}", total, self.config.server_url);
        if let Some(ref cb) = self.progress {
            cb.on_queue_start(total);
        }

        while let Some(idx) = self.jobs.iter().position(|j| j.status == JobStatus::Idle) {
            summary.attempted += 1;
            if self.process(idx, summary.attempted, total).await {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
        }

        info!(
            "Queue finished: {}/{} converted, {} failed",
            summary.succeeded, summary.attempted, summary.failed
        );
        if let Some(ref cb) = self.progress {
            cb.on_queue_complete(&summary);
        }
        summary
    }

    /// Drive one job to a terminal status. Returns `true` on success.
    async fn process(&mut self, idx: usize, position: usize, total: usize) -> bool {
        let (id, source, output) = {
            let job = &self.jobs[idx];
            (job.id.clone(), job.source.clone(), job.output_format)
        };
        if let Some(ref cb) = self.progress {
            cb.on_job_start(&id, &source.name, position, total);
        }

        self.set_status(idx, JobStatus::Uploading);
        self.set_status(idx, JobStatus::Converting);

        match self.client.convert(&source, output).await {
            Ok(converted) => {
                let mut handle =
                    ResultHandle::new(converted, format::output_file_name(&source.name, output));
                info!("'{}' → '{}' ({} bytes)", source.name, handle.file_name(), handle.len());

                if let Some(ref sink) = self.sink {
                    // The job stays successful even if the save fails; the
                    // result can still be saved again with download_job.
                    match sink.save(handle.file_name(), handle.bytes()).await {
                        Ok(path) => handle.saved_to = Some(path),
                        Err(e) => warn!("Failed to save '{}': {}", handle.file_name(), e),
                    }
                }
                if let Some(ref cb) = self.progress {
                    let shown = handle
                        .saved_path()
                        .and_then(Path::file_name)
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| handle.file_name().to_string());
                    cb.on_job_complete(&id, &shown, handle.len());
                }

                let job = &mut self.jobs[idx];
                job.result = Some(handle);
                job.error = None;
                self.set_status(idx, JobStatus::Success);
                true
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Conversion of '{}' failed: {}", source.name, message);
                if let Some(ref cb) = self.progress {
                    cb.on_job_error(&id, &message);
                }

                self.jobs[idx].error = Some(message);
                self.set_status(idx, JobStatus::Error);
                false
            }
        }
    }

    fn set_status(&mut self, idx: usize, status: JobStatus) {
        let job = &mut self.jobs[idx];
        job.status = status;
        debug!("Job {} → {}", job.id, status);
        if let Some(ref cb) = self.progress {
            cb.on_status_change(&job.id, status);
        }
    }

    /// Remove a job and release its result. Returns `false` for unknown ids.
    pub fn remove_job(&mut self, id: &str) -> bool {
        let Some(idx) = self.jobs.iter().position(|j| j.id == id) else {
            return false;
        };
        let job = self.jobs.remove(idx);
        if let Some(handle) = job.result {
            let freed = handle.release();
            debug!("Released {} bytes held by job {}", freed, id);
        }
        true
    }

    /// Release every result and empty the queue. Returns how many jobs were dropped.
    pub fn clear_all(&mut self) -> usize {
        let count = self.jobs.len();
        let freed: usize = self
            .jobs
            .drain(..)
            .filter_map(|j| j.result)
            .map(ResultHandle::release)
            .sum();
        debug!("Cleared {} job(s), released {} bytes", count, freed);
        count
    }

    /// Save an already-converted result again.
    ///
    /// Earlier copies are kept; the returned path is where this copy went.
    ///
    /// # Errors
    /// [`Error::JobNotFound`] for unknown ids, [`Error::NoResult`] when the
    /// job has not converted successfully (or no sink is configured).
    pub async fn download_job(&self, id: &str) -> Result<PathBuf, Error> {
        let job = self.job(id).ok_or_else(|| Error::JobNotFound { id: id.to_string() })?;
        let handle = job.result().ok_or_else(|| Error::NoResult { id: id.to_string() })?;
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| Error::NoResult { id: id.to_string() })?;
        sink.save(&job.output_file_name(), handle.bytes()).await
    }
}
