//! The conversion gateway: one upload in, one converted file out.
//!
//! The gateway is stateless. Each call validates its input, then drives a
//! single remote job through the [`ConversionService`] seam:
//!
//! ```text
//! received ─▶ validated ─▶ job-created ─▶ uploaded ─▶ waiting
//!          ─▶ exported ─▶ downloaded ─▶ job-deleted ─▶ responded
//! ```
//!
//! Any step may fail, which short-circuits the rest. Validation failures
//! happen before the first remote call, so a bad upload costs nothing on the
//! remote side.

use crate::config::GatewayConfig;
use crate::error::Error;
use crate::format::{self, FileType};
use crate::remote::ConversionService;
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// A file as received by the gateway.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// The result of a successful conversion.
#[derive(Debug, Clone)]
pub struct ConvertedFile {
    /// Download name, e.g. `report.docx`.
    pub file_name: String,
    pub format: FileType,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Formats resolved for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConversionPlan {
    pub input: FileType,
    pub output: FileType,
}

/// Per-request progress, logged at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    JobCreated,
    Uploaded,
    Waiting,
    Exported,
    Downloaded,
    JobDeleted,
    Responded,
    Errored,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::JobCreated => "job-created",
            Stage::Uploaded => "uploaded",
            Stage::Waiting => "waiting",
            Stage::Exported => "exported",
            Stage::Downloaded => "downloaded",
            Stage::JobDeleted => "job-deleted",
            Stage::Responded => "responded",
            Stage::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Validate an upload and resolve its input/output formats.
///
/// Checks run in order: size, extension, requested output (an unknown or
/// absent value falls back to [`format::default_output`]), then the
/// equality guard.
pub fn plan(
    file_name: &str,
    size: u64,
    requested_output: Option<&str>,
    max_file_size: u64,
) -> Result<ConversionPlan, Error> {
    if size > max_file_size {
        return Err(Error::FileTooLarge {
            limit_mb: format::size_limit_mb(max_file_size),
        });
    }

    let input = format::detect_format(file_name).ok_or_else(|| Error::UnsupportedFormat {
        extension: format::file_extension(file_name),
        supported: format::supported_extensions(),
    })?;

    let output = requested_output
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| match s.parse::<FileType>() {
            Ok(ft) => Some(ft),
            Err(e) => {
                debug!("Ignoring requested output format: {}", e);
                None
            }
        })
        .unwrap_or_else(|| format::default_output(input));

    if input == output {
        return Err(Error::IdenticalFormats {
            format: input.to_string(),
        });
    }

    Ok(ConversionPlan { input, output })
}

/// Convert an upload via the remote service.
///
/// # Errors
/// Validation errors ([`Error::FileTooLarge`], [`Error::UnsupportedFormat`],
/// [`Error::IdenticalFormats`]) are returned before any remote call. Remote
/// failures surface as the error of the step that failed; a stuck job
/// yields [`Error::Timeout`] after `config.wait_timeout_secs`.
pub async fn convert(
    upload: Upload,
    requested_output: Option<&str>,
    config: &GatewayConfig,
    service: &dyn ConversionService,
) -> Result<ConvertedFile, Error> {
    let start = Instant::now();
    debug!("[{}] '{}' ({} bytes)", Stage::Received, upload.file_name, upload.bytes.len());

    let plan = plan(
        &upload.file_name,
        upload.bytes.len() as u64,
        requested_output,
        config.max_file_size,
    )?;
    debug!("[{}] {} → {}", Stage::Validated, plan.input, plan.output);
    info!(
        "Converting '{}' from {} to {}",
        upload.file_name, plan.input, plan.output
    );

    let job = service.create_job(plan.input, plan.output).await?;
    debug!("[{}] job {}", Stage::JobCreated, job.id);

    let result = run_job(&job, plan, upload.bytes, config, service).await;

    // Best effort: the job is deleted whether or not the conversion worked,
    // and a failed delete never changes the outcome.
    match service.delete_job(&job.id).await {
        Ok(()) => debug!("[{}] job {}", Stage::JobDeleted, job.id),
        Err(e) => warn!("Failed to delete remote job {}: {}", job.id, e),
    }

    match result {
        Ok(bytes) => {
            let file_name = format::output_file_name(&upload.file_name, plan.output);
            info!(
                "Converted '{}' → '{}' ({} bytes) in {}ms",
                upload.file_name,
                file_name,
                bytes.len(),
                start.elapsed().as_millis()
            );
            debug!("[{}] job {}", Stage::Responded, job.id);
            Ok(ConvertedFile {
                file_name,
                format: plan.output,
                content_type: plan.output.content_type().to_string(),
                bytes,
            })
        }
        Err(e) => {
            debug!("[{}] job {}: {}", Stage::Errored, job.id, e);
            Err(e)
        }
    }
}

/// Steps between job creation and cleanup.
async fn run_job(
    job: &crate::remote::RemoteJob,
    plan: ConversionPlan,
    bytes: Bytes,
    config: &GatewayConfig,
    service: &dyn ConversionService,
) -> Result<Bytes, Error> {
    // The service needs a filename whose extension matches the input format.
    let upload_name = format!("file.{}", plan.input.extension());
    service.upload(job, &upload_name, bytes).await?;
    debug!("[{}] job {}", Stage::Uploaded, job.id);

    debug!("[{}] job {} (timeout {}s)", Stage::Waiting, job.id, config.wait_timeout_secs);
    let finished = tokio::time::timeout(config.wait_timeout(), service.wait(&job.id))
        .await
        .map_err(|_| Error::Timeout {
            secs: config.wait_timeout_secs,
        })??;

    let url = match finished.export_url() {
        Ok(url) => url.to_string(),
        Err(reason) => {
            let diagnostics = finished.diagnostics();
            error!("Job {} has no export: {}\nJob details: {}", job.id, reason, diagnostics);
            return Err(Error::ExportFailed {
                reason,
                diagnostics,
            });
        }
    };
    debug!("[{}] job {}", Stage::Exported, job.id);

    let converted = service.download(&url).await?;
    debug!("[{}] job {} ({} bytes)", Stage::Downloaded, job.id, converted.len());
    Ok(converted)
}
