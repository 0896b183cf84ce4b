//! The remote job-based conversion service.
//!
//! The gateway never converts anything itself. It drives a remote job made
//! of three named tasks and waits for it:
//!
//! ```text
//! upload-file  ──▶ convert-file ──▶ export-file
//! (import/upload)  (convert)        (export/url)
//! ```
//!
//! [`ConversionService`] is the seam between the gateway and that service.
//! [`cloudconvert::CloudConvertClient`] talks to the real CloudConvert v2
//! API; tests substitute stubs or a `wiremock` server.

pub mod cloudconvert;

use crate::error::Error;
use crate::format::FileType;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub use cloudconvert::CloudConvertClient;

/// Name of the import task in every job we create.
pub const UPLOAD_TASK: &str = "upload-file";
/// Name of the convert task.
pub const CONVERT_TASK: &str = "convert-file";
/// Name of the export task.
pub const EXPORT_TASK: &str = "export-file";

/// Operations the gateway needs from a remote conversion service.
///
/// Every step returns the gateway's [`Error`] so failures surface as a
/// single translated conversion error.
#[async_trait]
pub trait ConversionService: Send + Sync {
    /// Create a job: import-by-upload → convert to `output` → export-by-url.
    async fn create_job(&self, input: FileType, output: FileType) -> Result<RemoteJob, Error>;

    /// Upload the source bytes to the job's import task.
    async fn upload(&self, job: &RemoteJob, file_name: &str, bytes: Bytes) -> Result<(), Error>;

    /// Block until the job is terminal and return its final state.
    ///
    /// Implementations do not bound this themselves; the gateway wraps the
    /// call in its configured timeout.
    async fn wait(&self, job_id: &str) -> Result<RemoteJob, Error>;

    /// Fetch the converted bytes from an export URL.
    async fn download(&self, url: &str) -> Result<Bytes, Error>;

    /// Delete the job and its files on the remote side.
    async fn delete_job(&self, job_id: &str) -> Result<(), Error>;
}

/// Build the JSON body that creates a three-task job.
pub fn job_request(input: FileType, output: FileType) -> Value {
    json!({
        "tasks": {
            UPLOAD_TASK: {
                "operation": "import/upload"
            },
            CONVERT_TASK: {
                "operation": "convert",
                "input": UPLOAD_TASK,
                "input_format": input.as_str(),
                "output_format": output.as_str()
            },
            EXPORT_TASK: {
                "operation": "export/url",
                "input": CONVERT_TASK
            }
        }
    })
}

/// Remote job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Waiting,
    Processing,
    Finished,
    Error,
    #[serde(other)]
    Unknown,
}

/// Remote task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Waiting,
    Processing,
    Finished,
    Error,
    #[serde(other)]
    Unknown,
}

/// A remote job as returned by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteJob {
    pub id: String,
    #[serde(default)]
    pub status: JobState,
    #[serde(default)]
    pub tasks: Vec<RemoteTask>,
}

/// One task inside a [`RemoteJob`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTask {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub status: TaskState,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub result: Option<TaskResult>,
}

/// The `result` object of a task. Import tasks carry an upload `form`,
/// export tasks carry `files`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub form: Option<UploadForm>,
    #[serde(default)]
    pub files: Vec<ExportedFile>,
}

/// Where and how to POST the source file for an import/upload task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadForm {
    pub url: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl UploadForm {
    /// Form parameters as text fields. The file part must follow them.
    pub fn fields(&self) -> Vec<(String, String)> {
        self.parameters
            .iter()
            .map(|(k, v)| {
                let text = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), text)
            })
            .collect()
    }
}

/// A file produced by an export task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedFile {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl RemoteJob {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobState::Finished | JobState::Error)
    }

    pub fn task(&self, name: &str) -> Option<&RemoteTask> {
        self.tasks.iter().find(|t| t.name.as_deref() == Some(name))
    }

    pub fn upload_task(&self) -> Option<&RemoteTask> {
        self.task(UPLOAD_TASK)
    }

    /// URL of the first exported file, or a description of why there is none.
    pub fn export_url(&self) -> Result<&str, String> {
        let export = self
            .task(EXPORT_TASK)
            .ok_or_else(|| format!("task '{EXPORT_TASK}' missing from job"))?;

        if export.status != TaskState::Finished {
            return Err(match self.failure_message() {
                Some(msg) => format!("task '{EXPORT_TASK}' did not finish: {msg}"),
                None => format!("task '{EXPORT_TASK}' is {:?}", export.status),
            });
        }

        export
            .result
            .as_ref()
            .and_then(|r| r.files.first())
            .and_then(|f| f.url.as_deref())
            .ok_or_else(|| "File URL not found in export task".to_string())
    }

    /// Message of the first failed task, if any reported one.
    pub fn failure_message(&self) -> Option<String> {
        self.tasks
            .iter()
            .find(|t| t.status == TaskState::Error)
            .map(|t| {
                let name = t.name.as_deref().unwrap_or(&t.id);
                match (&t.code, &t.message) {
                    (Some(code), Some(msg)) => format!("{name}: {msg} ({code})"),
                    (None, Some(msg)) => format!("{name}: {msg}"),
                    (Some(code), None) => format!("{name}: {code}"),
                    (None, None) => format!("{name}: failed"),
                }
            })
    }

    /// Pretty JSON of the job for operator diagnostics.
    pub fn diagnostics(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished_job() -> RemoteJob {
        serde_json::from_value(json!({
            "id": "job-1",
            "status": "finished",
            "tasks": [
                { "id": "t1", "name": "upload-file", "operation": "import/upload", "status": "finished" },
                { "id": "t2", "name": "convert-file", "operation": "convert", "status": "finished" },
                {
                    "id": "t3", "name": "export-file", "operation": "export/url", "status": "finished",
                    "result": { "files": [ { "filename": "file.docx", "url": "https://storage.example/file.docx", "size": 12 } ] }
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn job_request_names_three_tasks() {
        let body = job_request(FileType::Pdf, FileType::Docx);
        let tasks = body["tasks"].as_object().unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(body["tasks"]["upload-file"]["operation"], "import/upload");
        assert_eq!(body["tasks"]["convert-file"]["output_format"], "docx");
        assert_eq!(body["tasks"]["convert-file"]["input"], "upload-file");
        assert_eq!(body["tasks"]["export-file"]["input"], "convert-file");
    }

    #[test]
    fn export_url_from_finished_job() {
        let job = finished_job();
        assert!(job.is_terminal());
        assert_eq!(job.export_url().unwrap(), "https://storage.example/file.docx");
    }

    #[test]
    fn export_url_reports_failed_task() {
        let job: RemoteJob = serde_json::from_value(json!({
            "id": "job-2",
            "status": "error",
            "tasks": [
                { "id": "t2", "name": "convert-file", "status": "error",
                  "code": "INVALID_CONVERSION_TYPE", "message": "Cannot convert rtf" },
                { "id": "t3", "name": "export-file", "status": "error" }
            ]
        }))
        .unwrap();
        let err = job.export_url().unwrap_err();
        assert!(err.contains("Cannot convert rtf"), "got: {err}");
        assert!(err.contains("INVALID_CONVERSION_TYPE"), "got: {err}");
    }

    #[test]
    fn export_url_without_files() {
        let job: RemoteJob = serde_json::from_value(json!({
            "id": "job-3",
            "status": "finished",
            "tasks": [ { "id": "t3", "name": "export-file", "status": "finished", "result": { "files": [] } } ]
        }))
        .unwrap();
        assert_eq!(job.export_url().unwrap_err(), "File URL not found in export task");
    }

    #[test]
    fn unknown_states_do_not_fail_parsing() {
        let job: RemoteJob =
            serde_json::from_value(json!({ "id": "j", "status": "paused", "tasks": [] })).unwrap();
        assert_eq!(job.status, JobState::Unknown);
        assert!(!job.is_terminal());
    }

    #[test]
    fn upload_form_fields_stringify_values() {
        let form: UploadForm = serde_json::from_value(json!({
            "url": "https://upload.example/",
            "parameters": { "expires": 1700000000, "signature": "abc" }
        }))
        .unwrap();
        let fields = form.fields();
        assert!(fields.contains(&("expires".to_string(), "1700000000".to_string())));
        assert!(fields.contains(&("signature".to_string(), "abc".to_string())));
    }
}
