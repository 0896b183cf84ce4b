//! # petite-souris
//!
//! Convert office documents between PDF, DOCX, DOC, TXT, RTF, ODT and HTML
//! by delegating the actual conversion to CloudConvert.
//!
//! The crate has two halves:
//!
//! * a **conversion gateway**: an axum server exposing `POST /convert`. It
//!   validates the upload, runs one remote job (create, upload, wait,
//!   export, download, delete) and answers with the converted bytes.
//! * an **upload orchestrator**: a client-side queue that submits files to a
//!   gateway strictly one at a time and tracks per-file status.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file ─▶ Orchestrator ──POST /convert──▶ gateway ──jobs API──▶ CloudConvert
//!           │  idle → uploading → converting → success | error
//!           └─▶ ResultSink (directory / memory)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use petite_souris::{FileType, Orchestrator, OrchestratorConfig, SourceFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut queue = Orchestrator::http(OrchestratorConfig::new("http://localhost:3000"))?;
//!     queue.add_file(SourceFile::new("notes.txt", b"hello".to_vec()), FileType::Pdf)?;
//!     let summary = queue.start_all().await;
//!     eprintln!("{} converted, {} failed", summary.succeeded, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `petite-souris` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod format;
pub mod gateway;
pub mod orchestrator;
pub mod progress;
pub mod remote;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GatewayConfig, GatewayConfigBuilder, OrchestratorConfig};
pub use error::{Error, ErrorKind, JobError};
pub use format::{FileType, FormatDescriptor};
pub use gateway::{convert, ConversionPlan, ConvertedFile, Upload};
pub use orchestrator::{
    ConversionClient, ConversionJob, DirectorySink, HttpConversionClient, JobStatus, MemorySink,
    Orchestrator, QueueCounts, QueueSummary, ResultHandle, ResultSink, SourceFile,
};
pub use progress::{NoopProgressCallback, ProgressCallback, QueueProgressCallback};
pub use remote::{CloudConvertClient, ConversionService};
pub use server::{build_router, serve, AppState};
