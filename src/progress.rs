//! Progress-callback trait for upload queue events.
//!
//! Inject an [`Arc<dyn QueueProgressCallback>`] via
//! [`crate::orchestrator::Orchestrator::with_progress`] to observe jobs as
//! the queue works through them. The CLI uses this to drive its progress
//! bar; a UI could forward the same events to a channel or a websocket.
//!
//! # Example
//!
//! ```rust
//! use petite_souris::{QueueProgressCallback, JobStatus};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     converting: AtomicUsize,
//! }
//!
//! impl QueueProgressCallback for CountingCallback {
//!     fn on_status_change(&self, _id: &str, status: JobStatus) {
//!         if status == JobStatus::Converting {
//!             self.converting.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let cb: Arc<dyn QueueProgressCallback> = Arc::new(CountingCallback {
//!     converting: AtomicUsize::new(0),
//! });
//! cb.on_status_change("job-1", JobStatus::Converting);
//! ```

use crate::orchestrator::{JobStatus, QueueSummary};
use std::sync::Arc;

/// Called by the orchestrator while it drains the queue.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Jobs are processed one at a time, so calls never
/// overlap for a single orchestrator, but implementations must still be
/// `Send + Sync` to be shared with other tasks.
pub trait QueueProgressCallback: Send + Sync {
    /// Called once before the first pending job is submitted.
    fn on_queue_start(&self, pending: usize) {
        let _ = pending;
    }

    /// Called when a job is picked from the queue.
    ///
    /// # Arguments
    /// * `position` — 1-indexed position within this run
    /// * `total`    — pending jobs at the start of the run
    fn on_job_start(&self, id: &str, file_name: &str, position: usize, total: usize) {
        let _ = (id, file_name, position, total);
    }

    /// Called on every status transition of a job.
    fn on_status_change(&self, id: &str, status: JobStatus) {
        let _ = (id, status);
    }

    /// Called when a job converted successfully.
    fn on_job_complete(&self, id: &str, output_name: &str, bytes: usize) {
        let _ = (id, output_name, bytes);
    }

    /// Called when a job failed; the queue continues afterwards.
    fn on_job_error(&self, id: &str, error: &str) {
        let _ = (id, error);
    }

    /// Called once after every pending job has been attempted.
    fn on_queue_complete(&self, summary: &QueueSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl QueueProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type stored by the orchestrator.
pub type ProgressCallback = Arc<dyn QueueProgressCallback>;
