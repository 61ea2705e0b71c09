//! Progress reporting for the long-running ingestion and analysis stages.
//!
//! Library code only talks to [`ProgressCallback`]. The binary renders it
//! as terminal bars; tests and library callers pass [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates for one stage of work.
///
/// Shared behind an `Arc`, hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Announces how many units of work the stage has.
    fn set_total(&self, total: u64);

    /// Marks `delta` more units as done.
    fn inc(&self, delta: u64);

    /// Describes the unit currently being worked on.
    fn set_message(&self, msg: String);

    /// Ends the stage with a summary line.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// A shared [`NullProgress`], for optional progress arguments left unset.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
