//! Progress sink for per-stage conversion events.
//!
//! Every pipeline stage reports through a [`ProgressSink`] passed by
//! reference from [`crate::Converter::convert`]. Closures implement the
//! trait, so the simplest caller is:
//!
//! ```rust
//! use fileshift::ConversionProgress;
//!
//! let sink = |p: &ConversionProgress| eprintln!("{} {}% {}", p.stage, p.progress, p.message);
//! # let _ = &sink;
//! ```
//!
//! Pipelines never call the sink directly; they go through a
//! [`ProgressReporter`], which clamps values into `0..=100`, keeps them
//! non-decreasing within one request, and remembers whether a terminal
//! event (`Complete` or `Error`) was already emitted.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

pub const STAGE_LOADING: &str = "Loading";
pub const STAGE_CONVERTING: &str = "Converting";
pub const STAGE_FINALIZING: &str = "Finalizing";
pub const STAGE_COMPLETE: &str = "Complete";
pub const STAGE_ERROR: &str = "Error";

/// One progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionProgress {
    /// Free-text stage label, e.g. "Loading" or "Complete".
    pub stage: String,
    /// Overall progress, 0–100.
    pub progress: u8,
    /// Human-readable detail.
    pub message: String,
}

/// Receives progress events. Must be `Send + Sync` because native
/// collaborators report from blocking worker threads.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: &ConversionProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(&ConversionProgress) + Send + Sync,
{
    fn on_progress(&self, progress: &ConversionProgress) {
        self(progress)
    }
}

/// A sink that drops every event.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(&self, _progress: &ConversionProgress) {}
}

/// Per-request wrapper around a [`ProgressSink`].
///
/// Cheap to clone; clones share the same high-water mark so a transcoder
/// ratio listener and the pipeline body cannot move progress backwards.
#[derive(Clone)]
pub struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    state: Arc<ReporterState>,
}

#[derive(Default)]
struct ReporterState {
    last: AtomicU8,
    terminal: AtomicBool,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            state: Arc::new(ReporterState::default()),
        }
    }

    /// Emit an event. Values below the last emitted one are raised to it.
    pub fn report(&self, stage: &str, progress: u8, message: impl Into<String>) {
        let requested = progress.min(100);
        let previous = self.state.last.fetch_max(requested, Ordering::SeqCst);
        let value = previous.max(requested);
        if stage == STAGE_COMPLETE || stage == STAGE_ERROR {
            self.state.terminal.store(true, Ordering::SeqCst);
        }
        self.sink.on_progress(&ConversionProgress {
            stage: stage.to_string(),
            progress: value,
            message: message.into(),
        });
    }

    /// Linear interpolation of `done / total` onto `lower..=upper`.
    pub fn report_fraction(
        &self,
        stage: &str,
        lower: u8,
        upper: u8,
        done: usize,
        total: usize,
        message: impl Into<String>,
    ) {
        let ratio = if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        };
        self.report(stage, interpolate(lower, upper, ratio), message);
    }

    pub fn complete(&self, message: impl Into<String>) {
        self.report(STAGE_COMPLETE, 100, message);
    }

    /// Emit an `Error` event at the current high-water mark.
    pub fn error(&self, message: impl Into<String>) {
        self.report(STAGE_ERROR, self.last(), message);
    }

    pub fn last(&self) -> u8 {
        self.state.last.load(Ordering::SeqCst)
    }

    /// Whether `Complete` or `Error` has been emitted.
    pub fn is_terminated(&self) -> bool {
        self.state.terminal.load(Ordering::SeqCst)
    }
}

/// Map a 0.0–1.0 ratio onto `lower..=upper`, clamping out-of-range ratios.
pub fn interpolate(lower: u8, upper: u8, ratio: f64) -> u8 {
    let ratio = if ratio.is_finite() {
        ratio.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let span = upper.saturating_sub(lower) as f64;
    lower + (span * ratio).round() as u8
}
