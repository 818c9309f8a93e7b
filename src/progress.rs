//! Progress-callback trait for per-page stage events.
//!
//! Every stage takes a [`ProgressCallback`] and reports each page as it is
//! finished. The CLI forwards the events to an `indicatif` progress bar;
//! library callers can forward them anywhere.
//!
//! # Example
//!
//! ```rust
//! use manual_pipeline::{PipelineProgress, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl PipelineProgress for CountingCallback {
//!     fn on_page_complete(&self, stage: Stage, page_num: u32, total: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{stage}: page {page_num} done ({done}/{total})");
//!     }
//! }
//!
//! let progress = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//! progress.on_page_complete(Stage::Render, 1, 10);
//! ```

use std::fmt;
use std::sync::Arc;

/// Pipeline stage reporting progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Split,
    Render,
    Extract,
    Translate,
    Build,
    Manifest,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Split => "split",
            Stage::Render => "render",
            Stage::Extract => "extract",
            Stage::Translate => "translate",
            Stage::Build => "build",
            Stage::Manifest => "manifest",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Called by the stages as they process each page.
///
/// During translation, `on_page_complete`, `on_page_skipped` and
/// `on_page_error` may be called concurrently for pages of the same batch.
/// All methods default to no-ops.
pub trait PipelineProgress: Send + Sync {
    /// Called once before the first page of a stage.
    fn on_stage_start(&self, stage: Stage, total_pages: usize) {
        let _ = (stage, total_pages);
    }

    fn on_page_complete(&self, stage: Stage, page_num: u32, total_pages: usize) {
        let _ = (stage, page_num, total_pages);
    }

    /// The page already had its output (translation only).
    fn on_page_skipped(&self, stage: Stage, page_num: u32, total_pages: usize) {
        let _ = (stage, page_num, total_pages);
    }

    /// The page failed after all retries (translation only).
    fn on_page_error(&self, stage: Stage, page_num: u32, total_pages: usize, error: &str) {
        let _ = (stage, page_num, total_pages, error);
    }

    /// Called once after every page of a stage was attempted.
    fn on_stage_complete(&self, stage: Stage, done: usize) {
        let _ = (stage, done);
    }
}

/// The default when no callback is supplied.
pub struct NoopProgress;

impl PipelineProgress for NoopProgress {}

pub type ProgressCallback = Arc<dyn PipelineProgress>;

/// A shared [`NoopProgress`].
pub fn noop() -> ProgressCallback {
    Arc::new(NoopProgress)
}
