//! # manual-pipeline
//!
//! Turn hardware-manual PDFs into page-indexed, bilingual datasets for a
//! static documentation site.
//!
//! Every page of a manual ends up as an image plus its text in two
//! languages: the extracted source text and an LLM translation. A viewer
//! only needs `public/<slug>/`: page images, one dataset per language and a
//! manifest.
//!
//! ## Pipeline Overview
//!
//! ```text
//! manual-pdf/<slug>/*.pdf
//!  │
//!  ├─ 1. Split      one PDF per page, all-or-nothing (pdfium, spawn_blocking)
//!  ├─ 2. Render     page images at the configured DPI
//!  ├─ 3. Extract    raw text layer per page
//!  ├─ 4. Translate  batched LLM calls with timeout + exponential backoff
//!  ├─ 5. Build      pages-<source>.json and pages-<target>.json
//!  └─ 6. Manifest   manifest.json (title, brand, counts, provenance)
//! ```
//!
//! Stages talk only through files under `temp-processing/<slug>/` and
//! `public/<slug>/`, so each one can be re-run on its own. Translation is
//! resumable: a page with a record on disk is never sent again.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use manual_pipeline::{progress, run_all, LlmBackend, ManualConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ManualConfig::resolve(".", Some("oxi-coral"))?;
//!     let backend = LlmBackend::from_settings(&config.settings)?;
//!     let report = run_all(&config, &backend, &progress::noop()).await?;
//!     eprintln!("{} pages, {} with content",
//!         report.pages, report.manifest.content_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `manual-pipeline` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! manual-pipeline = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime Requirements
//!
//! The split, render and extract stages need a pdfium shared library; see
//! [`pdfium::bind`] for the lookup order. The translate stage needs the API
//! key of the configured provider in the environment.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod migrate;
pub mod output;
pub mod pdfium;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod registry;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ImageFormat, ManualConfig, ManualPaths, PageArtifact, Settings};
pub use error::{ConfigError, ConsistencyError, MigrationError, PageError, RegistryError, StageError};
pub use migrate::{MigrationOutcome, MigrationReport};
pub use output::{
    DatasetMetadata, DatasetSummary, ErrorReport, ManifestSource, ManualManifest, PageEntry, PagesDataset,
    TranslateSummary, TranslationMetadata, TranslationRecord,
};
pub use pipeline::llm::{BackendError, LlmBackend, TranslationBackend};
pub use pipeline::status::{PipelineState, PipelineStatus};
pub use progress::{NoopProgress, PipelineProgress, ProgressCallback, Stage};
pub use registry::{ManualRegistry, Navigation, RegistryEntry};
pub use run::{run_all, RunReport};
