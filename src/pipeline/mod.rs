//! Pipeline stages for one manual.
//!
//! Each submodule implements exactly one transformation step. Stages are
//! chained only through the filesystem, so each can be re-run on its own.
//!
//! ## Data Flow
//!
//! ```text
//! split ──▶ render ──▶ translate ──▶ dataset ──▶ manifest
//!   │                     ▲
//!   └──────▶ extract ─────┘
//! (pdfium)  (pdfium)  (llm + postprocess)
//! ```
//!
//! 1. [`split`]      source PDF → `page-NNN.pdf`, all-or-nothing
//! 2. [`render`]     page PDFs → images at the configured DPI
//! 3. [`extract`]    page PDFs → raw text
//! 4. [`translate`]  text → translation records, batched, with retry via
//!    [`llm`] and cleanup via [`postprocess`]
//! 5. [`dataset`]    records + text → `pages-<lang>.json`
//! 6. [`manifest`]   dataset → `manifest.json`
//!
//! [`clean`] and [`status`] operate on the same directories; [`files`] holds
//! the page-file naming and atomic-write helpers every stage shares.

pub mod clean;
pub mod dataset;
pub mod extract;
pub mod files;
pub mod llm;
pub mod manifest;
pub mod postprocess;
pub mod render;
pub mod split;
pub mod status;
pub mod translate;
