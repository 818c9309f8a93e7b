//! On-disk document types and stage summaries.
//!
//! Every JSON document the pipeline writes or the registry reads is defined
//! here. Field names are camelCase on disk.

use crate::config::ImageFormat;
use crate::error::PageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Translation records ──────────────────────────────────────────────────

/// One translated page in `translations-draft/page-NNN.json`.
///
/// An existing record is the unit of idempotence: the translator skips any
/// page that already has one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRecord {
    pub page_num: u32,
    pub translation: String,
    pub metadata: TranslationMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationMetadata {
    pub translated_at: DateTime<Utc>,
    /// `"<provider>-api"`, or `"empty-source"` when no call was made.
    pub method: String,
    pub model: String,
    /// 1-based attempt that succeeded.
    pub attempts: u32,
}

/// Method recorded for pages whose extracted text is empty.
pub const EMPTY_SOURCE_METHOD: &str = "empty-source";

/// `__inbox/<slug>/translation-error-page-NNN.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub page: u32,
    /// Human-readable message.
    pub error: String,
    pub failure: PageError,
    pub timestamp: DateTime<Utc>,
}

// ── Datasets ─────────────────────────────────────────────────────────────

/// One page of a [`PagesDataset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEntry {
    pub page_num: u32,
    /// Public URL, derived from slug and page number.
    pub image: String,
    pub title: String,
    pub section_name: Option<String>,
    pub content: String,
    pub has_content: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// `true` when `content` has any non-whitespace character.
pub fn has_content(content: &str) -> bool {
    !content.trim().is_empty()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    pub processed_at: DateTime<Utc>,
    pub language: String,
    /// `"translation"` for the target language, `"extraction"` for the source.
    pub method: String,
    pub image_format: ImageFormat,
    #[serde(rename = "imageDPI")]
    pub image_dpi: u32,
}

/// `public/<slug>/data/pages-<lang>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagesDataset {
    pub metadata: DatasetMetadata,
    pub pages: Vec<PageEntry>,
}

impl PagesDataset {
    pub fn content_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.has_content).count()
    }
}

// ── Manifest ─────────────────────────────────────────────────────────────

/// `public/<slug>/data/manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualManifest {
    pub title: String,
    pub brand: String,
    pub version: String,
    pub total_pages: usize,
    pub content_pages: usize,
    pub last_updated: DateTime<Utc>,
    pub source: ManifestSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSource {
    pub filename: String,
    pub processed_at: DateTime<Utc>,
    #[serde(rename = "imageDPI")]
    pub image_dpi: u32,
    pub image_format: ImageFormat,
}

// ── Summaries ────────────────────────────────────────────────────────────

/// Outcome of one translation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslateSummary {
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<PageError>,
}

impl TranslateSummary {
    pub fn total(&self) -> usize {
        self.success + self.skipped + self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Page counts of the datasets written by one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatasetSummary {
    pub target_pages: usize,
    /// `None` when no extracted text was available.
    pub source_pages: Option<usize>,
    pub content_pages: usize,
    /// Pages with no translation record, emitted with empty content.
    pub missing_records: usize,
}
