//! Error types for the manual pipeline.
//!
//! Four failure modes, each with its own type:
//!
//! * [`ConfigError`] (**pre-flight**): the slug, settings file or source PDF
//!   is unusable. Nothing has run yet.
//!
//! * [`StageError`] (**fatal mid-stage**): a structural failure (unparseable
//!   PDF, missing input directory, page-number drift) that invalidates the
//!   page numbering of the whole manual. The stage stops immediately.
//!
//! * [`PageError`] (**recoverable**): one page's translation failed after
//!   every retry. Sibling pages carry on; the failure is written to the error
//!   inbox and tallied in the stage summary.
//!
//! * [`ConsistencyError`] (**site-build time**): a manual's manifest and
//!   dataset disagree, or an image reference does not resolve. Surfaced
//!   through [`RegistryError`] so the site build fails loudly.

use std::path::PathBuf;
use thiserror::Error;

/// Pre-flight configuration failures raised by
/// [`crate::config::ManualConfig::resolve`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required --slug argument\nUsage: manual-pipeline <stage> --slug <manual-slug>")]
    MissingSlug,

    #[error(
        "Invalid slug format: {slug:?}\n\
Slugs may only contain lowercase letters (a-z), digits (0-9) and hyphens (-).\n\
Path traversal patterns (../, ./, /) are not allowed."
    )]
    InvalidSlug { slug: String },

    #[error("Configuration file not found: '{path}'\nCreate pdf-config.json in the project root.")]
    SettingsNotFound { path: PathBuf },

    #[error("Failed to read '{path}': {source}")]
    SettingsUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid '{path}': missing \"settings\" section")]
    MissingSettingsSection { path: PathBuf },

    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("No PDF file found in '{dir}'\nPlace the manual at manual-pdf/<slug>/<filename>.pdf")]
    SourcePdfNotFound { dir: PathBuf },
}

/// Fatal failures that abort a stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Input directory not found: '{dir}'\nRun `{hint}` first.")]
    MissingInput { dir: PathBuf, hint: &'static str },

    #[error("No page files found in '{dir}'\nRun `{hint}` first.")]
    EmptyInput { dir: PathBuf, hint: &'static str },

    /// The page files in a directory are not exactly `1..=N`.
    #[error("Page numbering drift in '{dir}': expected page {expected}, found page {found}")]
    PageDrift {
        dir: PathBuf,
        expected: u32,
        found: u32,
    },

    /// A translation record claims a page number other than its file name.
    #[error("Record '{path}' declares page {declared} but its file name encodes page {expected}")]
    RecordPageMismatch {
        path: PathBuf,
        expected: u32,
        declared: u32,
    },

    #[error("Duplicate entry for page {page} in '{dir}'")]
    DuplicatePage { dir: PathBuf, page: u32 },

    #[error("Translation records reference page {page}, but the manual only has {total} pages")]
    PageOutOfRange { page: u32, total: u32 },

    #[error("PDF '{path}' cannot be parsed: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    #[error("Splitting failed for page {page}: {detail}")]
    SplitFailed { page: u32, detail: String },

    #[error("Rasterisation failed for page {page}: {detail}")]
    RenderFailed { page: u32, detail: String },

    #[error("Text extraction failed for page {page}: {detail}")]
    ExtractFailed { page: u32, detail: String },

    #[error("Invalid JSON in '{path}': {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to clean '{path}': it overlaps the source PDF directory")]
    UnsafeClean { path: PathBuf },

    #[error("Translation provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Translation finished but some pages failed; later stages would
    /// publish an incomplete dataset.
    #[error("{failed} page(s) failed to translate; see the error inbox")]
    TranslationIncomplete { failed: usize },

    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (or its directory), or place the\n\
library in the working directory.\n"
    )]
    PdfiumBindingFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PageError {
    /// Every attempt at the translation service failed.
    #[error("Page {page}: translation failed after {attempts} attempt(s): {detail}")]
    TranslationFailed {
        page: u32,
        attempts: u32,
        detail: String,
    },

    /// Reading the source text or writing the record failed.
    #[error("Page {page}: {detail}")]
    Io { page: u32, detail: String },
}

impl PageError {
    pub fn page(&self) -> u32 {
        match self {
            PageError::TranslationFailed { page, .. } | PageError::Io { page, .. } => *page,
        }
    }
}

/// A manual whose published files contradict each other.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("'{slug}': manifest totalPages is {manifest} but the dataset has {actual} pages")]
    TotalPages {
        slug: String,
        manifest: usize,
        actual: usize,
    },

    #[error("'{slug}': manifest contentPages is {manifest} but the dataset has {actual} pages with content")]
    ContentPages {
        slug: String,
        manifest: usize,
        actual: usize,
    },

    #[error("'{slug}': page at position {position} has pageNum {found}, expected {expected}")]
    PageSequence {
        slug: String,
        position: usize,
        expected: u32,
        found: u32,
    },

    #[error("'{slug}': page {page} image '{image}' is outside /{slug}/")]
    ImageOutsideRoot {
        slug: String,
        page: u32,
        image: String,
    },

    #[error("'{slug}': page {page} image '{path}' does not exist")]
    MissingImage {
        slug: String,
        page: u32,
        path: PathBuf,
    },
}

/// Errors raised by [`crate::registry::ManualRegistry`].
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Manual not found: {slug}")]
    NotFound { slug: String },

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error("Invalid JSON in '{path}': {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the offline schema migrations in [`crate::migrate`].
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Public directory not found: '{0}'")]
    MissingRoot(PathBuf),

    /// Writing a migrated file failed.
    #[error(transparent)]
    Write(#[from] StageError),

    #[error("'{path}' does not match the legacy schema: {detail}")]
    UnexpectedSchema { path: PathBuf, detail: String },

    #[error("Invalid JSON in '{path}': {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_slug_display_quotes_input() {
        let e = ConfigError::InvalidSlug {
            slug: "../etc".into(),
        };
        assert!(e.to_string().contains("\"../etc\""), "got: {e}");
    }

    #[test]
    fn page_drift_display() {
        let e = StageError::PageDrift {
            dir: PathBuf::from("split-pdf"),
            expected: 4,
            found: 5,
        };
        let msg = e.to_string();
        assert!(msg.contains("expected page 4"));
        assert!(msg.contains("found page 5"));
    }

    #[test]
    fn page_error_reports_its_page() {
        let e = PageError::TranslationFailed {
            page: 3,
            attempts: 3,
            detail: "503".into(),
        };
        assert_eq!(e.page(), 3);
        assert!(e.to_string().contains("3 attempt(s)"));
    }

    #[test]
    fn page_error_serialises() {
        let e = PageError::Io {
            page: 7,
            detail: "denied".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: PageError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn consistency_error_names_slug() {
        let e = ConsistencyError::TotalPages {
            slug: "oxi-coral".into(),
            manifest: 10,
            actual: 9,
        };
        assert!(e.to_string().contains("oxi-coral"));
        let r: RegistryError = e.into();
        assert!(matches!(r, RegistryError::Consistency(_)));
    }
}
