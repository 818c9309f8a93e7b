//! Per-manual configuration: slug validation, settings file, path layout.
//!
//! Every stage starts from a [`ManualConfig`] produced by
//! [`ManualConfig::resolve`]. All paths are pure functions of the project
//! root and the slug, so two manuals can never write into each other's
//! directories and nothing depends on hidden global state.

use crate::error::ConfigError;
use crate::pipeline::files::page_file_name;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Settings file expected at the project root.
pub const SETTINGS_FILE: &str = "pdf-config.json";
/// Source PDFs live in `manual-pdf/<slug>/`. Never written by the pipeline.
pub const SOURCE_DIR: &str = "manual-pdf";
/// Committed output served by the site.
pub const PUBLIC_DIR: &str = "public";
/// Intermediate artifacts, safe to delete.
pub const TEMP_DIR: &str = "temp-processing";
/// Per-page translation error reports.
pub const INBOX_DIR: &str = "__inbox";

static RE_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());

/// Check a slug against `^[a-z0-9-]+$`.
///
/// The pattern admits no `/`, `\` or `.`, so a valid slug can never escape
/// the directory it is joined onto.
pub fn validate_slug(slug: &str) -> Result<(), ConfigError> {
    if RE_SLUG.is_match(slug) {
        Ok(())
    } else {
        Err(ConfigError::InvalidSlug {
            slug: slug.to_string(),
        })
    }
}

// ── Settings ─────────────────────────────────────────────────────────────

/// Raster format of the rendered page images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
}

impl ImageFormat {
    /// File extension used in page image names.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn as_image_format(self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Png => f.write_str("png"),
            ImageFormat::Jpeg => f.write_str("jpeg"),
        }
    }
}

/// The `settings` section of `pdf-config.json`.
///
/// `imageDPI`, `imageFormat` and `translationModel` are required; everything
/// else has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Rendering resolution. Range: 72–600.
    #[serde(rename = "imageDPI")]
    pub image_dpi: u32,

    pub image_format: ImageFormat,

    /// Model identifier passed to the translation provider.
    pub translation_model: String,

    /// Pages translated concurrently per batch. Default: 4.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Provider name understood by `edgequake_llm::ProviderFactory`.
    #[serde(default = "default_provider")]
    pub translation_provider: String,

    #[serde(default = "default_source_language")]
    pub source_language: String,

    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Technical terms the translation must keep verbatim.
    #[serde(default = "default_preserve_terms")]
    pub preserve_terms: Vec<String>,

    /// Attempts per page before the page is recorded as failed. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base in milliseconds; doubles after every failed attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Per-call timeout for the translation service.
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Tag name → keywords; a page gets the tag when any keyword occurs in
    /// its title or section name.
    #[serde(default)]
    pub tag_rules: BTreeMap<String, Vec<String>>,
}

fn default_batch_size() -> usize {
    4
}
fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_source_language() -> String {
    "en".to_string()
}
fn default_target_language() -> String {
    "ja".to_string()
}
fn default_preserve_terms() -> Vec<String> {
    ["MIDI", "CV", "Gate", "Sequencer", "BPM", "LFO"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_api_timeout_secs() -> u64 {
    120
}
fn default_max_tokens() -> usize {
    16000
}
fn default_temperature() -> f32 {
    0.2
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            image_dpi: 300,
            image_format: ImageFormat::Png,
            translation_model: "claude-sonnet-4-20250514".to_string(),
            batch_size: default_batch_size(),
            translation_provider: default_provider(),
            source_language: default_source_language(),
            target_language: default_target_language(),
            preserve_terms: default_preserve_terms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            api_timeout_secs: default_api_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            tag_rules: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load and validate the `settings` section of a settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::SettingsNotFound {
                path: path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::SettingsUnreadable {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::parse(&raw, path)
    }

    /// Parse settings-file contents. `origin` is only used in error messages.
    pub fn parse(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let mut doc: serde_json::Value =
            serde_json::from_str(raw).map_err(|source| ConfigError::SettingsParse {
                path: origin.to_path_buf(),
                source,
            })?;

        let section = match doc.get_mut("settings") {
            Some(v) if v.is_object() => v.take(),
            _ => {
                return Err(ConfigError::MissingSettingsSection {
                    path: origin.to_path_buf(),
                })
            }
        };

        let settings: Settings =
            serde_json::from_value(section).map_err(|source| ConfigError::SettingsParse {
                path: origin.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(72..=600).contains(&self.image_dpi) {
            return Err(ConfigError::InvalidSetting {
                field: "imageDPI",
                reason: format!("must be 72–600, got {}", self.image_dpi),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "batchSize",
                reason: "must be ≥ 1".into(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "maxRetries",
                reason: "must be ≥ 1".into(),
            });
        }
        if self.api_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "apiTimeoutSecs",
                reason: "must be ≥ 1".into(),
            });
        }
        if self.translation_model.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                field: "translationModel",
                reason: "must not be empty".into(),
            });
        }
        for (field, lang) in [
            ("sourceLanguage", &self.source_language),
            ("targetLanguage", &self.target_language),
        ] {
            if !RE_SLUG.is_match(lang) {
                return Err(ConfigError::InvalidSetting {
                    field,
                    reason: format!("{lang:?} is not a language code"),
                });
            }
        }
        if self.source_language == self.target_language {
            return Err(ConfigError::InvalidSetting {
                field: "targetLanguage",
                reason: "must differ from sourceLanguage".into(),
            });
        }
        Ok(())
    }

    /// Viewport scale factor for pdfium: PDF user space is 72 units per inch.
    pub fn render_scale(&self) -> f32 {
        self.image_dpi as f32 / 72.0
    }
}

// ── Paths ────────────────────────────────────────────────────────────────

/// Every directory the pipeline reads or writes for one manual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualPaths {
    /// `manual-pdf/<slug>`, input only.
    pub source_dir: PathBuf,
    /// `temp-processing/<slug>/split-pdf`
    pub split_pdf: PathBuf,
    /// `temp-processing/<slug>/extracted`
    pub extracted: PathBuf,
    /// `temp-processing/<slug>/translations-draft`
    pub translations_draft: PathBuf,
    /// `public/<slug>/pages`
    pub images: PathBuf,
    /// `public/<slug>/data`
    pub data: PathBuf,
    /// `__inbox/<slug>`
    pub inbox: PathBuf,
}

impl ManualPaths {
    /// Compute the layout for `slug` under `root`. The slug must already be
    /// validated.
    pub fn for_slug(root: &Path, slug: &str) -> Self {
        let temp = root.join(TEMP_DIR).join(slug);
        let public = root.join(PUBLIC_DIR).join(slug);
        Self {
            source_dir: root.join(SOURCE_DIR).join(slug),
            split_pdf: temp.join("split-pdf"),
            extracted: temp.join("extracted"),
            translations_draft: temp.join("translations-draft"),
            images: public.join("pages"),
            data: public.join("data"),
            inbox: root.join(INBOX_DIR).join(slug),
        }
    }

    /// Directories owned (and therefore cleanable) by the pipeline.
    pub fn owned_dirs(&self) -> [(&'static str, &Path); 6] {
        [
            ("Rendered images", self.images.as_path()),
            ("Datasets", self.data.as_path()),
            ("Page PDFs", self.split_pdf.as_path()),
            ("Extracted text", self.extracted.as_path()),
            ("Translation drafts", self.translations_draft.as_path()),
            ("Error reports", self.inbox.as_path()),
        ]
    }
}

/// The files belonging to one page of a manual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageArtifact {
    /// 1-based page number.
    pub page_num: u32,
    pub split_pdf: PathBuf,
    pub image: PathBuf,
    pub text: PathBuf,
    pub record: PathBuf,
    pub error_report: PathBuf,
}

// ── ManualConfig ─────────────────────────────────────────────────────────

/// Resolved, immutable configuration for one pipeline run on one manual.
#[derive(Debug, Clone)]
pub struct ManualConfig {
    pub slug: String,
    pub root: PathBuf,
    pub source_pdf: PathBuf,
    pub paths: ManualPaths,
    pub settings: Settings,
}

impl ManualConfig {
    /// Resolve the configuration for `slug` under the project `root`.
    ///
    /// Fails with [`ConfigError`] when the slug is missing or malformed, the
    /// settings file is missing or invalid, or `manual-pdf/<slug>/` holds no
    /// PDF. With several PDFs the lexicographically first one is used and
    /// the rest are named in a warning.
    pub fn resolve(root: impl AsRef<Path>, slug: Option<&str>) -> Result<Self, ConfigError> {
        let root = root.as_ref();
        let slug = match slug.map(str::trim) {
            Some(s) if !s.is_empty() => s,
            _ => return Err(ConfigError::MissingSlug),
        };
        validate_slug(slug)?;

        let settings = Settings::load(&root.join(SETTINGS_FILE))?;
        let paths = ManualPaths::for_slug(root, slug);
        let source_pdf = find_source_pdf(&paths.source_dir)?;

        debug!("Resolved manual '{}' → {}", slug, source_pdf.display());
        Self::new(root, slug, source_pdf, settings)
    }

    /// Build a configuration from already-loaded parts.
    pub fn new(
        root: impl AsRef<Path>,
        slug: &str,
        source_pdf: impl Into<PathBuf>,
        settings: Settings,
    ) -> Result<Self, ConfigError> {
        validate_slug(slug)?;
        settings.validate()?;
        let root = root.as_ref().to_path_buf();
        Ok(Self {
            slug: slug.to_string(),
            paths: ManualPaths::for_slug(&root, slug),
            root,
            source_pdf: source_pdf.into(),
            settings,
        })
    }

    /// The files of page `page_num`.
    pub fn artifact(&self, page_num: u32) -> PageArtifact {
        PageArtifact {
            page_num,
            split_pdf: self.paths.split_pdf.join(page_file_name(page_num, "pdf")),
            image: self
                .paths
                .images
                .join(page_file_name(page_num, self.settings.image_format.extension())),
            text: self.paths.extracted.join(page_file_name(page_num, "txt")),
            record: self
                .paths
                .translations_draft
                .join(page_file_name(page_num, "json")),
            error_report: self
                .paths
                .inbox
                .join(format!("translation-error-{}", page_file_name(page_num, "json"))),
        }
    }

    /// Public URL of a page image, as referenced from the datasets.
    pub fn image_url(&self, page_num: u32) -> String {
        format!(
            "/{}/pages/{}",
            self.slug,
            page_file_name(page_num, self.settings.image_format.extension())
        )
    }

    /// `public/<slug>/data/pages-<lang>.json`
    pub fn dataset_path(&self, language: &str) -> PathBuf {
        self.paths.data.join(format!("pages-{language}.json"))
    }

    /// `public/<slug>/data/manifest.json`
    pub fn manifest_path(&self) -> PathBuf {
        self.paths.data.join("manifest.json")
    }

    /// File name of the source PDF.
    pub fn source_filename(&self) -> String {
        self.source_pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Pick the lexicographically first `*.pdf` in `dir`.
fn find_source_pdf(dir: &Path) -> Result<PathBuf, ConfigError> {
    let not_found = || ConfigError::SourcePdfNotFound {
        dir: dir.to_path_buf(),
    };
    let entries = std::fs::read_dir(dir).map_err(|_| not_found())?;

    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "pdf"))
        .collect();
    pdfs.sort();

    let mut iter = pdfs.into_iter();
    let first = iter.next().ok_or_else(not_found)?;
    let ignored: Vec<String> = iter.map(|p| p.display().to_string()).collect();
    if !ignored.is_empty() {
        warn!(
            "Multiple PDF files found in {}; using {}, ignoring: {}",
            dir.display(),
            first.display(),
            ignored.join(", ")
        );
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const SETTINGS_JSON: &str = r#"{
        "settings": {
            "imageDPI": 150,
            "imageFormat": "png",
            "translationModel": "claude-sonnet-4-20250514",
            "batchSize": 2
        }
    }"#;

    fn project(settings: Option<&str>, pdfs: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        if let Some(s) = settings {
            std::fs::write(dir.path().join(SETTINGS_FILE), s).unwrap();
        }
        let src = dir.path().join(SOURCE_DIR).join("oxi-one-mk2");
        std::fs::create_dir_all(&src).unwrap();
        for name in pdfs {
            std::fs::write(src.join(name), b"%PDF-1.7").unwrap();
        }
        dir
    }

    #[test]
    fn slug_pattern() {
        for ok in ["oxi-one-mk2", "addac112-looper", "a", "2024", "-"] {
            assert!(validate_slug(ok).is_ok(), "{ok} should be accepted");
        }
        for bad in [
            "../etc", "a/b", "a\\b", "..", ".hidden", "Oxi", "OXI-ONE", "a b", "", "über",
        ] {
            assert!(
                matches!(validate_slug(bad), Err(ConfigError::InvalidSlug { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn resolve_happy_path() {
        let dir = project(Some(SETTINGS_JSON), &["Manual.pdf"]);
        let cfg = ManualConfig::resolve(dir.path(), Some("oxi-one-mk2")).unwrap();

        assert_eq!(cfg.slug, "oxi-one-mk2");
        assert_eq!(cfg.source_filename(), "Manual.pdf");
        assert_eq!(cfg.settings.image_dpi, 150);
        assert_eq!(cfg.settings.batch_size, 2);
        assert_eq!(cfg.settings.max_retries, 3);
        assert_eq!(cfg.settings.target_language, "ja");
        assert_eq!(
            cfg.paths.images,
            dir.path().join("public/oxi-one-mk2/pages")
        );
        assert_eq!(
            cfg.paths.split_pdf,
            dir.path().join("temp-processing/oxi-one-mk2/split-pdf")
        );
    }

    #[test]
    fn resolve_missing_slug() {
        let dir = project(Some(SETTINGS_JSON), &["Manual.pdf"]);
        assert!(matches!(
            ManualConfig::resolve(dir.path(), None),
            Err(ConfigError::MissingSlug)
        ));
        assert!(matches!(
            ManualConfig::resolve(dir.path(), Some("  ")),
            Err(ConfigError::MissingSlug)
        ));
    }

    #[test]
    fn resolve_rejects_traversal_before_touching_disk() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ManualConfig::resolve(dir.path(), Some("../etc")),
            Err(ConfigError::InvalidSlug { .. })
        ));
    }

    #[test]
    fn resolve_missing_settings() {
        let dir = project(None, &["Manual.pdf"]);
        assert!(matches!(
            ManualConfig::resolve(dir.path(), Some("oxi-one-mk2")),
            Err(ConfigError::SettingsNotFound { .. })
        ));
    }

    #[test]
    fn resolve_unparseable_settings() {
        let dir = project(Some("{ not json"), &["Manual.pdf"]);
        assert!(matches!(
            ManualConfig::resolve(dir.path(), Some("oxi-one-mk2")),
            Err(ConfigError::SettingsParse { .. })
        ));
    }

    #[test]
    fn resolve_settings_without_section() {
        let dir = project(Some(r#"{ "input": {} }"#), &["Manual.pdf"]);
        assert!(matches!(
            ManualConfig::resolve(dir.path(), Some("oxi-one-mk2")),
            Err(ConfigError::MissingSettingsSection { .. })
        ));
    }

    #[test]
    fn resolve_settings_schema_violation() {
        let dir = project(
            Some(r#"{ "settings": { "imageDPI": 150, "imageFormat": "tiff", "translationModel": "m" } }"#),
            &["Manual.pdf"],
        );
        assert!(matches!(
            ManualConfig::resolve(dir.path(), Some("oxi-one-mk2")),
            Err(ConfigError::SettingsParse { .. })
        ));

        let dir = project(
            Some(r#"{ "settings": { "imageDPI": 10, "imageFormat": "png", "translationModel": "m" } }"#),
            &["Manual.pdf"],
        );
        assert!(matches!(
            ManualConfig::resolve(dir.path(), Some("oxi-one-mk2")),
            Err(ConfigError::InvalidSetting { field: "imageDPI", .. })
        ));
    }

    #[test]
    fn zero_api_timeout_rejected() {
        let settings = Settings {
            api_timeout_secs: 0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidSetting { field: "apiTimeoutSecs", .. })
        ));
    }

    #[test]
    fn resolve_no_pdf() {
        let dir = project(Some(SETTINGS_JSON), &["notes.txt"]);
        assert!(matches!(
            ManualConfig::resolve(dir.path(), Some("oxi-one-mk2")),
            Err(ConfigError::SourcePdfNotFound { .. })
        ));
        assert!(matches!(
            ManualConfig::resolve(dir.path(), Some("oxi-coral")),
            Err(ConfigError::SourcePdfNotFound { .. })
        ));
    }

    #[test]
    fn resolve_picks_lexicographically_first_pdf() {
        let dir = project(Some(SETTINGS_JSON), &["b-manual.pdf", "a-manual.pdf", "c.pdf"]);
        let cfg = ManualConfig::resolve(dir.path(), Some("oxi-one-mk2")).unwrap();
        assert_eq!(cfg.source_filename(), "a-manual.pdf");
    }

    /// Collects formatted log lines.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn resolve_warns_about_ignored_pdfs() {
        let dir = project(Some(SETTINGS_JSON), &["b-manual.pdf", "a-manual.pdf", "c.pdf"]);
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let cfg = tracing::subscriber::with_default(subscriber, || {
            ManualConfig::resolve(dir.path(), Some("oxi-one-mk2"))
        })
        .unwrap();
        assert_eq!(cfg.source_filename(), "a-manual.pdf");

        let out = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let line = out
            .lines()
            .find(|l| l.contains("Multiple PDF files"))
            .unwrap_or_else(|| panic!("no warning in {out:?}"));
        assert!(line.contains("WARN"), "{line}");
        assert!(line.contains("b-manual.pdf") && line.contains("c.pdf"), "{line}");
        assert!(!line.contains("ignoring: a-manual.pdf"), "{line}");
    }

    #[test]
    fn single_pdf_logs_no_warning() {
        let dir = project(Some(SETTINGS_JSON), &["Manual.pdf"]);
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            ManualConfig::resolve(dir.path(), Some("oxi-one-mk2"))
        })
        .unwrap();
        let out = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(!out.contains("WARN"), "{out}");
    }

    #[test]
    fn paths_do_not_collide_across_slugs() {
        let root = Path::new("/project");
        let a = ManualPaths::for_slug(root, "oxi-coral");
        let b = ManualPaths::for_slug(root, "oxi-coral-2");
        for ((_, x), (_, y)) in a.owned_dirs().iter().zip(b.owned_dirs().iter()) {
            assert_ne!(x, y);
        }
    }

    #[test]
    fn artifact_names_are_zero_padded() {
        let cfg = ManualConfig::new("/p", "oxi-coral", "/p/manual-pdf/oxi-coral/x.pdf", Settings::default())
            .unwrap();
        let a = cfg.artifact(7);
        assert!(a.split_pdf.ends_with("split-pdf/page-007.pdf"));
        assert!(a.image.ends_with("pages/page-007.png"));
        assert!(a.text.ends_with("extracted/page-007.txt"));
        assert!(a.record.ends_with("translations-draft/page-007.json"));
        assert!(a.error_report.ends_with("oxi-coral/translation-error-page-007.json"));
        assert_eq!(cfg.image_url(12), "/oxi-coral/pages/page-012.png");
    }

    #[test]
    fn render_scale_from_dpi() {
        let s = Settings {
            image_dpi: 144,
            ..Settings::default()
        };
        assert!((s.render_scale() - 2.0).abs() < f32::EPSILON);
    }
}
