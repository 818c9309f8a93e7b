//! Manifest builder: target-language dataset → `manifest.json`.

use crate::config::ManualConfig;
use crate::error::StageError;
use crate::output::{ManifestSource, ManualManifest, PagesDataset};
use crate::pipeline::files::{read_json, write_json_atomic};
use crate::progress::{ProgressCallback, Stage};
use chrono::Utc;
use tracing::info;

/// Manifest schema version.
pub const MANIFEST_VERSION: &str = "1.0.0";

const TITLES: &[(&str, &str)] = &[
    ("oxi-one-mk2", "OXI ONE MKII Manual"),
    ("oxi-coral", "OXI Coral Manual"),
];

const BRANDS: &[(&str, &str)] = &[("oxi", "OXI Instruments"), ("addac", "ADDAC System")];

/// Display title for a slug: the lookup table, else the slug uppercased with
/// hyphens as spaces plus ` Manual`.
pub fn slug_to_title(slug: &str) -> String {
    TITLES
        .iter()
        .find(|(s, _)| *s == slug)
        .map(|(_, title)| title.to_string())
        .unwrap_or_else(|| format!("{} Manual", slug.to_uppercase().replace('-', " ")))
}

/// Brand for a slug, matched on its leading characters, else the first
/// hyphen-separated segment uppercased.
pub fn slug_to_brand(slug: &str) -> String {
    BRANDS
        .iter()
        .find(|(prefix, _)| slug.starts_with(prefix))
        .map(|(_, brand)| brand.to_string())
        .unwrap_or_else(|| {
            slug.split('-')
                .find(|s| !s.is_empty())
                .unwrap_or(slug)
                .to_uppercase()
        })
}

/// Rewrite `manifest.json` from the target-language dataset.
pub fn build_manifest(
    config: &ManualConfig,
    progress: &ProgressCallback,
) -> Result<ManualManifest, StageError> {
    let dataset_path = config.dataset_path(&config.settings.target_language);
    if !dataset_path.is_file() {
        return Err(StageError::MissingInput {
            dir: dataset_path,
            hint: "manual-pipeline build",
        });
    }
    let dataset: PagesDataset = read_json(&dataset_path)?;
    progress.on_stage_start(Stage::Manifest, dataset.pages.len());

    let now = Utc::now();
    let manifest = ManualManifest {
        title: slug_to_title(&config.slug),
        brand: slug_to_brand(&config.slug),
        version: MANIFEST_VERSION.to_string(),
        total_pages: dataset.pages.len(),
        content_pages: dataset.content_pages(),
        last_updated: now,
        source: ManifestSource {
            filename: config.source_filename(),
            processed_at: dataset.metadata.processed_at,
            image_dpi: config.settings.image_dpi,
            image_format: config.settings.image_format,
        },
    };

    write_json_atomic(&config.manifest_path(), &manifest)?;
    progress.on_stage_complete(Stage::Manifest, manifest.total_pages);
    info!(
        "Manifest for '{}': {} pages, {} with content",
        config.slug, manifest.total_pages, manifest.content_pages
    );
    Ok(manifest)
}
