//! Whole-pipeline entry point.

use crate::config::ManualConfig;
use crate::error::StageError;
use crate::output::{DatasetSummary, ManualManifest, TranslateSummary};
use crate::pipeline::{dataset, extract, llm::TranslationBackend, manifest, render, split, translate};
use crate::progress::ProgressCallback;
use std::time::Instant;
use tracing::{info, warn};

/// What one [`run_all`] produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub pages: u32,
    pub translation: TranslateSummary,
    pub datasets: DatasetSummary,
    pub manifest: ManualManifest,
}

/// Run split, render, extract, translate, build and manifest in order.
///
/// Stops at the first fatal error. A translation run with failed pages stops
/// before the datasets are built, with [`StageError::TranslationIncomplete`];
/// re-running retries only the failed pages.
pub async fn run_all(
    config: &ManualConfig,
    backend: &dyn TranslationBackend,
    progress: &ProgressCallback,
) -> Result<RunReport, StageError> {
    let start = Instant::now();
    info!("Processing manual '{}' from {}", config.slug, config.source_pdf.display());

    // ── Step 1: Split ────────────────────────────────────────────────────
    let pages = split::split(config, progress).await?;

    // ── Step 2: Render + extract ─────────────────────────────────────────
    let rendered = render::render(config, progress).await?;
    let extracted = extract::extract_text(config, progress).await?;
    if rendered != pages || extracted != pages {
        return Err(StageError::Internal(format!(
            "page count mismatch: split {pages}, rendered {rendered}, extracted {extracted}"
        )));
    }

    // ── Step 3: Translate ────────────────────────────────────────────────
    let translation = translate::translate(config, backend, progress).await?;
    if translation.failed > 0 {
        warn!(
            "{} page(s) failed; not building datasets for '{}'",
            translation.failed, config.slug
        );
        return Err(StageError::TranslationIncomplete {
            failed: translation.failed,
        });
    }

    // ── Step 4: Datasets + manifest ──────────────────────────────────────
    let datasets = dataset::build_datasets(config, progress)?;
    let manifest = manifest::build_manifest(config, progress)?;

    info!(
        "Finished '{}': {} pages in {:.1}s",
        config.slug,
        pages,
        start.elapsed().as_secs_f64()
    );
    Ok(RunReport {
        pages,
        translation,
        datasets,
        manifest,
    })
}
