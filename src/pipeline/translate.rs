//! Translator: extracted page text → one translation record per page.
//!
//! ## Concurrency
//!
//! Pages are processed in fixed-size batches (`batchSize`). Batches run one
//! after another; the pages inside a batch are translated concurrently with
//! `futures::future::join_all`. Every page writes only its own files, so no
//! locking is needed.
//!
//! ## Failure isolation
//!
//! A page that still fails after every retry leaves no record behind. It is
//! reported to `__inbox/<slug>/translation-error-page-NNN.json`, counted as
//! failed, and its siblings carry on. The next run picks it up again because
//! only pages with a readable record for the same page are skipped.

use crate::config::{ManualConfig, PageArtifact};
use crate::error::{PageError, StageError};
use crate::output::{ErrorReport, TranslateSummary, TranslationMetadata, TranslationRecord, EMPTY_SOURCE_METHOD};
use crate::pipeline::files::{ensure_dir, prune_stale, scan_pages, write_json_atomic, PageFile};
use crate::pipeline::llm::{translate_with_retry, TranslationBackend};
use crate::progress::{ProgressCallback, Stage};
use crate::prompts::translation_system_prompt;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

enum PageOutcome {
    Translated,
    Skipped,
    Failed(PageError),
}

/// Translate every extracted page that has no record yet.
///
/// Fails only on structural problems (missing or drifting input). Per-page
/// failures are returned in the summary.
pub async fn translate(
    config: &ManualConfig,
    backend: &dyn TranslationBackend,
    progress: &ProgressCallback,
) -> Result<TranslateSummary, StageError> {
    let pages = scan_pages(&config.paths.extracted, "txt", "manual-pipeline extract")?;
    let total = pages.len();
    ensure_dir(&config.paths.translations_draft)?;
    prune_stale(&config.paths.translations_draft, "json", total as u32)?;

    let settings = &config.settings;
    let system_prompt = translation_system_prompt(
        &settings.source_language,
        &settings.target_language,
        &settings.preserve_terms,
    );

    info!(
        "Translating {} pages ({} → {}) with {} in batches of {}",
        total,
        settings.source_language,
        settings.target_language,
        backend.model(),
        settings.batch_size
    );
    progress.on_stage_start(Stage::Translate, total);

    let mut summary = TranslateSummary::default();
    for (batch_idx, batch) in pages.chunks(settings.batch_size.max(1)).enumerate() {
        debug!("Batch {}: {} page(s)", batch_idx + 1, batch.len());
        let outcomes = join_all(
            batch
                .iter()
                .map(|page| translate_page(config, backend, &system_prompt, page, total, progress)),
        )
        .await;

        for outcome in outcomes {
            match outcome {
                PageOutcome::Translated => summary.success += 1,
                PageOutcome::Skipped => summary.skipped += 1,
                PageOutcome::Failed(e) => {
                    summary.failed += 1;
                    summary.failures.push(e);
                }
            }
        }
    }

    progress.on_stage_complete(Stage::Translate, summary.success + summary.skipped);
    if summary.failed > 0 {
        warn!(
            "Translation finished with failures: {} success, {} skipped, {} failed",
            summary.success, summary.skipped, summary.failed
        );
    } else {
        info!(
            "Translation finished: {} success, {} skipped",
            summary.success, summary.skipped
        );
    }
    Ok(summary)
}

async fn translate_page(
    config: &ManualConfig,
    backend: &dyn TranslationBackend,
    system_prompt: &str,
    page: &PageFile,
    total: usize,
    progress: &ProgressCallback,
) -> PageOutcome {
    let page_num = page.page_num;
    let artifact = config.artifact(page_num);

    if has_valid_record(&artifact).await {
        debug!("Page {}: record exists, skipping", page_num);
        progress.on_page_skipped(Stage::Translate, page_num, total);
        return PageOutcome::Skipped;
    }

    match produce_record(config, backend, system_prompt, page).await {
        Ok(()) => {
            remove_stale_report(&artifact).await;
            progress.on_page_complete(Stage::Translate, page_num, total);
            PageOutcome::Translated
        }
        Err(e) => {
            write_error_report(&artifact, &e).await;
            progress.on_page_error(Stage::Translate, page_num, total, &e.to_string());
            PageOutcome::Failed(e)
        }
    }
}

async fn produce_record(
    config: &ManualConfig,
    backend: &dyn TranslationBackend,
    system_prompt: &str,
    page: &PageFile,
) -> Result<(), PageError> {
    let page_num = page.page_num;
    let io_err = |path: &Path, e: std::io::Error| PageError::Io {
        page: page_num,
        detail: format!("{}: {e}", path.display()),
    };

    let text = tokio::fs::read_to_string(&page.path)
        .await
        .map_err(|e| io_err(&page.path, e))?;

    let record = if text.trim().is_empty() {
        debug!("Page {}: no source text, recording empty translation", page_num);
        TranslationRecord {
            page_num,
            translation: String::new(),
            metadata: TranslationMetadata {
                translated_at: Utc::now(),
                method: EMPTY_SOURCE_METHOD.to_string(),
                model: backend.model().to_string(),
                attempts: 0,
            },
        }
    } else {
        let translation =
            translate_with_retry(backend, page_num, system_prompt, text.trim(), &config.settings)
                .await?;
        TranslationRecord {
            page_num,
            translation: translation.text,
            metadata: TranslationMetadata {
                translated_at: Utc::now(),
                method: backend.method(),
                model: backend.model().to_string(),
                attempts: translation.attempts,
            },
        }
    };

    write_json_blocking(config.artifact(page_num).record, record)
        .await
        .map_err(|e| PageError::Io {
            page: page_num,
            detail: e.to_string(),
        })
}

/// A record counts only when it parses and declares this page.
async fn has_valid_record(artifact: &PageArtifact) -> bool {
    let raw = match tokio::fs::read(&artifact.record).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return false,
        Err(e) => {
            warn!("Page {}: cannot read {}: {}", artifact.page_num, artifact.record.display(), e);
            return false;
        }
    };
    match serde_json::from_slice::<TranslationRecord>(&raw) {
        Ok(record) if record.page_num == artifact.page_num => true,
        Ok(record) => {
            warn!(
                "Page {}: {} declares page {}; translating again",
                artifact.page_num,
                artifact.record.display(),
                record.page_num
            );
            false
        }
        Err(e) => {
            warn!(
                "Page {}: unreadable record {} ({}); translating again",
                artifact.page_num,
                artifact.record.display(),
                e
            );
            false
        }
    }
}

/// [`write_json_atomic`] on the blocking pool.
async fn write_json_blocking<T>(path: PathBuf, value: T) -> Result<(), StageError>
where
    T: Serialize + Send + 'static,
{
    tokio::task::spawn_blocking(move || write_json_atomic(&path, &value))
        .await
        .map_err(|e| StageError::Internal(format!("write task panicked: {e}")))?
}

async fn write_error_report(artifact: &PageArtifact, err: &PageError) {
    let report = ErrorReport {
        page: artifact.page_num,
        error: err.to_string(),
        failure: err.clone(),
        timestamp: Utc::now(),
    };
    let result = write_json_blocking(artifact.error_report.clone(), report).await;

    match result {
        Ok(()) => debug!("Page {}: error report written", artifact.page_num),
        Err(e) => error!(
            "Page {}: could not write error report {}: {}",
            artifact.page_num,
            artifact.error_report.display(),
            e
        ),
    }
}

async fn remove_stale_report(artifact: &PageArtifact) {
    match tokio::fs::remove_file(&artifact.error_report).await {
        Ok(()) => debug!("Page {}: removed stale error report", artifact.page_num),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "Page {}: could not remove {}: {}",
            artifact.page_num,
            artifact.error_report.display(),
            e
        ),
    }
}
