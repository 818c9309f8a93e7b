//! Splitter: source PDF → one single-page PDF per page.
//!
//! All-or-nothing. Pages are written into a staging directory next to
//! `split-pdf/` and the staging directory replaces the old output only after
//! every page was saved, so an interrupted run leaves the previous split
//! intact and a shorter source never leaves stale pages behind.

use crate::config::ManualConfig;
use crate::error::StageError;
use crate::pdfium;
use crate::pipeline::files::{ensure_dir, page_file_name};
use crate::progress::{ProgressCallback, Stage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Split the manual's source PDF into `split-pdf/page-NNN.pdf`.
///
/// Returns the page count. Fails with [`StageError::CorruptPdf`] when the
/// source cannot be parsed.
pub async fn split(config: &ManualConfig, progress: &ProgressCallback) -> Result<u32, StageError> {
    let source = config.source_pdf.clone();
    let out_dir = config.paths.split_pdf.clone();
    let progress = progress.clone();

    tokio::task::spawn_blocking(move || split_blocking(&source, &out_dir, &progress))
        .await
        .map_err(|e| StageError::Internal(format!("Split task panicked: {e}")))?
}

fn split_blocking(
    source: &Path,
    out_dir: &Path,
    progress: &ProgressCallback,
) -> Result<u32, StageError> {
    let pdfium = pdfium::bind()?;
    let document = pdfium
        .load_pdf_from_file(source, None)
        .map_err(|e| StageError::CorruptPdf {
            path: source.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let total = document.pages().len() as u32;
    if total == 0 {
        return Err(StageError::CorruptPdf {
            path: source.to_path_buf(),
            detail: "document has no pages".into(),
        });
    }
    info!("Splitting {} ({} pages)", source.display(), total);
    progress.on_stage_start(Stage::Split, total as usize);

    let parent = out_dir
        .parent()
        .ok_or_else(|| StageError::Internal(format!("'{}' has no parent", out_dir.display())))?;
    ensure_dir(parent)?;
    let staging = tempfile::Builder::new()
        .prefix(".split-staging-")
        .tempdir_in(parent)
        .map_err(|e| StageError::io(parent, e))?;

    for index in 0..total {
        let page_num = index + 1;
        let split_err = |e: pdfium_render::prelude::PdfiumError| StageError::SplitFailed {
            page: page_num,
            detail: format!("{e:?}"),
        };

        let mut single = pdfium.create_new_pdf().map_err(split_err)?;
        single
            .pages_mut()
            .copy_page_from_document(&document, index as u16, 0)
            .map_err(split_err)?;

        let target = staging.path().join(page_file_name(page_num, "pdf"));
        single.save_to_file(&target).map_err(split_err)?;
        debug!("Split page {} → {}", page_num, target.display());
        progress.on_page_complete(Stage::Split, page_num, total as usize);
    }

    swap_into_place(staging.keep(), out_dir)?;
    progress.on_stage_complete(Stage::Split, total as usize);
    info!("Split {} pages into {}", total, out_dir.display());
    Ok(total)
}

/// Replace `target` with `staged`. The old directory is moved aside first
/// and removed only once the new one is in place.
fn swap_into_place(staged: PathBuf, target: &Path) -> Result<(), StageError> {
    let backup = target.with_extension("previous");
    if backup.exists() {
        std::fs::remove_dir_all(&backup).map_err(|e| StageError::io(&backup, e))?;
    }
    if target.exists() {
        std::fs::rename(target, &backup).map_err(|e| StageError::io(target, e))?;
    }
    if let Err(e) = std::fs::rename(&staged, target) {
        if backup.exists() {
            let _ = std::fs::rename(&backup, target);
        }
        let _ = std::fs::remove_dir_all(&staged);
        return Err(StageError::io(target, e));
    }
    if backup.exists() {
        std::fs::remove_dir_all(&backup).map_err(|e| StageError::io(&backup, e))?;
    }
    Ok(())
}
