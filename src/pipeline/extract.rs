//! Text extractor: single-page PDFs → `extracted/page-NNN.txt`.

use crate::config::ManualConfig;
use crate::error::StageError;
use crate::pdfium;
use crate::pipeline::files::{ensure_dir, page_file_name, prune_stale, scan_pages, write_atomic};
use crate::progress::{ProgressCallback, Stage};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Extract the raw text of every split page, trimmed but otherwise verbatim.
///
/// Returns the number of text files written. Any failure is fatal.
pub async fn extract_text(
    config: &ManualConfig,
    progress: &ProgressCallback,
) -> Result<u32, StageError> {
    let split_dir = config.paths.split_pdf.clone();
    let out_dir = config.paths.extracted.clone();
    let progress = progress.clone();

    tokio::task::spawn_blocking(move || extract_blocking(&split_dir, &out_dir, &progress))
        .await
        .map_err(|e| StageError::Internal(format!("Extract task panicked: {e}")))?
}

fn extract_blocking(
    split_dir: &Path,
    out_dir: &Path,
    progress: &ProgressCallback,
) -> Result<u32, StageError> {
    let pages = scan_pages(split_dir, "pdf", "manual-pipeline split")?;
    let total = pages.len();
    ensure_dir(out_dir)?;

    let pdfium = pdfium::bind()?;
    info!("Extracting text from {} pages", total);
    progress.on_stage_start(Stage::Extract, total);

    let mut empty = 0usize;
    for page in &pages {
        let text = page_text(&pdfium, &page.path, page.page_num)?;
        if text.is_empty() {
            empty += 1;
        }
        let target = out_dir.join(page_file_name(page.page_num, "txt"));
        write_atomic(&target, text.as_bytes())?;
        debug!("Page {}: {} chars", page.page_num, text.chars().count());
        progress.on_page_complete(Stage::Extract, page.page_num, total);
    }

    if empty > 0 {
        info!("{} of {} pages have no extractable text", empty, total);
    }
    prune_stale(out_dir, "txt", total as u32)?;
    progress.on_stage_complete(Stage::Extract, total);
    Ok(total as u32)
}

fn page_text(pdfium: &Pdfium, path: &Path, page_num: u32) -> Result<String, StageError> {
    let extract_err = |e: PdfiumError| StageError::ExtractFailed {
        page: page_num,
        detail: format!("{e:?}"),
    };

    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| StageError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;
    let pages = document.pages();
    if pages.len() > 1 {
        warn!(
            "{} has {} pages; extracting only the first",
            path.display(),
            pages.len()
        );
    }
    let page = pages.get(0).map_err(extract_err)?;
    let text = page.text().map_err(extract_err)?.all();
    Ok(text.trim().to_string())
}
