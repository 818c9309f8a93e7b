//! Page renderer: single-page PDFs → page images at the configured DPI.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is not safe to call from async contexts. The whole page loop
//! runs on a blocking-pool thread.

use crate::config::{ImageFormat, ManualConfig};
use crate::error::StageError;
use crate::pdfium;
use crate::pipeline::files::{ensure_dir, page_file_name, prune_stale, scan_pages, write_atomic, PageFile};
use crate::progress::{ProgressCallback, Stage};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Rasterise every `split-pdf/page-NNN.pdf` to `pages/page-NNN.<ext>`.
///
/// Returns the number of images written. Any page failure is fatal.
pub async fn render(config: &ManualConfig, progress: &ProgressCallback) -> Result<u32, StageError> {
    let split_dir = config.paths.split_pdf.clone();
    let images_dir = config.paths.images.clone();
    let scale = config.settings.render_scale();
    let format = config.settings.image_format;
    let progress = progress.clone();

    tokio::task::spawn_blocking(move || {
        render_blocking(&split_dir, &images_dir, scale, format, &progress)
    })
    .await
    .map_err(|e| StageError::Internal(format!("Render task panicked: {e}")))?
}

fn render_blocking(
    split_dir: &Path,
    images_dir: &Path,
    scale: f32,
    format: ImageFormat,
    progress: &ProgressCallback,
) -> Result<u32, StageError> {
    let pages = scan_pages(split_dir, "pdf", "manual-pipeline split")?;
    let total = pages.len();
    ensure_dir(images_dir)?;

    let pdfium = pdfium::bind()?;
    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);

    info!("Rendering {} pages at scale {:.2}", total, scale);
    progress.on_stage_start(Stage::Render, total);

    for PageFile { page_num, path } in &pages {
        let page_num = *page_num;
        let image = render_page(&pdfium, path, page_num, &render_config)?;
        let target: PathBuf = images_dir.join(page_file_name(page_num, format.extension()));
        let bytes = encode_image(image, format).map_err(|detail| StageError::RenderFailed {
            page: page_num,
            detail,
        })?;
        write_atomic(&target, &bytes)?;
        debug!("Rendered page {} → {}", page_num, target.display());
        progress.on_page_complete(Stage::Render, page_num, total);
    }

    prune_stale(images_dir, format.extension(), total as u32)?;
    progress.on_stage_complete(Stage::Render, total);
    Ok(total as u32)
}

fn render_page(
    pdfium: &Pdfium,
    path: &Path,
    page_num: u32,
    render_config: &PdfRenderConfig,
) -> Result<DynamicImage, StageError> {
    let render_err = |detail: String| StageError::RenderFailed {
        page: page_num,
        detail,
    };

    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| StageError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;
    let pages = document.pages();
    match pages.len() {
        0 => return Err(render_err("page PDF has no pages".into())),
        1 => {}
        n => warn!(
            "{} has {} pages; rendering only the first",
            path.display(),
            n
        ),
    }

    let page = pages.get(0).map_err(|e| render_err(format!("{e:?}")))?;
    let bitmap = page
        .render_with_config(render_config)
        .map_err(|e| render_err(format!("{e:?}")))?;
    Ok(bitmap.as_image())
}

/// Encode a rendered page. JPEG has no alpha channel, so the image is
/// flattened to RGB first.
fn encode_image(image: DynamicImage, format: ImageFormat) -> Result<Vec<u8>, String> {
    let image = match format {
        ImageFormat::Png => image,
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
    };
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), format.as_image_format())
        .map_err(|e| e.to_string())?;
    Ok(buf)
}
