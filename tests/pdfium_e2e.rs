//! End-to-end tests for the pdfium stages: split, render, extract.
//!
//! They need a pdfium shared library and are gated behind the `PDFIUM_E2E`
//! environment variable so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   PDFIUM_E2E=1 PDFIUM_LIB_PATH=/path/to/lib cargo test --test pdfium_e2e -- --nocapture

use manual_pipeline::pipeline::files::page_file_name;
use manual_pipeline::pipeline::{extract, render, split};
use manual_pipeline::{pdfium, progress, ImageFormat, ManualConfig, Settings, StageError};
use pdfium_render::prelude::*;
use std::path::Path;
use tempfile::TempDir;

macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("PDFIUM_E2E").is_err() {
            println!("SKIP: set PDFIUM_E2E=1 to run pdfium e2e tests");
            return;
        }
    };
}

/// Write an A4 PDF whose page `n` reads "Manual page n".
fn make_pdf(path: &Path, pages: u32) {
    let pdfium = pdfium::bind().expect("pdfium library");
    let mut document = pdfium.create_new_pdf().unwrap();
    let font = document.fonts_mut().helvetica();
    for n in 1..=pages {
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .unwrap();
        page.objects_mut()
            .create_text_object(
                PdfPoints::new(72.0),
                PdfPoints::new(720.0),
                format!("Manual page {n}"),
                font,
                PdfPoints::new(18.0),
            )
            .unwrap();
    }
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    document.save_to_file(path).unwrap();
}

fn config(root: &Path, pages: u32) -> ManualConfig {
    let source = root.join("manual-pdf/oxi-coral/manual.pdf");
    make_pdf(&source, pages);
    let settings = Settings {
        image_dpi: 72,
        image_format: ImageFormat::Png,
        ..Settings::default()
    };
    ManualConfig::new(root, "oxi-coral", source, settings).unwrap()
}

#[tokio::test]
async fn split_render_extract() {
    e2e_skip_unless_enabled!();
    let root = TempDir::new().unwrap();
    let config = config(root.path(), 3);
    let cb = progress::noop();

    assert_eq!(split::split(&config, &cb).await.unwrap(), 3);
    assert_eq!(render::render(&config, &cb).await.unwrap(), 3);
    assert_eq!(extract::extract_text(&config, &cb).await.unwrap(), 3);

    for n in 1..=3 {
        let a = config.artifact(n);
        assert!(a.split_pdf.is_file(), "missing {}", a.split_pdf.display());

        // 72 DPI renders at 1 pixel per point: A4 is 595 × 842 pt.
        let (w, h) = image::image_dimensions(&a.image).unwrap();
        assert!((594..=596).contains(&w), "width {w}");
        assert!((841..=843).contains(&h), "height {h}");

        let text = std::fs::read_to_string(&a.text).unwrap();
        assert_eq!(text, format!("Manual page {n}"));
    }
}

#[tokio::test]
async fn resplit_of_shorter_source_leaves_no_stale_pages() {
    e2e_skip_unless_enabled!();
    let root = TempDir::new().unwrap();
    let config = config(root.path(), 4);
    let cb = progress::noop();
    split::split(&config, &cb).await.unwrap();
    render::render(&config, &cb).await.unwrap();

    make_pdf(&config.source_pdf, 2);
    assert_eq!(split::split(&config, &cb).await.unwrap(), 2);
    assert!(!config.paths.split_pdf.join(page_file_name(3, "pdf")).exists());

    assert_eq!(render::render(&config, &cb).await.unwrap(), 2);
    assert!(!config.artifact(3).image.exists());
}

#[tokio::test]
async fn corrupt_source_is_rejected() {
    e2e_skip_unless_enabled!();
    let root = TempDir::new().unwrap();
    let source = root.path().join("manual-pdf/oxi-coral/broken.pdf");
    std::fs::create_dir_all(source.parent().unwrap()).unwrap();
    std::fs::write(&source, b"not a pdf").unwrap();
    let config = ManualConfig::new(root.path(), "oxi-coral", source, Settings::default()).unwrap();

    let err = split::split(&config, &progress::noop()).await.unwrap_err();
    assert!(matches!(err, StageError::CorruptPdf { .. }), "{err}");
    assert!(!config.paths.split_pdf.exists());
}
