//! Binding to the pdfium shared library.
//!
//! Lookup order: `PDFIUM_LIB_PATH` (the library file or its directory), the
//! working directory, then the system library path.

use crate::error::StageError;
use pdfium_render::prelude::{Pdfium, PdfiumError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the pdfium library or its directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind pdfium, or fail with setup hints.
pub fn bind() -> Result<Pdfium, StageError> {
    if let Some(value) = std::env::var_os(PDFIUM_LIB_PATH_ENV) {
        let path = PathBuf::from(value);
        match try_bind_from_path(&path) {
            Some(result) => {
                return result.map_err(|e| {
                    StageError::PdfiumBindingFailed(format!("{}: {e:?}", path.display()))
                })
            }
            None => debug!(
                "{} points at '{}', which does not exist",
                PDFIUM_LIB_PATH_ENV,
                path.display()
            ),
        }
    }

    match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")) {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(local_err) => match Pdfium::bind_to_system_library() {
            Ok(bindings) => Ok(Pdfium::new(bindings)),
            Err(_) => Err(StageError::PdfiumBindingFailed(format!("{local_err:?}"))),
        },
    }
}

fn try_bind_from_path(path: &Path) -> Option<Result<Pdfium, PdfiumError>> {
    if path.is_dir() {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(path);
        Some(Pdfium::bind_to_library(lib_path).map(Pdfium::new))
    } else if path.exists() {
        Some(Pdfium::bind_to_library(path).map(Pdfium::new))
    } else {
        None
    }
}
