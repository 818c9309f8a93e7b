//! Clean: reset a manual to the unsplit state.

use crate::config::ManualConfig;
use crate::error::StageError;
use crate::pipeline::files::clean_dir_contents;
use std::path::Path;
use tracing::{debug, info};

/// Entries removed from one pipeline-owned directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedDir {
    pub label: &'static str,
    pub removed: usize,
}

/// Empty every pipeline-owned directory of the manual and recreate it.
///
/// `manual-pdf/<slug>/` is never touched; a layout where an owned directory
/// overlaps it is refused before anything is deleted.
pub fn clean(config: &ManualConfig) -> Result<Vec<CleanedDir>, StageError> {
    let source = &config.paths.source_dir;
    let owned = config.paths.owned_dirs();

    for (_, dir) in &owned {
        if overlaps(dir, source) {
            return Err(StageError::UnsafeClean {
                path: dir.to_path_buf(),
            });
        }
    }

    remove_split_leftovers(&config.paths.split_pdf)?;

    let mut cleaned = Vec::with_capacity(owned.len());
    for (label, dir) in owned {
        let removed = clean_dir_contents(dir)?;
        debug!("{}: removed {} entr(ies) from {}", label, removed, dir.display());
        cleaned.push(CleanedDir { label, removed });
    }

    info!(
        "Cleaned '{}': {} entries removed",
        config.slug,
        cleaned.iter().map(|c| c.removed).sum::<usize>()
    );
    Ok(cleaned)
}

fn overlaps(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Staging and backup directories an interrupted split may leave next to
/// `split-pdf/`.
fn remove_split_leftovers(split_dir: &Path) -> Result<(), StageError> {
    let Some(parent) = split_dir.parent() else {
        return Ok(());
    };
    if !parent.is_dir() {
        return Ok(());
    }
    let backup = split_dir.with_extension("previous");
    for entry in std::fs::read_dir(parent).map_err(|e| StageError::io(parent, e))? {
        let path = entry.map_err(|e| StageError::io(parent, e))?.path();
        let is_staging = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(".split-staging-"));
        if (is_staging || path == backup) && path.is_dir() {
            std::fs::remove_dir_all(&path).map_err(|e| StageError::io(&path, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ManualPaths, Settings};
    use tempfile::TempDir;

    #[test]
    fn empties_owned_dirs_and_spares_source() {
        let root = TempDir::new().unwrap();
        let config = ManualConfig::new(
            root.path(),
            "oxi-coral",
            root.path().join("manual-pdf/oxi-coral/Coral.pdf"),
            Settings::default(),
        )
        .unwrap();
        std::fs::create_dir_all(&config.paths.source_dir).unwrap();
        std::fs::write(&config.source_pdf, b"%PDF").unwrap();
        for (_, dir) in config.paths.owned_dirs() {
            std::fs::create_dir_all(dir).unwrap();
            std::fs::write(dir.join("page-001.x"), b"x").unwrap();
        }
        let staging = config.paths.split_pdf.parent().unwrap().join(".split-staging-abc");
        std::fs::create_dir_all(&staging).unwrap();

        let cleaned = clean(&config).unwrap();
        assert_eq!(cleaned.len(), 6);
        assert!(cleaned.iter().all(|c| c.removed == 1));
        for (_, dir) in config.paths.owned_dirs() {
            assert!(dir.is_dir());
            assert_eq!(std::fs::read_dir(dir).unwrap().count(), 0);
        }
        assert!(!staging.exists());
        assert!(config.source_pdf.exists());
    }

    #[test]
    fn other_manuals_untouched() {
        let root = TempDir::new().unwrap();
        let a = ManualConfig::new(root.path(), "oxi-coral", root.path().join("a.pdf"), Settings::default())
            .unwrap();
        let b = ManualPaths::for_slug(root.path(), "oxi-one-mk2");
        std::fs::create_dir_all(&b.images).unwrap();
        std::fs::write(b.images.join("page-001.png"), b"x").unwrap();

        clean(&a).unwrap();
        assert!(b.images.join("page-001.png").exists());
    }

    #[test]
    fn overlap_detection() {
        assert!(overlaps(Path::new("/p/manual-pdf/a"), Path::new("/p/manual-pdf/a")));
        assert!(overlaps(Path::new("/p/manual-pdf"), Path::new("/p/manual-pdf/a")));
        assert!(!overlaps(Path::new("/p/public/a/pages"), Path::new("/p/manual-pdf/a")));
    }
}
