//! Page file naming, directory scans and atomic writes.
//!
//! Page numbers travel through the pipeline as explicit `page_num` values.
//! File names are only parsed here, when a stage scans the output of the
//! previous one, and every scan checks the numbers form exactly `1..=N`.

use crate::error::StageError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

static RE_PAGE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^page-(\d{3,})\.([A-Za-z0-9]+)$").unwrap());

/// `page-NNN.<ext>`, zero-padded to at least three digits.
pub fn page_file_name(page_num: u32, ext: &str) -> String {
    format!("page-{page_num:03}.{ext}")
}

/// Decode a page file name with the given extension.
///
/// Returns `None` unless the name round-trips through [`page_file_name`], so
/// `page-0001.pdf` and `page-000.pdf` are both rejected.
pub fn parse_page_file_name(name: &str, ext: &str) -> Option<u32> {
    let caps = RE_PAGE_FILE.captures(name)?;
    if &caps[2] != ext {
        return None;
    }
    let page_num: u32 = caps[1].parse().ok()?;
    (page_num >= 1 && page_file_name(page_num, ext) == name).then_some(page_num)
}

/// A page file found by [`scan_pages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFile {
    pub page_num: u32,
    pub path: PathBuf,
}

/// List the `page-NNN.<ext>` files in `dir`, sorted by page number.
///
/// Fails when the directory is missing or empty (`hint` names the command
/// that produces it) and when the page numbers are not exactly `1..=N`.
/// Other files in the directory are ignored.
pub fn scan_pages(dir: &Path, ext: &str, hint: &'static str) -> Result<Vec<PageFile>, StageError> {
    if !dir.is_dir() {
        return Err(StageError::MissingInput {
            dir: dir.to_path_buf(),
            hint,
        });
    }
    let pages = list_pages(dir, ext)?;
    if pages.is_empty() {
        return Err(StageError::EmptyInput {
            dir: dir.to_path_buf(),
            hint,
        });
    }
    check_contiguous(dir, &pages)?;
    debug!("Scanned {} page file(s) in {}", pages.len(), dir.display());
    Ok(pages)
}

/// Like [`scan_pages`] but a missing or empty directory yields no pages.
pub fn scan_pages_optional(dir: &Path, ext: &str) -> Result<Vec<PageFile>, StageError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let pages = list_pages(dir, ext)?;
    check_contiguous(dir, &pages)?;
    Ok(pages)
}

/// Count page files without validating their numbering.
pub fn count_pages(dir: &Path, ext: &str) -> usize {
    list_pages(dir, ext).map(|p| p.len()).unwrap_or(0)
}

/// List page files sorted by number, without requiring `1..=N`.
pub fn list_pages(dir: &Path, ext: &str) -> Result<Vec<PageFile>, StageError> {
    let entries = std::fs::read_dir(dir).map_err(|e| StageError::io(dir, e))?;
    let mut pages = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StageError::io(dir, e))?;
        let name = entry.file_name();
        let Some(page_num) = name.to_str().and_then(|n| parse_page_file_name(n, ext)) else {
            continue;
        };
        pages.push(PageFile {
            page_num,
            path: entry.path(),
        });
    }
    pages.sort_by_key(|p| p.page_num);
    Ok(pages)
}

fn check_contiguous(dir: &Path, pages: &[PageFile]) -> Result<(), StageError> {
    for (i, page) in pages.iter().enumerate() {
        let expected = i as u32 + 1;
        if page.page_num != expected {
            return Err(StageError::PageDrift {
                dir: dir.to_path_buf(),
                expected,
                found: page.page_num,
            });
        }
    }
    Ok(())
}

/// Create `dir` and its parents.
pub fn ensure_dir(dir: &Path) -> Result<(), StageError> {
    std::fs::create_dir_all(dir).map_err(|e| StageError::io(dir, e))
}

/// Write `bytes` to `path` through a temp file in the same directory, then
/// rename over the target. Readers never observe a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StageError> {
    let parent = path
        .parent()
        .ok_or_else(|| StageError::Internal(format!("'{}' has no parent", path.display())))?;
    ensure_dir(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| StageError::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| StageError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StageError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| StageError::io(path, e.error))?;
    Ok(())
}

/// Pretty-print `value` as JSON and write it atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StageError> {
    let mut json = serde_json::to_vec_pretty(value)
        .map_err(|e| StageError::Internal(format!("serialising {}: {e}", path.display())))?;
    json.push(b'\n');
    write_atomic(path, &json)
}

/// Read and deserialise a JSON file.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StageError> {
    let raw = std::fs::read(path).map_err(|e| StageError::io(path, e))?;
    serde_json::from_slice(&raw).map_err(|source| StageError::InvalidJson {
        path: path.to_path_buf(),
        source,
    })
}

/// Delete every entry inside `dir`, keeping `dir` itself. Creates `dir` when
/// it does not exist. Returns the number of entries removed.
pub fn clean_dir_contents(dir: &Path) -> Result<usize, StageError> {
    if !dir.exists() {
        ensure_dir(dir)?;
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(dir).map_err(|e| StageError::io(dir, e))? {
        let path = entry.map_err(|e| StageError::io(dir, e))?.path();
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        result.map_err(|e| StageError::io(&path, e))?;
        removed += 1;
    }
    Ok(removed)
}

/// Remove page files numbered above `page_count`, left over from a previous
/// run on a longer source. Returns how many were removed.
pub fn prune_stale(dir: &Path, ext: &str, page_count: u32) -> Result<usize, StageError> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for page in list_pages(dir, ext)? {
        if page.page_num > page_count {
            std::fs::remove_file(&page.path).map_err(|e| StageError::io(&page.path, e))?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("Pruned {} stale page file(s) from {}", removed, dir.display());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn file_names_round_trip() {
        assert_eq!(page_file_name(1, "pdf"), "page-001.pdf");
        assert_eq!(page_file_name(42, "png"), "page-042.png");
        assert_eq!(page_file_name(1234, "txt"), "page-1234.txt");
        for n in [1, 9, 10, 99, 100, 999, 1000] {
            assert_eq!(parse_page_file_name(&page_file_name(n, "json"), "json"), Some(n));
        }
    }

    #[test]
    fn non_canonical_names_rejected() {
        assert_eq!(parse_page_file_name("page-0001.pdf", "pdf"), None);
        assert_eq!(parse_page_file_name("page-000.pdf", "pdf"), None);
        assert_eq!(parse_page_file_name("page-01.pdf", "pdf"), None);
        assert_eq!(parse_page_file_name("page-001.png", "pdf"), None);
        assert_eq!(parse_page_file_name("part-001.pdf", "pdf"), None);
        assert_eq!(parse_page_file_name("page-001.pdf.tmp", "pdf"), None);
    }

    #[test]
    fn scan_sorted_and_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        for n in [3, 1, 2] {
            touch(dir.path(), &page_file_name(n, "txt"));
        }
        touch(dir.path(), "notes.md");
        touch(dir.path(), "page-001.json");

        let pages = scan_pages(dir.path(), "txt", "extract").unwrap();
        let nums: Vec<u32> = pages.iter().map(|p| p.page_num).collect();
        assert_eq!(nums, vec![1, 2, 3]);
    }

    #[test]
    fn scan_detects_gap() {
        let dir = TempDir::new().unwrap();
        for n in [1, 2, 4] {
            touch(dir.path(), &page_file_name(n, "pdf"));
        }
        match scan_pages(dir.path(), "pdf", "split") {
            Err(StageError::PageDrift { expected, found, .. }) => {
                assert_eq!((expected, found), (3, 4));
            }
            other => panic!("expected drift, got {other:?}"),
        }
    }

    #[test]
    fn scan_missing_and_empty() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            scan_pages(&dir.path().join("nope"), "pdf", "split"),
            Err(StageError::MissingInput { hint: "split", .. })
        ));
        assert!(matches!(
            scan_pages(dir.path(), "pdf", "split"),
            Err(StageError::EmptyInput { .. })
        ));
        assert!(scan_pages_optional(&dir.path().join("nope"), "pdf")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/page-001.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn clean_keeps_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("images");
        std::fs::create_dir_all(target.join("nested")).unwrap();
        touch(&target, "page-001.png");
        assert_eq!(clean_dir_contents(&target).unwrap(), 2);
        assert!(target.is_dir());
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 0);

        let fresh = dir.path().join("fresh");
        assert_eq!(clean_dir_contents(&fresh).unwrap(), 0);
        assert!(fresh.is_dir());
    }

    #[test]
    fn prune_removes_only_pages_above_count() {
        let dir = TempDir::new().unwrap();
        for n in 1..=5 {
            touch(dir.path(), &page_file_name(n, "png"));
        }
        assert_eq!(prune_stale(dir.path(), "png", 3).unwrap(), 2);
        assert_eq!(count_pages(dir.path(), "png"), 3);
    }
}
