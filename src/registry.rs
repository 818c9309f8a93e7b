//! Read-only registry of every published manual.
//!
//! [`ManualRegistry::open`] only lists the manuals under `public/`. Each
//! manual's manifest and dataset are loaded and checked against each other
//! the first time the manual is looked up, then cached for the life of the
//! registry. There is no invalidation: the registry describes one site
//! build.
//!
//! ```rust,no_run
//! use manual_pipeline::ManualRegistry;
//!
//! # fn main() -> Result<(), manual_pipeline::RegistryError> {
//! let registry = ManualRegistry::open("public", "ja")?;
//! registry.verify_all()?;
//! for slug in registry.slugs() {
//!     let total = registry.manifest(slug)?.total_pages;
//!     assert!(registry.page(slug, total as u32)?.is_some());
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::validate_slug;
use crate::error::{ConsistencyError, RegistryError};
use crate::output::{ManualManifest, PageEntry, PagesDataset};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// One manual's manifest and pages, validated against each other.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub manifest: ManualManifest,
    pub pages: Vec<PageEntry>,
}

/// Whether the viewer may move from `page` to its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    pub can_go_to_prev: bool,
    pub can_go_to_next: bool,
}

pub fn navigation(page: u32, total: usize) -> Navigation {
    Navigation {
        can_go_to_prev: page > 1,
        can_go_to_next: (page as usize) < total,
    }
}

pub struct ManualRegistry {
    public_root: PathBuf,
    language: String,
    entries: BTreeMap<String, OnceCell<RegistryEntry>>,
}

impl ManualRegistry {
    /// List the manuals under `public_root` that have a `data/manifest.json`.
    /// Pages are read from `data/pages-<language>.json`.
    pub fn open(public_root: impl AsRef<Path>, language: &str) -> Result<Self, RegistryError> {
        let public_root = public_root.as_ref().to_path_buf();
        let read_dir = std::fs::read_dir(&public_root).map_err(|source| RegistryError::Io {
            path: public_root.clone(),
            source,
        })?;

        let mut entries = BTreeMap::new();
        for dir_entry in read_dir.filter_map(Result::ok) {
            let path = dir_entry.path();
            if !path.join("data/manifest.json").is_file() {
                continue;
            }
            let Some(slug) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if validate_slug(slug).is_err() {
                warn!("Ignoring '{}': not a valid manual slug", path.display());
                continue;
            }
            entries.insert(slug.to_string(), OnceCell::new());
        }
        debug!(
            "Registry at {}: {} manual(s)",
            public_root.display(),
            entries.len()
        );

        Ok(Self {
            public_root,
            language: language.to_string(),
            entries,
        })
    }

    /// Every known slug, sorted.
    pub fn slugs(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.entries.contains_key(slug)
    }

    /// The validated entry for `slug`, loading it on first use.
    pub fn entry(&self, slug: &str) -> Result<&RegistryEntry, RegistryError> {
        let cell = self.entries.get(slug).ok_or_else(|| RegistryError::NotFound {
            slug: slug.to_string(),
        })?;
        cell.get_or_try_init(|| self.load(slug))
    }

    pub fn manifest(&self, slug: &str) -> Result<&ManualManifest, RegistryError> {
        Ok(&self.entry(slug)?.manifest)
    }

    pub fn pages(&self, slug: &str) -> Result<&[PageEntry], RegistryError> {
        Ok(&self.entry(slug)?.pages)
    }

    /// Page `page_num` of `slug`; `None` outside `1..=totalPages`.
    pub fn page(&self, slug: &str, page_num: u32) -> Result<Option<&PageEntry>, RegistryError> {
        let pages = self.pages(slug)?;
        Ok(page_num
            .checked_sub(1)
            .and_then(|i| pages.get(i as usize)))
    }

    pub fn title(&self, slug: &str) -> Result<&str, RegistryError> {
        Ok(&self.manifest(slug)?.title)
    }

    pub fn total_pages(&self, slug: &str) -> Result<usize, RegistryError> {
        Ok(self.manifest(slug)?.total_pages)
    }

    /// `1..=totalPages`, for static route generation.
    pub fn page_numbers(&self, slug: &str) -> Result<Vec<u32>, RegistryError> {
        Ok((1..=self.total_pages(slug)? as u32).collect())
    }

    /// Load and check every manual. Returns how many were verified.
    pub fn verify_all(&self) -> Result<usize, RegistryError> {
        for slug in self.entries.keys() {
            self.entry(slug)?;
        }
        Ok(self.entries.len())
    }

    fn load(&self, slug: &str) -> Result<RegistryEntry, RegistryError> {
        let data = self.public_root.join(slug).join("data");
        let manifest: ManualManifest = read_json(&data.join("manifest.json"))?;
        let dataset: PagesDataset = read_json(&data.join(format!("pages-{}.json", self.language)))?;
        check_consistency(&self.public_root, slug, &manifest, &dataset.pages)?;
        debug!("Loaded manual '{}' ({} pages)", slug, dataset.pages.len());
        Ok(RegistryEntry {
            manifest,
            pages: dataset.pages,
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, RegistryError> {
    let raw = std::fs::read(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| RegistryError::InvalidJson {
        path: path.to_path_buf(),
        source,
    })
}

/// Check a manual's manifest against its pages and its image files.
pub fn check_consistency(
    public_root: &Path,
    slug: &str,
    manifest: &ManualManifest,
    pages: &[PageEntry],
) -> Result<(), ConsistencyError> {
    if manifest.total_pages != pages.len() {
        return Err(ConsistencyError::TotalPages {
            slug: slug.to_string(),
            manifest: manifest.total_pages,
            actual: pages.len(),
        });
    }
    let content = pages.iter().filter(|p| p.has_content).count();
    if manifest.content_pages != content {
        return Err(ConsistencyError::ContentPages {
            slug: slug.to_string(),
            manifest: manifest.content_pages,
            actual: content,
        });
    }

    let prefix = format!("/{slug}/");
    for (i, page) in pages.iter().enumerate() {
        let expected = i as u32 + 1;
        if page.page_num != expected {
            return Err(ConsistencyError::PageSequence {
                slug: slug.to_string(),
                position: i,
                expected,
                found: page.page_num,
            });
        }

        let relative = Path::new(page.image.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if !page.image.starts_with(&prefix) || escapes {
            return Err(ConsistencyError::ImageOutsideRoot {
                slug: slug.to_string(),
                page: page.page_num,
                image: page.image.clone(),
            });
        }
        let file = public_root.join(relative);
        if !file.is_file() {
            return Err(ConsistencyError::MissingImage {
                slug: slug.to_string(),
                page: page.page_num,
                path: file,
            });
        }
    }
    Ok(())
}
