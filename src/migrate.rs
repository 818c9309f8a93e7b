//! One-way offline migrations of legacy published data.
//!
//! * [`parts_to_pages`]: `data/part-*.json` → `data/pages.json`, and the
//!   `parts` array dropped from `manifest.json`.
//! * [`to_bilingual`]: `data/pages.json` → `data/pages-<target>.json` with
//!   `translation` renamed to `content`, plus `pages-<source>.json` built from
//!   the extracted text when it is still around.
//!
//! Both walk every manual under `public/`, skip manuals that are already
//! migrated, and write nothing in dry-run mode. Legacy files are left in
//! place. The runtime code only ever reads the current schema.

use crate::config::{validate_slug, ManualPaths, PUBLIC_DIR};
use crate::error::MigrationError;
use crate::output::has_content;
use crate::pipeline::files::{page_file_name, write_json_atomic};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result for one manual.
#[derive(Debug)]
pub enum MigrationOutcome {
    Migrated { slug: String, detail: String },
    Skipped { slug: String, reason: String },
    Failed { slug: String, error: MigrationError },
}

#[derive(Debug, Default)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub outcomes: Vec<MigrationOutcome>,
}

impl MigrationReport {
    pub fn migrated(&self) -> usize {
        self.count(|o| matches!(o, MigrationOutcome::Migrated { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, MigrationOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, MigrationOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&MigrationOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// Merge legacy `part-*.json` files into `pages.json` for every manual.
pub fn parts_to_pages(root: &Path, dry_run: bool) -> Result<MigrationReport, MigrationError> {
    run_each(root, dry_run, |slug, data| migrate_parts(slug, data, dry_run))
}

/// Convert `pages.json` into per-language datasets for every manual.
pub fn to_bilingual(
    root: &Path,
    source_language: &str,
    target_language: &str,
    dry_run: bool,
) -> Result<MigrationReport, MigrationError> {
    run_each(root, dry_run, |slug, data| {
        let extracted = ManualPaths::for_slug(root, slug).extracted;
        migrate_bilingual(slug, data, &extracted, source_language, target_language, dry_run)
    })
}

fn run_each(
    root: &Path,
    dry_run: bool,
    migrate_one: impl Fn(&str, &Path) -> Result<MigrationOutcome, MigrationError>,
) -> Result<MigrationReport, MigrationError> {
    let public = root.join(PUBLIC_DIR);
    let entries = std::fs::read_dir(&public).map_err(|_| MigrationError::MissingRoot(public.clone()))?;

    let mut slugs: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .filter(|name| validate_slug(name).is_ok())
        .collect();
    slugs.sort();

    let mut report = MigrationReport {
        dry_run,
        outcomes: Vec::with_capacity(slugs.len()),
    };
    for slug in slugs {
        let data = public.join(&slug).join("data");
        let outcome = if !data.is_dir() {
            MigrationOutcome::Skipped {
                slug: slug.clone(),
                reason: "no data directory".into(),
            }
        } else {
            migrate_one(&slug, &data).unwrap_or_else(|error| MigrationOutcome::Failed {
                slug: slug.clone(),
                error,
            })
        };
        match &outcome {
            MigrationOutcome::Migrated { slug, detail } => info!("{}: {}", slug, detail),
            MigrationOutcome::Skipped { slug, reason } => info!("{}: skipped ({})", slug, reason),
            MigrationOutcome::Failed { slug, error } => warn!("{}: {}", slug, error),
        }
        report.outcomes.push(outcome);
    }
    Ok(report)
}

// ── parts → pages ────────────────────────────────────────────────────────

fn migrate_parts(slug: &str, data: &Path, dry_run: bool) -> Result<MigrationOutcome, MigrationError> {
    let pages_path = data.join("pages.json");
    if pages_path.exists() {
        return Ok(skipped(slug, "pages.json already exists"));
    }

    let mut part_files: Vec<PathBuf> = list_files(data)?
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("part-") && n.ends_with(".json"))
        })
        .collect();
    if part_files.is_empty() {
        return Ok(skipped(slug, "no part files"));
    }
    part_files.sort();

    let mut pages: Vec<(u64, Value)> = Vec::new();
    let mut metadata: Option<Value> = None;
    for path in &part_files {
        let mut part = read_value(path)?;
        let part_pages = match part.get_mut("pages").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => return Err(schema(path, "missing \"pages\" array")),
        };
        for page in part_pages {
            let num = page_num_of(&page).ok_or_else(|| schema(path, "page without numeric \"pageNum\""))?;
            pages.push((num, page));
        }
        if metadata.is_none() {
            metadata = part.get("metadata").filter(|m| m.is_object()).cloned();
        }
    }

    pages.sort_by_key(|(n, _)| *n);
    if let Some(w) = pages.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(schema(data, &format!("page {} appears in more than one part", w[0].0)));
    }

    let total = pages.len();
    let doc = json!({
        "metadata": metadata.unwrap_or_else(|| json!({ "processedAt": Utc::now() })),
        "pages": pages.into_iter().map(|(_, p)| p).collect::<Vec<_>>(),
    });

    let manifest_path = data.join("manifest.json");
    let mut manifest_changed = false;
    let mut manifest = None;
    if manifest_path.is_file() {
        let mut m = read_value(&manifest_path)?;
        if let Some(obj) = m.as_object_mut() {
            manifest_changed |= obj.remove("parts").is_some();
            manifest_changed |= obj.remove("_future_parts").is_some();
        }
        manifest = Some(m);
    }

    if !dry_run {
        write_json_atomic(&pages_path, &doc)?;
        if let (true, Some(m)) = (manifest_changed, &manifest) {
            write_json_atomic(&manifest_path, m)?;
        }
    }

    Ok(MigrationOutcome::Migrated {
        slug: slug.to_string(),
        detail: format!(
            "merged {} part file(s) into pages.json ({} pages){}",
            part_files.len(),
            total,
            if manifest_changed { ", removed parts from manifest" } else { "" }
        ),
    })
}

// ── pages.json → pages-<lang>.json ───────────────────────────────────────

fn migrate_bilingual(
    slug: &str,
    data: &Path,
    extracted_dir: &Path,
    source_language: &str,
    target_language: &str,
    dry_run: bool,
) -> Result<MigrationOutcome, MigrationError> {
    let legacy_path = data.join("pages.json");
    let target_path = data.join(format!("pages-{target_language}.json"));
    if target_path.exists() {
        return Ok(skipped(slug, &format!("pages-{target_language}.json already exists")));
    }
    if !legacy_path.is_file() {
        return Ok(skipped(slug, "no pages.json"));
    }

    let legacy = read_value(&legacy_path)?;
    let legacy_pages = legacy
        .get("pages")
        .and_then(Value::as_array)
        .ok_or_else(|| schema(&legacy_path, "missing \"pages\" array"))?;

    let mut target_meta = legacy
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    target_meta.insert("language".into(), json!(target_language));

    let target_pages = legacy_pages
        .iter()
        .map(|page| {
            let content = page.get("translation").and_then(Value::as_str).unwrap_or("");
            convert_page(page, content).ok_or_else(|| schema(&legacy_path, "page without numeric \"pageNum\""))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let target_doc = json!({ "metadata": target_meta, "pages": target_pages });

    let source_doc = if has_extracted_text(extracted_dir) {
        let pages = legacy_pages
            .iter()
            .map(|page| {
                let num = page_num_of(page).ok_or_else(|| schema(&legacy_path, "page without numeric \"pageNum\""))?;
                let txt = extracted_dir.join(page_file_name(num as u32, "txt"));
                let content = match std::fs::read_to_string(&txt) {
                    Ok(text) => text.trim().to_string(),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                    Err(source) => return Err(MigrationError::Io { path: txt, source }),
                };
                convert_page(page, &content).ok_or_else(|| schema(&legacy_path, "page without numeric \"pageNum\""))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut meta = Map::new();
        meta.insert("processedAt".into(), json!(Utc::now()));
        meta.insert("language".into(), json!(source_language));
        meta.insert("method".into(), json!("extraction"));
        for key in ["imageFormat", "imageDPI"] {
            if let Some(v) = target_meta.get(key) {
                meta.insert(key.into(), v.clone());
            }
        }
        Some(json!({ "metadata": meta, "pages": pages }))
    } else {
        None
    };

    if !dry_run {
        write_json_atomic(&target_path, &target_doc)?;
        if let Some(doc) = &source_doc {
            write_json_atomic(&data.join(format!("pages-{source_language}.json")), doc)?;
        }
    }

    let mut detail = format!("created pages-{target_language}.json ({} pages)", target_pages_len(&target_doc));
    if source_doc.is_some() {
        detail.push_str(&format!(" and pages-{source_language}.json from extracted text"));
    }
    Ok(MigrationOutcome::Migrated {
        slug: slug.to_string(),
        detail,
    })
}

/// Current-schema page from a legacy page and its new content.
fn convert_page(legacy: &Value, content: &str) -> Option<Value> {
    let num = page_num_of(legacy)?;
    Some(json!({
        "pageNum": num,
        "image": legacy.get("image").cloned().unwrap_or(Value::Null),
        "title": legacy.get("title").cloned().unwrap_or_else(|| json!(format!("Page {num}"))),
        "sectionName": legacy.get("sectionName").cloned().unwrap_or(Value::Null),
        "content": content,
        "hasContent": has_content(content),
        "tags": legacy.get("tags").cloned().unwrap_or_else(|| json!([])),
    }))
}

fn target_pages_len(doc: &Value) -> usize {
    doc["pages"].as_array().map_or(0, Vec::len)
}

fn has_extracted_text(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries.filter_map(Result::ok).any(|e| {
                let name = e.file_name();
                let name = name.to_string_lossy();
                name.starts_with("page-") && name.ends_with(".txt")
            })
        })
        .unwrap_or(false)
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn skipped(slug: &str, reason: &str) -> MigrationOutcome {
    MigrationOutcome::Skipped {
        slug: slug.to_string(),
        reason: reason.to_string(),
    }
}

fn schema(path: &Path, detail: &str) -> MigrationError {
    MigrationError::UnexpectedSchema {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

fn page_num_of(page: &Value) -> Option<u64> {
    page.get("pageNum").and_then(Value::as_u64).filter(|n| *n >= 1)
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, MigrationError> {
    let entries = std::fs::read_dir(dir).map_err(|source| MigrationError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect())
}

fn read_value(path: &Path) -> Result<Value, MigrationError> {
    let raw = std::fs::read(path).map_err(|source| MigrationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| MigrationError::InvalidJson {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, value: &Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
    }

    fn legacy_page(n: u64, translation: &str) -> Value {
        json!({
            "pageNum": n,
            "image": format!("/oxi-coral/pages/page-{n:03}.png"),
            "title": format!("Page {n}"),
            "sectionName": null,
            "translation": translation,
            "hasContent": !translation.is_empty(),
            "tags": []
        })
    }

    #[test]
    fn merges_parts_sorted_and_strips_manifest() {
        let root = TempDir::new().unwrap();
        let data = root.path().join("public/oxi-coral/data");
        write(
            &data.join("part-02.json"),
            &json!({ "part": 2, "pages": [legacy_page(4, "d"), legacy_page(3, "c")] }),
        );
        write(
            &data.join("part-01.json"),
            &json!({ "part": 1, "metadata": { "imageDPI": 150 }, "pages": [legacy_page(1, "a"), legacy_page(2, "b")] }),
        );
        write(
            &data.join("manifest.json"),
            &json!({ "title": "OXI Coral Manual", "totalPages": 4, "parts": [1, 2] }),
        );

        let report = parts_to_pages(root.path(), false).unwrap();
        assert_eq!(report.migrated(), 1);

        let pages = read_value(&data.join("pages.json")).unwrap();
        let nums: Vec<u64> = pages["pages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["pageNum"].as_u64().unwrap())
            .collect();
        assert_eq!(nums, vec![1, 2, 3, 4]);
        assert_eq!(pages["metadata"]["imageDPI"], 150);

        let manifest = read_value(&data.join("manifest.json")).unwrap();
        assert!(manifest.get("parts").is_none());
        assert_eq!(manifest["totalPages"], 4);

        let again = parts_to_pages(root.path(), false).unwrap();
        assert_eq!((again.migrated(), again.skipped()), (0, 1));
    }

    #[test]
    fn dry_run_writes_nothing() {
        let root = TempDir::new().unwrap();
        let data = root.path().join("public/oxi-coral/data");
        write(&data.join("part-01.json"), &json!({ "pages": [legacy_page(1, "a")] }));

        let report = parts_to_pages(root.path(), true).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.migrated(), 1);
        assert!(!data.join("pages.json").exists());
    }

    #[test]
    fn duplicate_page_across_parts_fails_that_manual() {
        let root = TempDir::new().unwrap();
        let data = root.path().join("public/oxi-coral/data");
        write(&data.join("part-01.json"), &json!({ "pages": [legacy_page(1, "a")] }));
        write(&data.join("part-02.json"), &json!({ "pages": [legacy_page(1, "b")] }));

        let report = parts_to_pages(root.path(), false).unwrap();
        assert_eq!(report.failed(), 1);
        assert!(!data.join("pages.json").exists());
    }

    #[test]
    fn bilingual_conversion_with_extracted_text() {
        let root = TempDir::new().unwrap();
        let data = root.path().join("public/oxi-coral/data");
        write(
            &data.join("pages.json"),
            &json!({
                "metadata": { "imageFormat": "png", "imageDPI": 150 },
                "pages": [legacy_page(1, "表紙"), legacy_page(2, "")]
            }),
        );
        let extracted = ManualPaths::for_slug(root.path(), "oxi-coral").extracted;
        std::fs::create_dir_all(&extracted).unwrap();
        std::fs::write(extracted.join("page-001.txt"), "  Cover \n").unwrap();

        let report = to_bilingual(root.path(), "en", "ja", false).unwrap();
        assert_eq!(report.migrated(), 1);

        let ja = read_value(&data.join("pages-ja.json")).unwrap();
        assert_eq!(ja["metadata"]["language"], "ja");
        assert_eq!(ja["metadata"]["imageDPI"], 150);
        assert_eq!(ja["pages"][0]["content"], "表紙");
        assert!(ja["pages"][0].get("translation").is_none());
        assert_eq!(ja["pages"][1]["hasContent"], false);

        let en = read_value(&data.join("pages-en.json")).unwrap();
        assert_eq!(en["metadata"]["language"], "en");
        assert_eq!(en["pages"][0]["content"], "Cover");
        assert_eq!(en["pages"][1]["content"], "");

        assert!(data.join("pages.json").exists());
        let again = to_bilingual(root.path(), "en", "ja", false).unwrap();
        assert_eq!(again.skipped(), 1);
    }

    #[test]
    fn bilingual_without_extracted_text_only_writes_target() {
        let root = TempDir::new().unwrap();
        let data = root.path().join("public/oxi-coral/data");
        write(&data.join("pages.json"), &json!({ "pages": [legacy_page(1, "a")] }));

        to_bilingual(root.path(), "en", "ja", false).unwrap();
        assert!(data.join("pages-ja.json").exists());
        assert!(!data.join("pages-en.json").exists());
    }

    #[test]
    fn migrated_data_dir_holds_only_final_files() {
        let root = TempDir::new().unwrap();
        let data = root.path().join("public/oxi-coral/data");
        write(&data.join("pages.json"), &json!({ "pages": [legacy_page(1, "a")] }));

        to_bilingual(root.path(), "en", "ja", false).unwrap();
        let mut names: Vec<String> = list_files(&data)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["pages-ja.json", "pages.json"]);
        assert!(std::fs::read_to_string(data.join("pages-ja.json")).unwrap().ends_with("}\n"));
    }

    #[test]
    fn missing_public_dir() {
        let root = TempDir::new().unwrap();
        assert!(matches!(
            parts_to_pages(root.path(), false),
            Err(MigrationError::MissingRoot(_))
        ));
    }
}
