//! Dataset builder: translation records (+ extracted text) → one
//! page-indexed JSON document per language.
//!
//! The page count comes from the extracted text when it is available, so a
//! page whose translation failed still appears in the target dataset (with
//! empty content) and both datasets have the same length. Without extracted
//! text the records themselves must cover `1..=N` without gaps.
//!
//! `image`, `hasContent`, `title`, `sectionName` and `tags` are always
//! derived here, never copied from an earlier build.

use crate::config::ManualConfig;
use crate::error::StageError;
use crate::output::{has_content, DatasetMetadata, DatasetSummary, PageEntry, PagesDataset, TranslationRecord};
use crate::pipeline::files::{ensure_dir, list_pages, read_json, scan_pages_optional, write_json_atomic};
use crate::progress::{ProgressCallback, Stage};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Build `pages-<target>.json` and, when extracted text exists,
/// `pages-<source>.json`.
pub fn build_datasets(
    config: &ManualConfig,
    progress: &ProgressCallback,
) -> Result<DatasetSummary, StageError> {
    let settings = &config.settings;
    let records = load_records(config)?;
    let extracted = scan_pages_optional(&config.paths.extracted, "txt")?;

    let total = if extracted.is_empty() {
        records_total(config, &records)?
    } else {
        let total = extracted.len() as u32;
        if let Some((&page, _)) = records.range(total + 1..).next() {
            return Err(StageError::PageOutOfRange { page, total });
        }
        total
    };
    progress.on_stage_start(Stage::Build, total as usize);

    let mut missing_records = 0usize;
    let target_contents: Vec<String> = (1..=total)
        .map(|n| match records.get(&n) {
            Some(rec) => rec.translation.clone(),
            None => {
                missing_records += 1;
                warn!("Page {}: no translation record, emitting empty content", n);
                String::new()
            }
        })
        .collect();

    ensure_dir(&config.paths.data)?;
    let target = assemble(config, &target_contents, &settings.target_language, "translation");
    write_json_atomic(&config.dataset_path(&settings.target_language), &target)?;
    for page in &target.pages {
        progress.on_page_complete(Stage::Build, page.page_num, total as usize);
    }

    let source_pages = if extracted.is_empty() {
        info!("No extracted text; skipping the {} dataset", settings.source_language);
        None
    } else {
        let source_contents = extracted
            .iter()
            .map(|page| {
                std::fs::read_to_string(&page.path)
                    .map(|t| t.trim().to_string())
                    .map_err(|e| StageError::io(&page.path, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let source = assemble(config, &source_contents, &settings.source_language, "extraction");
        write_json_atomic(&config.dataset_path(&settings.source_language), &source)?;
        Some(source.pages.len())
    };

    let summary = DatasetSummary {
        target_pages: target.pages.len(),
        source_pages,
        content_pages: target.content_pages(),
        missing_records,
    };
    progress.on_stage_complete(Stage::Build, summary.target_pages);
    info!(
        "Built datasets for '{}': {} pages, {} with content",
        config.slug, summary.target_pages, summary.content_pages
    );
    Ok(summary)
}

/// Read every record, checking each declares the page its file name encodes.
fn load_records(config: &ManualConfig) -> Result<BTreeMap<u32, TranslationRecord>, StageError> {
    let dir = &config.paths.translations_draft;
    if !dir.is_dir() {
        return Err(StageError::MissingInput {
            dir: dir.clone(),
            hint: "manual-pipeline translate",
        });
    }

    let mut records = BTreeMap::new();
    for file in list_pages(dir, "json")? {
        let record: TranslationRecord = read_json(&file.path)?;
        if record.page_num != file.page_num {
            return Err(StageError::RecordPageMismatch {
                path: file.path,
                expected: file.page_num,
                declared: record.page_num,
            });
        }
        if records.insert(record.page_num, record).is_some() {
            return Err(StageError::DuplicatePage {
                dir: dir.clone(),
                page: file.page_num,
            });
        }
    }

    if records.is_empty() {
        return Err(StageError::EmptyInput {
            dir: dir.clone(),
            hint: "manual-pipeline translate",
        });
    }
    Ok(records)
}

fn records_total(
    config: &ManualConfig,
    records: &BTreeMap<u32, TranslationRecord>,
) -> Result<u32, StageError> {
    for (i, &page) in records.keys().enumerate() {
        let expected = i as u32 + 1;
        if page != expected {
            return Err(StageError::PageDrift {
                dir: config.paths.translations_draft.clone(),
                expected,
                found: page,
            });
        }
    }
    Ok(records.len() as u32)
}

fn assemble(config: &ManualConfig, contents: &[String], language: &str, method: &str) -> PagesDataset {
    let annotations = annotate(contents, &config.settings.tag_rules);
    let pages = contents
        .iter()
        .zip(annotations)
        .enumerate()
        .map(|(i, (content, ann))| {
            let page_num = i as u32 + 1;
            PageEntry {
                page_num,
                image: config.image_url(page_num),
                title: ann.title.unwrap_or_else(|| format!("Page {page_num}")),
                section_name: ann.section_name,
                content: content.clone(),
                has_content: has_content(content),
                tags: ann.tags,
            }
        })
        .collect();

    PagesDataset {
        metadata: DatasetMetadata {
            processed_at: Utc::now(),
            language: language.to_string(),
            method: method.to_string(),
            image_format: config.settings.image_format,
            image_dpi: config.settings.image_dpi,
        },
        pages,
    }
}

// ── Titles, sections, tags ───────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,3})\s+(.+)$").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Annotation {
    title: Option<String>,
    section_name: Option<String>,
    tags: Vec<String>,
}

/// Markdown headings of one page as `(level, text)`.
fn headings(content: &str) -> impl Iterator<Item = (usize, String)> + '_ {
    content.lines().filter_map(|line| {
        let caps = RE_HEADING.captures(line.trim())?;
        let text = caps[2].trim().trim_end_matches('#').trim();
        (!text.is_empty()).then(|| (caps[1].len(), text.to_string()))
    })
}

/// Derive title, section and tags for consecutive pages. The section is the
/// latest level-1/2 heading on this or any earlier page.
fn annotate(contents: &[String], tag_rules: &BTreeMap<String, Vec<String>>) -> Vec<Annotation> {
    let mut section: Option<String> = None;
    contents
        .iter()
        .map(|content| {
            let mut title = None;
            for (level, text) in headings(content) {
                if title.is_none() {
                    title = Some(text.clone());
                }
                if level <= 2 {
                    section = Some(text);
                }
            }
            let tags = match_tags(title.as_deref(), section.as_deref(), tag_rules);
            Annotation {
                title,
                section_name: section.clone(),
                tags,
            }
        })
        .collect()
}

/// Tags whose keywords occur (case-insensitively) in the title or section.
fn match_tags(
    title: Option<&str>,
    section: Option<&str>,
    tag_rules: &BTreeMap<String, Vec<String>>,
) -> Vec<String> {
    let haystacks: Vec<String> = [title, section]
        .into_iter()
        .flatten()
        .map(str::to_lowercase)
        .collect();
    if haystacks.is_empty() {
        return Vec::new();
    }

    tag_rules
        .iter()
        .filter(|(_, keywords)| {
            keywords.iter().any(|kw| {
                let kw = kw.trim().to_lowercase();
                !kw.is_empty() && haystacks.iter().any(|h| h.contains(&kw))
            })
        })
        .map(|(tag, _)| tag.clone())
        .collect()
}
