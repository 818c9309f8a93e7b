//! Per-manual pipeline state, derived from the files on disk.

use crate::config::ManualConfig;
use crate::pipeline::files::{count_pages, list_pages};
use std::fmt;

/// How far a manual has progressed. Each state implies all earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Unsplit,
    Split,
    RenderedAndExtracted,
    Translated,
    DatasetBuilt,
    ManifestBuilt,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineState::Unsplit => "unsplit",
            PipelineState::Split => "split",
            PipelineState::RenderedAndExtracted => "rendered & extracted",
            PipelineState::Translated => "translated",
            PipelineState::DatasetBuilt => "dataset built",
            PipelineState::ManifestBuilt => "manifest built",
        })
    }
}

/// Artifact counts for one manual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    pub split_pages: usize,
    pub rendered_pages: usize,
    pub extracted_pages: usize,
    pub translated_pages: usize,
    /// Pages in `1..=split_pages` with no translation record.
    pub missing_records: Vec<u32>,
    pub error_reports: usize,
    pub has_target_dataset: bool,
    pub has_source_dataset: bool,
    pub has_manifest: bool,
    pub state: PipelineState,
}

/// Inspect the manual's directories. Never fails: unreadable directories
/// count as empty.
pub fn status(config: &ManualConfig) -> PipelineStatus {
    let paths = &config.paths;
    let settings = &config.settings;

    let split_pages = count_pages(&paths.split_pdf, "pdf");
    let rendered_pages = count_pages(&paths.images, settings.image_format.extension());
    let extracted_pages = count_pages(&paths.extracted, "txt");

    let recorded: Vec<u32> = list_pages(&paths.translations_draft, "json")
        .map(|pages| pages.into_iter().map(|p| p.page_num).collect())
        .unwrap_or_default();
    let missing_records: Vec<u32> = (1..=split_pages as u32)
        .filter(|n| recorded.binary_search(n).is_err())
        .collect();

    let error_reports = std::fs::read_dir(&paths.inbox)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| {
                    e.file_name()
                        .to_string_lossy()
                        .starts_with("translation-error-")
                })
                .count()
        })
        .unwrap_or(0);

    let has_target_dataset = config.dataset_path(&settings.target_language).is_file();
    let has_source_dataset = config.dataset_path(&settings.source_language).is_file();
    let has_manifest = config.manifest_path().is_file();

    let state = derive_state(
        split_pages,
        rendered_pages,
        extracted_pages,
        missing_records.is_empty(),
        has_target_dataset,
        has_manifest,
    );

    PipelineStatus {
        split_pages,
        rendered_pages,
        extracted_pages,
        translated_pages: recorded.len(),
        missing_records,
        error_reports,
        has_target_dataset,
        has_source_dataset,
        has_manifest,
        state,
    }
}

fn derive_state(
    split: usize,
    rendered: usize,
    extracted: usize,
    all_translated: bool,
    has_dataset: bool,
    has_manifest: bool,
) -> PipelineState {
    if split == 0 {
        return PipelineState::Unsplit;
    }
    if rendered != split || extracted != split {
        return PipelineState::Split;
    }
    if !all_translated {
        return PipelineState::RenderedAndExtracted;
    }
    if !has_dataset {
        return PipelineState::Translated;
    }
    if !has_manifest {
        return PipelineState::DatasetBuilt;
    }
    PipelineState::ManifestBuilt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::pipeline::files::page_file_name;
    use tempfile::TempDir;

    #[test]
    fn state_chain() {
        assert_eq!(derive_state(0, 0, 0, true, true, true), PipelineState::Unsplit);
        assert_eq!(derive_state(3, 2, 3, false, false, false), PipelineState::Split);
        assert_eq!(
            derive_state(3, 3, 3, false, false, false),
            PipelineState::RenderedAndExtracted
        );
        assert_eq!(derive_state(3, 3, 3, true, false, false), PipelineState::Translated);
        assert_eq!(derive_state(3, 3, 3, true, true, false), PipelineState::DatasetBuilt);
        assert_eq!(derive_state(3, 3, 3, true, true, true), PipelineState::ManifestBuilt);
        assert!(PipelineState::Split < PipelineState::ManifestBuilt);
    }

    #[test]
    fn reports_missing_records() {
        let root = TempDir::new().unwrap();
        let config = ManualConfig::new(
            root.path(),
            "oxi-coral",
            root.path().join("x.pdf"),
            Settings::default(),
        )
        .unwrap();
        let p = &config.paths;
        for dir in [&p.split_pdf, &p.images, &p.extracted, &p.translations_draft, &p.inbox] {
            std::fs::create_dir_all(dir).unwrap();
        }
        for n in 1..=3 {
            std::fs::write(p.split_pdf.join(page_file_name(n, "pdf")), b"").unwrap();
            std::fs::write(p.images.join(page_file_name(n, "png")), b"").unwrap();
            std::fs::write(p.extracted.join(page_file_name(n, "txt")), b"").unwrap();
        }
        for n in [1, 3] {
            std::fs::write(p.translations_draft.join(page_file_name(n, "json")), b"{}").unwrap();
        }
        std::fs::write(p.inbox.join("translation-error-page-002.json"), b"{}").unwrap();

        let s = status(&config);
        assert_eq!(s.split_pages, 3);
        assert_eq!(s.translated_pages, 2);
        assert_eq!(s.missing_records, vec![2]);
        assert_eq!(s.error_reports, 1);
        assert_eq!(s.state, PipelineState::RenderedAndExtracted);
    }
}
