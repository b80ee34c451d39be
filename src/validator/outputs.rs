//! Outputs Reconciler
//!
//! Compares the section references recorded in each chapter state with the
//! markdown files present in `<outputs>/<chapterId>/`:
//! - Stale references point at files that no longer exist
//! - Orphan files exist on disk without a section referencing them
//!
//! Both checks run before any write; a repaired chapter file is written once.

use crate::models::{CompletedSection, GeneratedContent, ValidationReport};
use crate::state::{ChapterStore, StateError, StateResult};
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub type OutputsValidation = ValidationReport<OutputsDetails, OutputsFixes>;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputsDetails {
    /// References whose file is missing
    pub stale_refs: Vec<FileRef>,
    /// Files without a referencing section
    pub orphan_files: Vec<FileRef>,
    pub malformed_chapter_states: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputsFixes {
    pub refs_removed: Vec<FileRef>,
    pub files_added_to_state: Vec<AddedSection>,
    pub files_written: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub chapter_id: String,
    pub file: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddedSection {
    pub chapter_id: String,
    pub file: String,
    pub section_name: String,
}

/// Reconciles chapter states with the output directory tree
pub struct OutputsReconciler {
    chapters: ChapterStore,
    outputs_dir: PathBuf,
}

impl OutputsReconciler {
    pub fn new(chapters: ChapterStore, outputs_dir: impl Into<PathBuf>) -> Self {
        Self {
            chapters,
            outputs_dir: outputs_dir.into(),
        }
    }

    pub async fn validate(&self, fix: bool) -> StateResult<OutputsValidation> {
        let mut problems = Vec::new();
        let mut details = OutputsDetails::default();
        let mut fixes = OutputsFixes::default();

        let scan = self.chapters.scan().await?;
        for malformed in &scan.malformed {
            problems.push(format!(
                "{}: chapter state is unreadable: {}",
                malformed.file_id, malformed.reason
            ));
            details.malformed_chapter_states.push(malformed.file_id.clone());
        }

        for (file_id, mut state) in scan.states {
            let chapter_id = state.chapter_id.clone();
            let out_dir = self.outputs_dir.join(&chapter_id);
            let files = markdown_files(&out_dir).await?;

            let mut refs: Vec<String> = Vec::new();
            for file in state.referenced_files() {
                if !refs.iter().any(|r| r == file) {
                    refs.push(file.to_string());
                }
            }

            let mut stale = Vec::new();
            for file in &refs {
                let exists = tokio::fs::try_exists(out_dir.join(file))
                    .await
                    .map_err(|e| StateError::io(out_dir.join(file), e))?;
                if !exists {
                    problems.push(format!(
                        "{}: missing output file for reference {}",
                        chapter_id, file
                    ));
                    stale.push(file.clone());
                }
            }

            let referenced: BTreeSet<&str> = refs.iter().map(String::as_str).collect();
            let orphans: Vec<String> = files
                .into_iter()
                .filter(|file| !referenced.contains(file.as_str()))
                .collect();
            for file in &orphans {
                problems.push(format!(
                    "{}: orphan output file not recorded in state {}",
                    chapter_id, file
                ));
            }

            details
                .stale_refs
                .extend(stale.iter().map(|file| file_ref(&chapter_id, file)));
            details
                .orphan_files
                .extend(orphans.iter().map(|file| file_ref(&chapter_id, file)));

            if !fix || (stale.is_empty() && orphans.is_empty()) {
                continue;
            }

            for file in &stale {
                state
                    .completed_sections
                    .retain(|section| section.content_file() != Some(file.as_str()));
                fixes.refs_removed.push(file_ref(&chapter_id, file));
            }
            for file in &orphans {
                let section = orphan_section(&chapter_id, &out_dir, file).await;
                fixes.files_added_to_state.push(AddedSection {
                    chapter_id: chapter_id.clone(),
                    file: file.clone(),
                    section_name: section.section_name.clone(),
                });
                state.completed_sections.push(section);
            }

            let path = self.chapters.save_as(&file_id, &state).await?;
            tracing::info!(
                chapter_id = %chapter_id,
                removed = stale.len(),
                added = orphans.len(),
                "chapter sections reconciled with outputs"
            );
            fixes.files_written.push(path);
        }

        Ok(ValidationReport::new(problems, details, fix.then_some(fixes)))
    }
}

fn file_ref(chapter_id: &str, file: &str) -> FileRef {
    FileRef {
        chapter_id: chapter_id.to_string(),
        file: file.to_string(),
    }
}

async fn orphan_section(chapter_id: &str, out_dir: &Path, file: &str) -> CompletedSection {
    let word_count = match tokio::fs::read_to_string(out_dir.join(file)).await {
        Ok(content) => content.split_whitespace().count() as u64,
        Err(e) => {
            tracing::debug!(file, error = %e, "could not count words of orphan output");
            0
        }
    };

    let mut section = CompletedSection::for_file(section_name_from_file(chapter_id, file), file);
    section.generated_content = GeneratedContent {
        content_file: Some(file.to_string()),
        word_count,
        ..GeneratedContent::default()
    };
    section
}

/// Human-readable section name for an output file
///
/// `<chapterId>__<slug>.md` becomes the slug with `-`/`_` runs turned into
/// spaces and every word capitalized; other names lose their extension.
pub fn section_name_from_file(chapter_id: &str, file: &str) -> String {
    let pattern = format!(r"(?i)^{}__(.+)\.md$", regex::escape(chapter_id));
    let slug = Regex::new(&pattern)
        .ok()
        .and_then(|re| re.captures(file).map(|caps| caps[1].to_string()));

    let Some(slug) = slug else {
        return strip_markdown_extension(file).to_string();
    };

    let spaced = match Regex::new(r"[-_]+") {
        Ok(re) => re.replace_all(&slug, " ").into_owned(),
        Err(_) => slug,
    };
    match Regex::new(r"\b\w") {
        Ok(re) => re
            .replace_all(&spaced, |caps: &Captures| caps[0].to_uppercase())
            .into_owned(),
        Err(_) => spaced,
    }
}

fn strip_markdown_extension(file: &str) -> &str {
    let lower = file.to_ascii_lowercase();
    for ext in [".markdown", ".md"] {
        if lower.ends_with(ext) {
            return &file[..file.len() - ext.len()];
        }
    }
    file
}

/// True for `.md` / `.markdown` names, case-insensitively
pub fn is_markdown(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".md") || lower.ends_with(".markdown")
}

/// Markdown files directly in `dir`, sorted; a missing directory is empty
pub async fn markdown_files(dir: &Path) -> StateResult<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StateError::io(dir, e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| StateError::io(dir, e))? {
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        let name = entry.file_name().to_string_lossy().to_string();
        if is_file && is_markdown(&name) {
            files.push(name);
        }
    }

    files.sort();
    Ok(files)
}
