//! Coverage policy check: enough output artifacts per declared chapter

use super::outputs::markdown_files;
use crate::config::ChapterDefinition;
use crate::models::ValidationReport;
use crate::state::StateResult;
use serde::Serialize;
use std::path::PathBuf;

pub type CoverageReport = ValidationReport<CoverageDetails>;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoverageDetails {
    pub chapters: Vec<ChapterCoverage>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterCoverage {
    pub chapter_id: String,
    pub required: usize,
    pub have: usize,
    pub ok: bool,
}

pub struct CoverageValidator {
    outputs_dir: PathBuf,
    min_sections_per_chapter: usize,
}

impl CoverageValidator {
    pub fn new(outputs_dir: impl Into<PathBuf>, min_sections_per_chapter: usize) -> Self {
        Self {
            outputs_dir: outputs_dir.into(),
            min_sections_per_chapter,
        }
    }

    /// Count markdown outputs per chapter against its threshold
    ///
    /// A chapter's own `requiredSections` wins over the global minimum.
    pub async fn validate(&self, chapters: &[ChapterDefinition]) -> StateResult<CoverageReport> {
        let mut problems = Vec::new();
        let mut details = CoverageDetails::default();

        for chapter in chapters {
            let have = markdown_files(&self.outputs_dir.join(&chapter.id)).await?.len();
            let required = chapter
                .validation_criteria
                .required_sections
                .unwrap_or(self.min_sections_per_chapter);
            let ok = have >= required;
            if !ok {
                problems.push(format!(
                    "{}: {} of {} required sections present",
                    chapter.id, have, required
                ));
            }
            details.chapters.push(ChapterCoverage {
                chapter_id: chapter.id.clone(),
                required,
                have,
                ok,
            });
        }

        Ok(ValidationReport::new(problems, details, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_outputs(root: &Path, chapter_id: &str, names: &[&str]) {
        let dir = root.join(chapter_id);
        std::fs::create_dir_all(&dir).unwrap();
        for name in names {
            std::fs::write(dir.join(name), "# section").unwrap();
        }
    }

    #[tokio::test]
    async fn test_chapter_threshold_overrides_global_minimum() {
        let temp = TempDir::new().unwrap();
        write_outputs(temp.path(), "01", &["a.md", "b.MD", "c.txt"]);
        write_outputs(temp.path(), "02", &["a.markdown"]);

        let validator = CoverageValidator::new(temp.path(), 1);
        let chapters = vec![
            ChapterDefinition::new("01").with_required_sections(3),
            ChapterDefinition::new("02"),
            ChapterDefinition::new("03"),
        ];

        let report = validator.validate(&chapters).await.unwrap();
        assert!(!report.valid);
        assert_eq!(
            report.details.chapters,
            vec![
                ChapterCoverage { chapter_id: "01".into(), required: 3, have: 2, ok: false },
                ChapterCoverage { chapter_id: "02".into(), required: 1, have: 1, ok: true },
                ChapterCoverage { chapter_id: "03".into(), required: 1, have: 0, ok: false },
            ]
        );
        assert_eq!(report.problems.len(), 2);
    }

    #[tokio::test]
    async fn test_adding_files_never_breaks_coverage() {
        let temp = TempDir::new().unwrap();
        let validator = CoverageValidator::new(temp.path(), 2);
        let chapters = vec![ChapterDefinition::new("01")];

        write_outputs(temp.path(), "01", &["a.md", "b.md"]);
        assert!(validator.validate(&chapters).await.unwrap().valid);

        write_outputs(temp.path(), "01", &["c.md"]);
        assert!(validator.validate(&chapters).await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_no_chapters_is_valid() {
        let temp = TempDir::new().unwrap();
        let report = CoverageValidator::new(temp.path(), 1).validate(&[]).await.unwrap();
        assert!(report.valid);
        assert!(report.details.chapters.is_empty());
    }
}
