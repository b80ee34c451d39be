//! Read-only summary of outputs and completed sections per chapter

use super::outputs::markdown_files;
use crate::config::ChapterDefinition;
use crate::state::{ChapterStore, Loaded, StateResult};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputsReport {
    pub chapters: Vec<ChapterOutputs>,
    pub totals: OutputsTotals,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterOutputs {
    pub chapter_id: String,
    pub expected_sections: usize,
    pub output_files: Vec<String>,
    pub outputs_count: usize,
    pub completed_sections_count: usize,
    /// Mean quality score of the scored sections, if any
    pub avg_quality: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputsTotals {
    pub files: usize,
    pub sections: usize,
    /// Mean of the per-chapter averages
    pub avg_quality: Option<f64>,
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Summarize each declared chapter's outputs and recorded sections
pub async fn outputs_report(
    chapters: &ChapterStore,
    outputs_dir: &Path,
    definitions: &[ChapterDefinition],
) -> StateResult<OutputsReport> {
    let mut rows = Vec::new();
    let mut totals = OutputsTotals::default();
    let mut chapter_averages = Vec::new();

    for definition in definitions {
        let files = markdown_files(&outputs_dir.join(&definition.id)).await?;

        let sections = match chapters.load(&definition.id).await {
            Loaded::Present(state) => state.completed_sections,
            Loaded::Absent => Vec::new(),
            Loaded::Malformed(reason) => {
                tracing::debug!(chapter_id = %definition.id, reason = %reason, "unreadable chapter state in report");
                Vec::new()
            }
        };

        let scores: Vec<f64> = sections
            .iter()
            .filter_map(|s| s.generated_content.quality_score)
            .collect();
        let avg_quality = mean(&scores);
        if let Some(avg) = avg_quality {
            chapter_averages.push(avg);
        }

        totals.files += files.len();
        totals.sections += sections.len();
        rows.push(ChapterOutputs {
            chapter_id: definition.id.clone(),
            expected_sections: definition.sections.len(),
            outputs_count: files.len(),
            output_files: files,
            completed_sections_count: sections.len(),
            avg_quality,
        });
    }

    totals.avg_quality = mean(&chapter_averages);
    Ok(OutputsReport {
        chapters: rows,
        totals,
    })
}
