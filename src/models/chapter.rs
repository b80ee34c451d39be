//! Per-chapter state (`chapter-states/<chapterId>.json`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Decision types whose resolution records a retrieval selection
pub const SELECTION_DECISION_TYPES: &[&str] =
    &["SEARCH_RESULTS_SELECTION", "EMBEDDED_SEARCH_SELECTION"];

/// Lifecycle status of one chapter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChapterStatus {
    Initialized,
    InProgress,
    Paused,
    Completed,
    Error,
    Reviewed,
}

impl ChapterStatus {
    pub fn name(&self) -> &'static str {
        match self {
            ChapterStatus::Initialized => "INITIALIZED",
            ChapterStatus::InProgress => "IN_PROGRESS",
            ChapterStatus::Paused => "PAUSED",
            ChapterStatus::Completed => "COMPLETED",
            ChapterStatus::Error => "ERROR",
            ChapterStatus::Reviewed => "REVIEWED",
        }
    }
}

impl std::fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A choice point awaiting a resolution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingDecision {
    pub decision_id: String,

    #[serde(rename = "type", default = "default_decision_type")]
    pub decision_type: String,

    #[serde(default)]
    pub context: Value,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_decision_type() -> String {
    "GENERIC".to_string()
}

/// A resolved choice point
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedDecision {
    pub decision_id: String,

    #[serde(default)]
    pub resolution: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reference to a generated output artifact
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    /// File name relative to the chapter's output directory
    #[serde(default)]
    pub content_file: Option<String>,

    #[serde(default)]
    pub word_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Retrieval metadata attached to a completed section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectionSearchResults {
    #[serde(default)]
    pub total_results: u64,

    #[serde(default)]
    pub selected_result_ids: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSection {
    pub section_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub generated_content: GeneratedContent,

    #[serde(default)]
    pub search_results: SectionSearchResults,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompletedSection {
    /// Section entry pointing at an output file
    pub fn for_file(section_name: impl Into<String>, content_file: impl Into<String>) -> Self {
        Self {
            section_name: section_name.into(),
            completed_at: Some(Utc::now()),
            generated_content: GeneratedContent {
                content_file: Some(content_file.into()),
                ..GeneratedContent::default()
            },
            search_results: SectionSearchResults::default(),
            extra: Map::new(),
        }
    }

    pub fn content_file(&self) -> Option<&str> {
        self.generated_content.content_file.as_deref()
    }
}

/// A resolved retrieval selection kept for the content collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchHistoryEntry {
    pub decision_id: String,

    #[serde(rename = "type")]
    pub entry_type: String,

    #[serde(default)]
    pub term: Option<String>,

    #[serde(default)]
    pub alpha: Option<f64>,

    #[serde(default)]
    pub selected_indices: Vec<usize>,

    #[serde(default)]
    pub selected_result_ids: Vec<Value>,

    #[serde(default)]
    pub selected_items: Vec<Value>,

    #[serde(default)]
    pub count: usize,

    pub decided_at: DateTime<Utc>,

    #[serde(default)]
    pub strategy: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// State of one chapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterState {
    pub chapter_id: String,

    pub status: ChapterStatus,

    #[serde(default)]
    pub pending_decisions: Vec<PendingDecision>,

    #[serde(default)]
    pub completed_decisions: Vec<CompletedDecision>,

    #[serde(default)]
    pub completed_sections: Vec<CompletedSection>,

    #[serde(default)]
    pub search_history: Vec<SearchHistoryEntry>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChapterState {
    /// Lazily created chapter, as written on the first decision or section
    pub fn new(chapter_id: impl Into<String>) -> Self {
        Self {
            chapter_id: chapter_id.into(),
            status: ChapterStatus::InProgress,
            pending_decisions: Vec::new(),
            completed_decisions: Vec::new(),
            completed_sections: Vec::new(),
            search_history: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ChapterStatus::Completed
    }

    /// Every decision id held by this chapter, pending first
    pub fn decision_ids(&self) -> impl Iterator<Item = &str> {
        self.pending_decisions
            .iter()
            .map(|d| d.decision_id.as_str())
            .chain(self.completed_decisions.iter().map(|d| d.decision_id.as_str()))
    }

    /// Referenced output files, in section order
    pub fn referenced_files(&self) -> Vec<&str> {
        self.completed_sections
            .iter()
            .filter_map(|s| s.content_file())
            .collect()
    }

    pub fn latest_selection(&self) -> Option<&SearchHistoryEntry> {
        self.search_history.last()
    }
}
