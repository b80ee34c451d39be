//! Global generation state (`current-generation.json`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Phase tag written by a freshly initialized generation
pub const INITIAL_PHASE: &str = "INITIALIZATION";

/// Schema version stamped into new generation states
pub const STATE_VERSION: &str = "1.0.0";

/// Lifecycle status of a whole generation run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStatus {
    Initialized,
    InProgress,
    Paused,
    Completed,
    Error,
}

impl GenerationStatus {
    pub fn name(&self) -> &'static str {
        match self {
            GenerationStatus::Initialized => "INITIALIZED",
            GenerationStatus::InProgress => "IN_PROGRESS",
            GenerationStatus::Paused => "PAUSED",
            GenerationStatus::Completed => "COMPLETED",
            GenerationStatus::Error => "ERROR",
        }
    }
}

/// Where the workflow currently is
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPhase {
    /// Free-form phase tag (e.g. "INITIALIZATION", "GENERATION")
    pub phase: String,

    /// Chapter being worked on, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_index: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_count: Option<u32>,

    /// Whether the phase may be interrupted safely
    #[serde(default = "default_true")]
    pub interruptible: bool,

    /// Id of the most recent checkpoint taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint: Option<String>,

    /// Collaborator-owned fields preserved on round-trip
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CurrentPhase {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            chapter_id: None,
            section_index: None,
            iteration_count: None,
            interruptible: true,
            last_checkpoint: None,
            extra: Map::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Run-wide settings fixed at initialization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default)]
    pub interactive_mode: bool,

    #[serde(default = "default_detail_level")]
    pub detail_level: String,

    #[serde(default = "default_max_iterations")]
    pub max_iterations_per_section: u32,

    /// Autosave period in milliseconds
    pub auto_save_interval: u64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_detail_level() -> String {
    "standard".to_string()
}

fn default_max_iterations() -> u32 {
    4
}

impl GlobalSettings {
    pub fn new(auto_save_interval: u64) -> Self {
        Self {
            interactive_mode: false,
            detail_level: default_detail_level(),
            max_iterations_per_section: default_max_iterations(),
            auto_save_interval,
            extra: Map::new(),
        }
    }
}

/// Retrieval tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchStrategy {
    /// Weight between unfiltered and filtered retrieval
    pub alpha: f64,
    #[serde(default)]
    pub priority_chunk_types: Vec<String>,
    #[serde(default)]
    pub adaptive_keywords: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Content tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentPreferences {
    #[serde(default = "default_medium")]
    pub example_density: String,
    #[serde(default = "default_medium")]
    pub technical_detail: String,
    #[serde(default = "default_reference_style")]
    pub cross_reference_style: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_medium() -> String {
    "medium".to_string()
}

fn default_reference_style() -> String {
    "inline".to_string()
}

impl Default for ContentPreferences {
    fn default() -> Self {
        Self {
            example_density: default_medium(),
            technical_detail: default_medium(),
            cross_reference_style: default_reference_style(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub search_strategy: SearchStrategy,
    #[serde(default)]
    pub content_preferences: ContentPreferences,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            search_strategy: SearchStrategy {
                alpha: 0.7,
                priority_chunk_types: vec![
                    "pseudocode_flow".to_string(),
                    "pseudocode_validations_rules".to_string(),
                ],
                adaptive_keywords: Vec::new(),
                extra: Map::new(),
            },
            content_preferences: ContentPreferences::default(),
            extra: Map::new(),
        }
    }
}

/// Run counters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    #[serde(default)]
    pub total_search_queries: u64,
    #[serde(default)]
    pub total_user_interactions: u64,
    #[serde(default)]
    pub average_section_time: f64,
    #[serde(default)]
    pub cache_hit_ratio: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The single global workflow state of one generation run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationState {
    pub generation_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,

    #[serde(default = "default_version")]
    pub version: String,

    pub status: GenerationStatus,

    pub current_phase: CurrentPhase,

    /// Ordered set of completed chapter ids
    pub completed_chapters: Vec<String>,

    pub global_settings: GlobalSettings,

    pub user_preferences: UserPreferences,

    #[serde(default)]
    pub statistics: Statistics,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_version() -> String {
    STATE_VERSION.to_string()
}

impl GenerationState {
    /// Build a fresh state for a new run
    pub fn new(settings: GlobalSettings) -> Self {
        let now = Utc::now();
        Self {
            generation_id: format!("gen_{}", now.timestamp_millis()),
            start_time: Some(now),
            last_update: Some(now),
            version: default_version(),
            status: GenerationStatus::Initialized,
            current_phase: CurrentPhase::new(INITIAL_PHASE),
            completed_chapters: Vec::new(),
            global_settings: settings,
            user_preferences: UserPreferences::default(),
            statistics: Statistics::default(),
            extra: Map::new(),
        }
    }

    pub fn is_chapter_completed(&self, chapter_id: &str) -> bool {
        self.completed_chapters.iter().any(|c| c == chapter_id)
    }

    /// Append to completedChapters, keeping set semantics. Returns true if added.
    pub fn mark_chapter_completed(&mut self, chapter_id: &str) -> bool {
        if self.is_chapter_completed(chapter_id) {
            return false;
        }
        self.completed_chapters.push(chapter_id.to_string());
        true
    }

    /// Remove every occurrence of a chapter id. Returns true if anything was removed.
    pub fn unmark_chapter_completed(&mut self, chapter_id: &str) -> bool {
        let before = self.completed_chapters.len();
        self.completed_chapters.retain(|c| c != chapter_id);
        before != self.completed_chapters.len()
    }
}
