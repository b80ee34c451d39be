//! Checkpoint snapshot records (`checkpoints/<checkpointId>.json`)

use super::{ChapterState, GenerationState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Prefix of every checkpoint id
pub const CHECKPOINT_PREFIX: &str = "cp_";

/// Why a checkpoint was taken
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckpointType {
    Manual,
    Auto,
    PhaseTransition,
    Emergency,
    Error,
}

impl CheckpointType {
    pub fn name(&self) -> &'static str {
        match self {
            CheckpointType::Manual => "MANUAL",
            CheckpointType::Auto => "AUTO",
            CheckpointType::PhaseTransition => "PHASE_TRANSITION",
            CheckpointType::Emergency => "EMERGENCY",
            CheckpointType::Error => "ERROR",
        }
    }
}

impl FromStr for CheckpointType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "MANUAL" => Ok(CheckpointType::Manual),
            "AUTO" => Ok(CheckpointType::Auto),
            "PHASE_TRANSITION" => Ok(CheckpointType::PhaseTransition),
            "EMERGENCY" => Ok(CheckpointType::Emergency),
            "ERROR" => Ok(CheckpointType::Error),
            other => Err(format!("unknown checkpoint type: {}", other)),
        }
    }
}

/// Full copy of the state graph at checkpoint time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub current_generation: GenerationState,

    #[serde(default)]
    pub chapter_states: BTreeMap<String, ChapterState>,

    /// Cached retrieval query results keyed by cache hash
    #[serde(default)]
    pub search_cache: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResumeInstructions {
    pub next_phase: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMetadata {
    #[serde(default)]
    pub completed_chapters: usize,
}

/// An immutable checkpoint record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub checkpoint_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub checkpoint_type: CheckpointType,
    pub description: String,
    pub state_snapshot: StateSnapshot,
    pub resume_instructions: ResumeInstructions,
    #[serde(default)]
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            checkpoint_id: self.checkpoint_id.clone(),
            created_at: Some(self.created_at),
            checkpoint_type: Some(self.checkpoint_type),
            description: Some(self.description.clone()),
        }
    }
}

/// Listing entry for a checkpoint; fields are absent when the file is unreadable
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSummary {
    pub checkpoint_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub checkpoint_type: Option<CheckpointType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Format a checkpoint id from a millisecond timestamp.
///
/// Zero-padded so that lexicographic order equals creation order.
pub fn format_checkpoint_id(millis: i64) -> String {
    format!("{}{:013}", CHECKPOINT_PREFIX, millis)
}

/// Millisecond component of a checkpoint id, if it has the expected shape
pub fn parse_checkpoint_millis(checkpoint_id: &str) -> Option<i64> {
    checkpoint_id
        .strip_prefix(CHECKPOINT_PREFIX)
        .and_then(|rest| rest.parse::<i64>().ok())
}
