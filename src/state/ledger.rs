//! ChapterLedger - decision and section mutators
//!
//! These are the write primitives shared with the content-generation
//! collaborator: pending decisions are recorded and resolved here, and
//! generated sections are appended through [`ChapterLedger::complete_section`].

use super::chapters::ChapterStore;
use super::error::{StateError, StateResult};
use super::store::StateStore;
use crate::models::chapter::SELECTION_DECISION_TYPES;
use crate::models::{
    ChapterState, ChapterStatus, CompletedDecision, CompletedSection, GenerationState,
    PendingDecision, SearchHistoryEntry,
};
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;

/// A decision to record; the id is generated when not supplied
#[derive(Debug, Clone)]
pub struct NewDecision {
    pub decision_id: Option<String>,
    pub decision_type: String,
    pub context: Value,
}

impl NewDecision {
    pub fn new(decision_type: impl Into<String>, context: Value) -> Self {
        Self {
            decision_id: None,
            decision_type: decision_type.into(),
            context,
        }
    }

    pub fn with_id(mut self, decision_id: impl Into<String>) -> Self {
        self.decision_id = Some(decision_id.into());
        self
    }
}

/// A pending decision together with its chapter
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEntry {
    pub chapter_id: String,
    #[serde(flatten)]
    pub decision: PendingDecision,
}

pub struct ChapterLedger {
    store: Arc<StateStore>,
    chapters: ChapterStore,
}

impl ChapterLedger {
    pub fn new(store: Arc<StateStore>, chapters: ChapterStore) -> Self {
        Self { store, chapters }
    }

    /// Record a pending decision, creating the chapter state if needed
    pub async fn add_pending_decision(
        &self,
        chapter_id: &str,
        decision: NewDecision,
    ) -> StateResult<PendingDecision> {
        let decision_id = match decision.decision_id {
            Some(id) => {
                self.ensure_unused(&id).await?;
                id
            }
            None => format!("decision_{}", uuid::Uuid::new_v4().simple()),
        };

        let mut chapter = self.chapters.load_or_new(chapter_id).await;
        let pending = PendingDecision {
            decision_id,
            decision_type: decision.decision_type,
            context: decision.context,
            extra: Map::new(),
        };
        chapter.pending_decisions.push(pending.clone());
        self.chapters.save(&chapter).await?;

        tracing::info!(
            chapter_id,
            decision_id = %pending.decision_id,
            decision_type = %pending.decision_type,
            "pending decision added"
        );
        Ok(pending)
    }

    /// All pending decisions across chapters, in chapter order
    pub async fn pending_decisions(&self) -> StateResult<Vec<PendingEntry>> {
        let scan = self.chapters.scan().await?;
        Ok(scan
            .states
            .into_values()
            .flat_map(|chapter| {
                let chapter_id = chapter.chapter_id;
                chapter
                    .pending_decisions
                    .into_iter()
                    .map(move |decision| PendingEntry {
                        chapter_id: chapter_id.clone(),
                        decision,
                    })
            })
            .collect())
    }

    /// Move a pending decision to the completed list
    ///
    /// Retrieval selections also append a search-history entry built from the
    /// selected indices into the decision's result list.
    pub async fn resolve_decision(
        &self,
        chapter_id: &str,
        decision_id: &str,
        resolution: Value,
    ) -> StateResult<ChapterState> {
        let mut chapter = self
            .chapters
            .load(chapter_id)
            .await
            .present()
            .ok_or_else(|| StateError::ChapterNotFound(chapter_id.to_string()))?;

        let position = chapter
            .pending_decisions
            .iter()
            .position(|d| d.decision_id == decision_id)
            .ok_or_else(|| StateError::DecisionNotFound {
                chapter_id: chapter_id.to_string(),
                decision_id: decision_id.to_string(),
            })?;
        let target = chapter.pending_decisions.remove(position);

        if SELECTION_DECISION_TYPES.contains(&target.decision_type.as_str()) {
            chapter
                .search_history
                .push(selection_entry(&target, &resolution));
        }

        chapter.completed_decisions.push(CompletedDecision {
            decision_id: decision_id.to_string(),
            resolution,
            resolved_at: Some(Utc::now()),
            extra: Map::new(),
        });
        self.chapters.save(&chapter).await?;
        self.store.record_interaction().await;

        tracing::info!(chapter_id, decision_id, "decision resolved");
        Ok(chapter)
    }

    /// Append a generated section to a chapter
    pub async fn complete_section(
        &self,
        chapter_id: &str,
        section: CompletedSection,
    ) -> StateResult<ChapterState> {
        let mut chapter = self.chapters.load_or_new(chapter_id).await;
        chapter.completed_sections.push(section);
        self.chapters.save(&chapter).await?;
        Ok(chapter)
    }

    /// Mark a chapter COMPLETED and record it in the global state
    pub async fn complete_chapter(
        &self,
        chapter_id: &str,
    ) -> StateResult<(ChapterState, GenerationState)> {
        let mut generation = self.store.require().await?;
        let mut chapter = self.chapters.load_or_new(chapter_id).await;

        chapter.status = ChapterStatus::Completed;
        self.chapters.save(&chapter).await?;

        generation.mark_chapter_completed(chapter_id);
        if generation.current_phase.chapter_id.as_deref() == Some(chapter_id) {
            generation.current_phase.chapter_id = None;
        }
        self.store.save(&mut generation).await?;

        Ok((chapter, generation))
    }

    /// Most recent resolved retrieval selection of a chapter
    pub async fn latest_selection(&self, chapter_id: &str) -> Option<SearchHistoryEntry> {
        self.chapters
            .load(chapter_id)
            .await
            .present()
            .and_then(|chapter| chapter.latest_selection().cloned())
    }

    async fn ensure_unused(&self, decision_id: &str) -> StateResult<()> {
        let scan = self.chapters.scan().await?;
        for chapter in scan.states.values() {
            if chapter.decision_ids().any(|id| id == decision_id) {
                return Err(StateError::DuplicateDecision {
                    decision_id: decision_id.to_string(),
                    chapter_id: chapter.chapter_id.clone(),
                });
            }
        }
        Ok(())
    }
}

fn selection_entry(target: &PendingDecision, resolution: &Value) -> SearchHistoryEntry {
    let results = target.context.get("results");
    let items: &[Value] = match results {
        Some(Value::Array(items)) => items,
        Some(Value::Object(obj)) => match obj.get("points") {
            Some(Value::Array(points)) => points,
            _ => &[],
        },
        _ => &[],
    };

    let selected_indices: Vec<usize> = resolution
        .get("selected")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_u64)
                .map(|i| i as usize)
                .collect()
        })
        .unwrap_or_default();

    let selected_items: Vec<Value> = selected_indices
        .iter()
        .filter_map(|&i| items.get(i).cloned())
        .collect();
    let selected_result_ids: Vec<Value> = selected_items
        .iter()
        .filter_map(|item| item.get("id").cloned())
        .collect();

    let strategy = if target.decision_type == "EMBEDDED_SEARCH_SELECTION" {
        "embed+filter"
    } else {
        "filter"
    };

    SearchHistoryEntry {
        decision_id: target.decision_id.clone(),
        entry_type: target.decision_type.clone(),
        term: target
            .context
            .get("term")
            .and_then(Value::as_str)
            .map(str::to_string),
        alpha: target.context.get("alpha").and_then(Value::as_f64),
        selected_indices,
        count: selected_items.len(),
        selected_result_ids,
        selected_items,
        decided_at: Utc::now(),
        strategy: strategy.to_string(),
        extra: Map::new(),
    }
}
