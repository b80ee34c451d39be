//! CheckpointManager - immutable snapshots of the state graph
//!
//! A checkpoint captures the global state, every parseable chapter state and
//! the cached retrieval queries. Ids embed the creation time in milliseconds,
//! zero-padded so that lexicographic order is creation order.

use super::chapters::ChapterStore;
use super::error::{Loaded, StateError, StateResult};
use super::fs::{list_json_stems, read_json, remove_if_exists, write_json_atomic};
use super::layout::StateLayout;
use super::store::{SaveOutcome, StateStore};
use crate::models::checkpoint::{format_checkpoint_id, parse_checkpoint_millis};
use crate::models::{
    Checkpoint, CheckpointMetadata, CheckpointSummary, CheckpointType, GenerationState,
    ResumeInstructions, StateSnapshot,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Retention never drops below this, so the newest checkpoint always survives
pub const MIN_CHECKPOINTS_KEPT: usize = 1;

pub struct CheckpointManager {
    layout: StateLayout,
    store: Arc<StateStore>,
    chapters: ChapterStore,
    keep: usize,
}

impl CheckpointManager {
    pub fn new(store: Arc<StateStore>, chapters: ChapterStore, keep: usize) -> Self {
        Self {
            layout: store.layout().clone(),
            store,
            chapters,
            keep: keep.max(MIN_CHECKPOINTS_KEPT),
        }
    }

    /// Number of checkpoints retained after each `create`
    pub fn keep(&self) -> usize {
        self.keep
    }

    /// Snapshot the current state and return the new checkpoint id
    pub async fn create(
        &self,
        description: &str,
        checkpoint_type: CheckpointType,
    ) -> StateResult<String> {
        let mut generation = self.store.require().await?;

        let scan = self.chapters.scan().await?;
        for malformed in &scan.malformed {
            tracing::warn!(
                file_id = %malformed.file_id,
                reason = %malformed.reason,
                "skipping malformed chapter state in checkpoint"
            );
        }

        let checkpoint_id = self.next_id().await?;
        let checkpoint = Checkpoint {
            checkpoint_id: checkpoint_id.clone(),
            created_at: Utc::now(),
            checkpoint_type,
            description: description.to_string(),
            resume_instructions: ResumeInstructions {
                next_phase: generation.current_phase.phase.clone(),
            },
            metadata: CheckpointMetadata {
                completed_chapters: generation.completed_chapters.len(),
            },
            state_snapshot: StateSnapshot {
                current_generation: generation.clone(),
                chapter_states: scan.by_chapter_id(),
                search_cache: self.query_cache().await?,
            },
        };

        write_json_atomic(&self.layout.checkpoint_file(&checkpoint_id), &checkpoint).await?;

        generation.current_phase.last_checkpoint = Some(checkpoint_id.clone());
        if self.store.save(&mut generation).await? == SaveOutcome::Skipped {
            tracing::warn!(checkpoint_id = %checkpoint_id, "lastCheckpoint not recorded, save in flight");
        }

        tracing::info!(
            checkpoint_id = %checkpoint_id,
            checkpoint_type = checkpoint_type.name(),
            chapters = checkpoint.state_snapshot.chapter_states.len(),
            "checkpoint created"
        );

        self.cleanup(self.keep).await;
        Ok(checkpoint_id)
    }

    /// Checkpoint ids, oldest first
    pub async fn list(&self) -> StateResult<Vec<String>> {
        list_json_stems(&self.layout.checkpoints_dir()).await
    }

    pub async fn get(&self, checkpoint_id: &str) -> StateResult<Checkpoint> {
        let path = self.layout.checkpoint_file(checkpoint_id);
        match read_json::<Checkpoint>(&path).await {
            Loaded::Present(checkpoint) => Ok(checkpoint),
            Loaded::Absent => Err(StateError::CheckpointNotFound(checkpoint_id.to_string())),
            Loaded::Malformed(reason) => Err(StateError::Malformed { path, reason }),
        }
    }

    /// Listing of every checkpoint; unreadable ones carry only their id
    pub async fn summaries(&self) -> StateResult<Vec<CheckpointSummary>> {
        let mut summaries = Vec::new();
        for checkpoint_id in self.list().await? {
            let summary = match self.get(&checkpoint_id).await {
                Ok(checkpoint) => checkpoint.summary(),
                Err(e) => {
                    tracing::debug!(checkpoint_id = %checkpoint_id, error = %e, "unreadable checkpoint");
                    CheckpointSummary {
                        checkpoint_id,
                        created_at: None,
                        checkpoint_type: None,
                        description: None,
                    }
                }
            };
            summaries.push(summary);
        }
        Ok(summaries)
    }

    pub async fn latest(&self) -> StateResult<Option<CheckpointSummary>> {
        Ok(self.summaries().await?.pop())
    }

    /// Overwrite the live global state with a checkpoint's snapshot
    ///
    /// Chapter states are left as they are on disk.
    pub async fn restore(&self, checkpoint_id: &str) -> StateResult<GenerationState> {
        let checkpoint = self.get(checkpoint_id).await?;
        let generation = checkpoint.state_snapshot.current_generation;
        self.store.replace(&generation).await?;

        tracing::info!(
            checkpoint_id,
            generation_id = %generation.generation_id,
            "restored from checkpoint"
        );
        Ok(generation)
    }

    /// Delete all but the `keep` newest checkpoints; returns how many went
    ///
    /// Deletion failures are logged and skipped.
    pub async fn cleanup(&self, keep: usize) -> usize {
        let ids = match self.list().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "checkpoint retention could not list checkpoints");
                return 0;
            }
        };
        if ids.len() <= keep {
            return 0;
        }

        let excess = ids.len() - keep;
        let mut removed = 0;
        for checkpoint_id in &ids[..excess] {
            match remove_if_exists(&self.layout.checkpoint_file(checkpoint_id)).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(checkpoint_id = %checkpoint_id, error = %e, "failed to delete checkpoint")
                }
            }
        }

        if removed > 0 {
            tracing::debug!(removed, keep, "old checkpoints removed");
        }
        removed
    }

    /// An id newer than every existing one, even within one millisecond
    async fn next_id(&self) -> StateResult<String> {
        let now = Utc::now().timestamp_millis();
        let last = self
            .list()
            .await?
            .iter()
            .filter_map(|id| parse_checkpoint_millis(id))
            .max();

        let millis = match last {
            Some(last) if last >= now => last + 1,
            _ => now,
        };
        Ok(format_checkpoint_id(millis))
    }

    async fn query_cache(&self) -> StateResult<BTreeMap<String, Value>> {
        let dir = self.layout.query_cache_dir();
        let mut cache = BTreeMap::new();
        for hash in list_json_stems(&dir).await? {
            match read_json::<Value>(&dir.join(format!("{}.json", hash))).await {
                Loaded::Present(value) => {
                    cache.insert(hash, value);
                }
                Loaded::Absent => {}
                Loaded::Malformed(reason) => {
                    tracing::debug!(hash = %hash, reason = %reason, "skipping unreadable cache entry")
                }
            }
        }
        Ok(cache)
    }
}
