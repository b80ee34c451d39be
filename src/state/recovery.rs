//! RecoveryEngine - picks how to get back to a usable state
//!
//! Strategies are tried in order: keep the live state, restore the latest
//! checkpoint, initialize from scratch.

use super::checkpoint::CheckpointManager;
use super::error::{Loaded, StateResult};
use super::fs::remove_if_exists;
use super::store::{InitOptions, StateStore};
use crate::models::GenerationState;
use crate::validator::consistency::{ConsistencyReport, ConsistencyValidator};
use crate::validator::schema::SchemaValidator;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryStrategy {
    /// The live state was readable and kept
    StateOk,
    /// The latest checkpoint was restored
    Checkpoint,
    /// A new generation was initialized
    FreshInit,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub strategy: RecoveryStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
    pub generation_id: String,
    /// The live state only became readable after schema repair
    pub schema_repaired: bool,
    /// Consistency pass run on an accepted live state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency: Option<ConsistencyReport>,
}

pub struct RecoveryEngine {
    store: Arc<StateStore>,
    checkpoints: Arc<CheckpointManager>,
    consistency: ConsistencyValidator,
    schema: SchemaValidator,
}

impl RecoveryEngine {
    pub fn new(
        store: Arc<StateStore>,
        checkpoints: Arc<CheckpointManager>,
        consistency: ConsistencyValidator,
        schema: SchemaValidator,
    ) -> Self {
        Self {
            store,
            checkpoints,
            consistency,
            schema,
        }
    }

    /// Bring the state tree back to a usable state
    ///
    /// A malformed live state first goes through schema repair and is kept if
    /// it then parses. With `fix`, an accepted live state is also run through
    /// the consistency repairs. Only a failure to write a fresh state is an
    /// error.
    pub async fn recover(&self, fix: bool) -> StateResult<RecoveryReport> {
        let mut schema_repaired = false;
        let loaded = match self.store.load().await {
            Loaded::Malformed(reason) => {
                tracing::warn!(reason = %reason, "recovery: live state is malformed");
                let reloaded = self.repair_schema().await;
                schema_repaired = matches!(reloaded, Loaded::Present(_));
                reloaded
            }
            loaded => loaded,
        };

        match loaded {
            Loaded::Present(state) => {
                let consistency = if fix {
                    self.repair_consistency().await
                } else {
                    None
                };
                tracing::info!(
                    generation_id = %state.generation_id,
                    schema_repaired,
                    "recovery: live state accepted"
                );
                return Ok(RecoveryReport {
                    strategy: RecoveryStrategy::StateOk,
                    checkpoint_id: None,
                    generation_id: state.generation_id,
                    schema_repaired,
                    consistency,
                });
            }
            Loaded::Absent => tracing::info!("recovery: no live state"),
            Loaded::Malformed(reason) => {
                tracing::warn!(reason = %reason, "recovery: live state not repairable")
            }
        }

        if let Some(report) = self.try_checkpoint().await {
            return Ok(report);
        }

        let path = self.store.layout().current_state_file();
        if let Err(e) = remove_if_exists(&path).await {
            tracing::warn!(error = %e, "recovery: could not remove live state");
        }
        let state = self.store.initialize(&InitOptions::default()).await?;
        tracing::info!(generation_id = %state.generation_id, "recovery: initialized fresh state");

        Ok(RecoveryReport {
            strategy: RecoveryStrategy::FreshInit,
            checkpoint_id: None,
            generation_id: state.generation_id,
            schema_repaired: false,
            consistency: None,
        })
    }

    /// Inject schema defaults into the state files, then reload the live state
    async fn repair_schema(&self) -> Loaded<GenerationState> {
        match self.schema.validate(true).await {
            Ok(report) if report.details.current.fixed => {
                tracing::info!("recovery: live state repaired with schema defaults")
            }
            Ok(report) => tracing::debug!(
                problems = report.details.current.problems.len(),
                "recovery: schema repair left the live state unchanged"
            ),
            Err(e) => tracing::warn!(error = %e, "recovery: schema repair failed"),
        }
        self.store.load().await
    }

    async fn repair_consistency(&self) -> Option<ConsistencyReport> {
        match self.consistency.validate(true).await {
            Ok(report) => {
                if report.has_problems() {
                    tracing::info!(
                        problems = report.problems.len(),
                        "recovery: consistency repairs applied"
                    );
                }
                Some(report)
            }
            Err(e) => {
                tracing::warn!(error = %e, "recovery: consistency repair failed");
                None
            }
        }
    }

    async fn try_checkpoint(&self) -> Option<RecoveryReport> {
        let latest = match self.checkpoints.latest().await {
            Ok(Some(latest)) => latest,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "recovery: could not list checkpoints");
                return None;
            }
        };

        match self.checkpoints.restore(&latest.checkpoint_id).await {
            Ok(state) => {
                tracing::info!(
                    checkpoint_id = %latest.checkpoint_id,
                    "recovery: restored latest checkpoint"
                );
                Some(RecoveryReport {
                    strategy: RecoveryStrategy::Checkpoint,
                    checkpoint_id: Some(latest.checkpoint_id),
                    generation_id: state.generation_id,
                    schema_repaired: false,
                    consistency: None,
                })
            }
            Err(e) => {
                tracing::warn!(
                    checkpoint_id = %latest.checkpoint_id,
                    error = %e,
                    "recovery: checkpoint restore failed"
                );
                None
            }
        }
    }
}
