//! StateContext - one wired-up set of stores, managers and validators

use crate::config::{active_chapters, ChapterDefinition, ChapterSource, StateConfig};
use crate::models::CheckpointType;
use crate::state::{
    ChapterLedger, ChapterStore, CheckpointManager, RecoveryEngine, StateResult, StateStore,
};
use crate::validator::{
    ConsistencyValidator, CoverageValidator, OutputsReconciler, SchemaValidator,
};
use crate::Result;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// Description of the checkpoint taken on shutdown
pub const SHUTDOWN_CHECKPOINT: &str = "Emergency shutdown";

/// How a command run under [`StateContext::run_guarded`] ended
#[derive(Debug)]
pub enum Completion<T> {
    /// The command finished with no shutdown request
    Finished(T),
    /// Shutdown was requested; the command still ran to completion first
    Interrupted {
        result: Result<T>,
        checkpoint_id: Option<String>,
    },
}

pub struct StateContext {
    pub config: StateConfig,
    pub store: Arc<StateStore>,
    pub chapters: ChapterStore,
    pub checkpoints: Arc<CheckpointManager>,
}

impl StateContext {
    pub fn new(config: StateConfig) -> Self {
        let store = Arc::new(StateStore::from_config(&config));
        let chapters = ChapterStore::new(config.layout());
        let checkpoints = Arc::new(CheckpointManager::new(
            Arc::clone(&store),
            chapters.clone(),
            config.checkpoints_to_keep,
        ));
        Self {
            config,
            store,
            chapters,
            checkpoints,
        }
    }

    /// Context for a project root (bookstate.toml plus environment)
    pub fn load(project_root: &Path) -> Result<Self> {
        Ok(Self::new(StateConfig::load(project_root)?))
    }

    pub fn ledger(&self) -> ChapterLedger {
        ChapterLedger::new(Arc::clone(&self.store), self.chapters.clone())
    }

    pub fn consistency(&self) -> ConsistencyValidator {
        ConsistencyValidator::new(Arc::clone(&self.store), self.chapters.clone())
    }

    pub fn outputs(&self) -> OutputsReconciler {
        OutputsReconciler::new(self.chapters.clone(), &self.config.outputs_dir)
    }

    /// Coverage check, with an optional override of the global minimum
    pub fn coverage(&self, min_sections: Option<usize>) -> CoverageValidator {
        CoverageValidator::new(
            &self.config.outputs_dir,
            min_sections.unwrap_or(self.config.min_sections_per_chapter),
        )
    }

    pub fn schema(&self) -> StateResult<SchemaValidator> {
        SchemaValidator::new(
            Arc::clone(&self.store),
            self.chapters.clone(),
            self.config.autosave_ms,
        )
    }

    pub fn recovery(&self) -> StateResult<RecoveryEngine> {
        Ok(RecoveryEngine::new(
            Arc::clone(&self.store),
            Arc::clone(&self.checkpoints),
            self.consistency(),
            self.schema()?,
        ))
    }

    pub fn chapter_structure(&self) -> (ChapterSource, Vec<ChapterDefinition>) {
        active_chapters(&self.config)
    }

    /// Run `command` on its own task, racing it against `shutdown`
    ///
    /// A shutdown request never cancels the command: its writes are allowed to
    /// finish, then [`graceful_shutdown`](Self::graceful_shutdown) runs.
    pub async fn run_guarded<T, F, S>(&self, command: F, shutdown: S) -> Result<Completion<T>>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
        S: Future<Output = ()>,
    {
        let mut task = tokio::spawn(command);

        tokio::select! {
            joined = &mut task => Ok(Completion::Finished(joined??)),
            _ = shutdown => {
                tracing::warn!("shutdown requested, waiting for the running command");
                let result = task.await?;
                let checkpoint_id = self.graceful_shutdown().await;
                Ok(Completion::Interrupted { result, checkpoint_id })
            }
        }
    }

    /// Stop autosave, save once more and take an EMERGENCY checkpoint
    ///
    /// Nothing here fails the shutdown; errors are logged. Returns the id of
    /// the checkpoint taken, if any.
    pub async fn graceful_shutdown(&self) -> Option<String> {
        self.store.stop_autosave().await;

        let Some(mut state) = self.store.current().await else {
            tracing::info!("shutdown: no state to save");
            return None;
        };
        if let Err(e) = self.store.save(&mut state).await {
            tracing::warn!(error = %e, "shutdown: final save failed");
        }

        match self
            .checkpoints
            .create(SHUTDOWN_CHECKPOINT, CheckpointType::Emergency)
            .await
        {
            Ok(checkpoint_id) => {
                tracing::info!(checkpoint_id = %checkpoint_id, "shutdown: emergency checkpoint taken");
                Some(checkpoint_id)
            }
            Err(e) => {
                tracing::warn!(error = %e, "shutdown: emergency checkpoint failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InitOptions;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_graceful_shutdown_takes_emergency_checkpoint() {
        let temp = TempDir::new().unwrap();
        let ctx = StateContext::new(StateConfig::rooted_at(temp.path()));
        ctx.store.initialize(&InitOptions::default()).await.unwrap();
        assert!(ctx.store.autosave_running());

        let checkpoint_id = ctx.graceful_shutdown().await.unwrap();

        assert!(!ctx.store.autosave_running());
        let checkpoint = ctx.checkpoints.get(&checkpoint_id).await.unwrap();
        assert_eq!(checkpoint.checkpoint_type, CheckpointType::Emergency);
        assert_eq!(checkpoint.description, SHUTDOWN_CHECKPOINT);
    }

    #[tokio::test]
    async fn test_graceful_shutdown_without_state() {
        let temp = TempDir::new().unwrap();
        let ctx = StateContext::new(StateConfig::rooted_at(temp.path()));

        assert!(ctx.graceful_shutdown().await.is_none());
        assert!(ctx.checkpoints.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_running_command() {
        let temp = TempDir::new().unwrap();
        let ctx = Arc::new(StateContext::new(StateConfig::rooted_at(temp.path())));
        ctx.store.initialize(&InitOptions::default()).await.unwrap();

        let command = {
            let ctx = Arc::clone(&ctx);
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                Ok(ctx.checkpoints.create("phase done", CheckpointType::PhaseTransition).await?)
            }
        };

        let completion = ctx.run_guarded(command, async {}).await.unwrap();

        let Completion::Interrupted { result, checkpoint_id } = completion else {
            panic!("shutdown should have been observed");
        };
        let command_checkpoint = result.unwrap();
        let emergency = checkpoint_id.unwrap();
        assert_eq!(
            ctx.checkpoints.list().await.unwrap(),
            vec![command_checkpoint.clone(), emergency.clone()]
        );
        let state = ctx.store.current().await.unwrap();
        assert_eq!(state.current_phase.last_checkpoint, Some(emergency));
        assert!(!ctx.store.autosave_running());
    }

    #[tokio::test]
    async fn test_finished_command_without_shutdown() {
        let temp = TempDir::new().unwrap();
        let ctx = StateContext::new(StateConfig::rooted_at(temp.path()));

        let completion = ctx
            .run_guarded(async { Ok(7) }, std::future::pending::<()>())
            .await
            .unwrap();
        assert!(matches!(completion, Completion::Finished(7)));
    }
}
