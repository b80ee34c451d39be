//! StateStore - atomic load/save of `current-generation.json`
//!
//! The store is the only writer of the global state file. It also owns the
//! autosave timer, an explicit lifecycle object started by `initialize` and
//! stopped with `stop_autosave`.

use super::error::{Loaded, StateError, StateResult};
use super::fs::{ensure_dirs, read_json, write_json_atomic};
use super::layout::StateLayout;
use crate::config::{StateConfig, MIN_AUTOSAVE_MS};
use crate::models::{GenerationState, GlobalSettings};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Poll interval while a verbatim write waits for an in-flight save
const SAVE_WAIT_MS: u64 = 5;

/// Result of a save request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The state was written
    Saved,
    /// Another save was in flight; nothing was written
    Skipped,
}

/// Run options recorded in the global settings of a new generation
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub interactive: bool,
    pub detail_level: Option<String>,
    pub max_iterations_per_section: Option<u32>,
}

/// Store for the single global generation state
pub struct StateStore {
    inner: Arc<StoreInner>,
    autosave: Mutex<Option<Autosave>>,
}

struct StoreInner {
    layout: StateLayout,
    autosave_ms: u64,
    saving: AtomicBool,
}

/// Resets the in-flight flag when a save finishes, whatever the outcome
struct SaveGuard<'a>(&'a AtomicBool);

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl StoreInner {
    fn begin_save(&self) -> Option<SaveGuard<'_>> {
        self.saving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SaveGuard(&self.saving))
    }

    /// Wait until no save is in flight, then hold the guard
    async fn acquire_save(&self) -> SaveGuard<'_> {
        loop {
            if let Some(guard) = self.begin_save() {
                return guard;
            }
            tokio::time::sleep(Duration::from_millis(SAVE_WAIT_MS)).await;
        }
    }

    async fn load(&self) -> Loaded<GenerationState> {
        read_json(&self.layout.current_state_file()).await
    }

    async fn save(&self, state: &mut GenerationState) -> StateResult<SaveOutcome> {
        let Some(_guard) = self.begin_save() else {
            tracing::debug!("save already in flight, skipping");
            return Ok(SaveOutcome::Skipped);
        };

        state.last_update = Some(Utc::now());
        write_json_atomic(&self.layout.current_state_file(), state).await?;
        tracing::debug!(
            phase = %state.current_phase.phase,
            status = state.status.name(),
            "state saved"
        );
        Ok(SaveOutcome::Saved)
    }

    /// Reload the live state and write it back with a fresh timestamp
    async fn touch(&self) -> StateResult<SaveOutcome> {
        let Some(_guard) = self.begin_save() else {
            return Ok(SaveOutcome::Skipped);
        };

        let path = self.layout.current_state_file();
        let mut state = match self.load().await {
            Loaded::Present(state) => state,
            Loaded::Absent => return Err(StateError::NotInitialized),
            Loaded::Malformed(reason) => return Err(StateError::Malformed { path, reason }),
        };

        state.last_update = Some(Utc::now());
        write_json_atomic(&path, &state).await?;
        Ok(SaveOutcome::Saved)
    }
}

impl StateStore {
    pub fn new(layout: StateLayout, autosave_ms: u64) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                layout,
                autosave_ms,
                saving: AtomicBool::new(false),
            }),
            autosave: Mutex::new(None),
        }
    }

    pub fn from_config(config: &StateConfig) -> Self {
        Self::new(config.layout(), config.autosave_ms)
    }

    pub fn layout(&self) -> &StateLayout {
        &self.inner.layout
    }

    /// Create the state tree, write a fresh generation and start autosave
    pub async fn initialize(&self, options: &InitOptions) -> StateResult<GenerationState> {
        ensure_dirs(&self.inner.layout.directories()).await?;

        let mut settings = GlobalSettings::new(self.inner.autosave_ms);
        settings.interactive_mode = options.interactive;
        if let Some(level) = &options.detail_level {
            settings.detail_level = level.clone();
        }
        if let Some(max) = options.max_iterations_per_section {
            settings.max_iterations_per_section = max;
        }

        let state = GenerationState::new(settings);
        self.replace(&state).await?;
        self.start_autosave();

        tracing::info!(generation_id = %state.generation_id, "state initialized");
        Ok(state)
    }

    /// Read the live state; absence and corruption are reported, not raised
    pub async fn load(&self) -> Loaded<GenerationState> {
        self.inner.load().await
    }

    /// Live state if present and well-formed
    pub async fn current(&self) -> Option<GenerationState> {
        self.load().await.present()
    }

    /// Live state, or `NotInitialized`
    pub async fn require(&self) -> StateResult<GenerationState> {
        match self.load().await {
            Loaded::Present(state) => Ok(state),
            Loaded::Absent => Err(StateError::NotInitialized),
            Loaded::Malformed(reason) => Err(StateError::Malformed {
                path: self.inner.layout.current_state_file(),
                reason,
            }),
        }
    }

    /// Persist `state`, refreshing its `lastUpdate`
    ///
    /// A call made while another save is in flight is skipped, not queued.
    pub async fn save(&self, state: &mut GenerationState) -> StateResult<SaveOutcome> {
        self.inner.save(state).await
    }

    /// Overwrite the live state verbatim (restore and repair paths)
    ///
    /// Never skipped: waits for an in-flight save or autosave to finish first.
    pub async fn replace(&self, state: &GenerationState) -> StateResult<()> {
        let _guard = self.inner.acquire_save().await;
        write_json_atomic(&self.inner.layout.current_state_file(), state).await
    }

    /// Overwrite the live state with a raw document (schema repair path)
    pub async fn replace_document(&self, document: &serde_json::Value) -> StateResult<()> {
        let _guard = self.inner.acquire_save().await;
        write_json_atomic(&self.inner.layout.current_state_file(), document).await
    }

    /// Rewrite the live state with a fresh timestamp
    pub async fn touch(&self) -> StateResult<SaveOutcome> {
        self.inner.touch().await
    }

    /// Bump the interaction counter; failures are logged only
    pub async fn record_interaction(&self) {
        let Some(mut state) = self.current().await else {
            return;
        };
        state.statistics.total_user_interactions += 1;
        if let Err(e) = self.save(&mut state).await {
            tracing::warn!(error = %e, "failed to record user interaction");
        }
    }

    // =========================================================================
    // Autosave
    // =========================================================================

    /// Start the autosave timer; no-op when already running
    pub fn start_autosave(&self) {
        let mut slot = self.autosave.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }

        let period = Duration::from_millis(self.inner.autosave_ms.max(MIN_AUTOSAVE_MS));
        *slot = Some(Autosave::start(Arc::clone(&self.inner), period));
        tracing::debug!(period_ms = period.as_millis() as u64, "autosave started");
    }

    /// Cancel the autosave timer and wait for a tick in progress to finish
    pub async fn stop_autosave(&self) {
        let autosave = self
            .autosave
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(autosave) = autosave {
            autosave.stop().await;
            tracing::debug!("autosave stopped");
        }
    }

    pub fn autosave_running(&self) -> bool {
        self.autosave
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

/// Background autosave timer owned by one store
struct Autosave {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Autosave {
    fn start(inner: Arc<StoreInner>, period: Duration) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => match inner.touch().await {
                        Ok(SaveOutcome::Saved) => tracing::debug!("autosave wrote state"),
                        Ok(SaveOutcome::Skipped) => tracing::debug!("autosave skipped, save in flight"),
                        Err(StateError::NotInitialized) => {
                            tracing::debug!("autosave found no state to save")
                        }
                        Err(e) => tracing::warn!(error = %e, "autosave failed"),
                    },
                }
            }
        });

        Self {
            token,
            handle: Some(handle),
        }
    }

    async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "autosave task ended abnormally");
            }
        }
    }
}

impl Drop for Autosave {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
