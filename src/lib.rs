// Bookstate - resumable state engine for long-running generation workflows
// Persists progress, checkpoints and recovers it, and validates it on disk

pub mod cli;
pub mod config;
pub mod context;
pub mod logging;
pub mod models;
pub mod state;
pub mod validator;

pub use anyhow::{Context, Result};
pub use colored::Colorize;

// Re-export commonly used types
pub use config::StateConfig;
pub use context::StateContext;
pub use models::{ChapterState, Checkpoint, CheckpointType, GenerationState};
pub use state::{StateError, StateResult, StateStore};
