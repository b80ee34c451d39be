//! Workflow state persistence
//!
//! Handles the on-disk state tree of a generation run:
//! - Global state with atomic writes and autosave
//! - Per-chapter states, decisions and completed sections
//! - Checkpoints with retention, restore and crash recovery

pub mod chapters;
pub mod checkpoint;
pub mod error;
pub mod fs;
pub mod layout;
pub mod ledger;
pub mod recovery;
pub mod store;

pub use chapters::{ChapterScan, ChapterStore, MalformedChapter};
pub use checkpoint::CheckpointManager;
pub use error::{Loaded, StateError, StateResult};
pub use layout::StateLayout;
pub use ledger::{ChapterLedger, NewDecision, PendingEntry};
pub use recovery::{RecoveryEngine, RecoveryReport, RecoveryStrategy};
pub use store::{InitOptions, SaveOutcome, StateStore};
