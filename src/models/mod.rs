pub mod chapter;
pub mod checkpoint;
pub mod generation;
pub mod validation;

pub use chapter::{
    ChapterState, ChapterStatus, CompletedDecision, CompletedSection, GeneratedContent,
    PendingDecision, SearchHistoryEntry, SectionSearchResults,
};
pub use checkpoint::{
    Checkpoint, CheckpointMetadata, CheckpointSummary, CheckpointType, ResumeInstructions,
    StateSnapshot,
};
pub use generation::{CurrentPhase, GenerationState, GenerationStatus, GlobalSettings, UserPreferences};
pub use validation::ValidationReport;
