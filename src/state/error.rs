use std::path::PathBuf;

/// Result type for state engine operations
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised by the state engine
///
/// Absence of a file is never an error here; see [`Loaded`].
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("No generation state initialized")]
    NotInitialized,

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Chapter state not found: {0}")]
    ChapterNotFound(String),

    #[error("Decision {decision_id} not pending in chapter {chapter_id}")]
    DecisionNotFound {
        chapter_id: String,
        decision_id: String,
    },

    #[error("Invalid schema {name}: {reason}")]
    Schema { name: &'static str, reason: String },

    #[error("Decision id {decision_id} already used by chapter {chapter_id}")]
    DuplicateDecision {
        decision_id: String,
        chapter_id: String,
    },
}

impl StateError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Outcome of reading a JSON document that may legitimately be missing
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded<T> {
    /// Parsed and schema-valid
    Present(T),
    /// Missing or empty file
    Absent,
    /// Unparsable or violating the schema
    Malformed(String),
}

impl<T> Loaded<T> {
    /// Collapse to an option, treating malformed content as absent
    pub fn present(self) -> Option<T> {
        match self {
            Loaded::Present(value) => Some(value),
            Loaded::Absent | Loaded::Malformed(_) => None,
        }
    }
}
