use std::path::{Path, PathBuf};

const CURRENT_STATE_FILE: &str = "current-generation.json";
const CHAPTER_STATES_DIR: &str = "chapter-states";
const CHECKPOINTS_DIR: &str = "checkpoints";
const SEARCH_CACHE_DIR: &str = "search-cache";

/// Paths of the on-disk state tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current_state_file(&self) -> PathBuf {
        self.root.join(CURRENT_STATE_FILE)
    }

    pub fn chapter_states_dir(&self) -> PathBuf {
        self.root.join(CHAPTER_STATES_DIR)
    }

    pub fn chapter_state_file(&self, chapter_id: &str) -> PathBuf {
        self.chapter_states_dir().join(format!("{}.json", chapter_id))
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.root.join(CHECKPOINTS_DIR)
    }

    pub fn checkpoint_file(&self, checkpoint_id: &str) -> PathBuf {
        self.checkpoints_dir().join(format!("{}.json", checkpoint_id))
    }

    pub fn search_cache_dir(&self) -> PathBuf {
        self.root.join(SEARCH_CACHE_DIR)
    }

    /// Cached query results included in checkpoint snapshots
    pub fn query_cache_dir(&self) -> PathBuf {
        self.search_cache_dir().join("queries")
    }

    pub fn embedding_cache_dir(&self) -> PathBuf {
        self.search_cache_dir().join("embeddings")
    }

    /// Active chapter structure
    pub fn active_structure_file(&self) -> PathBuf {
        self.root.join("config").join("current-config.json")
    }

    /// Directories created by initialization
    pub fn directories(&self) -> Vec<PathBuf> {
        vec![
            self.root.clone(),
            self.chapter_states_dir(),
            self.checkpoints_dir(),
            self.query_cache_dir(),
            self.embedding_cache_dir(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = StateLayout::new("/tmp/state");

        assert_eq!(
            layout.current_state_file(),
            PathBuf::from("/tmp/state/current-generation.json")
        );
        assert_eq!(
            layout.chapter_state_file("01-overview"),
            PathBuf::from("/tmp/state/chapter-states/01-overview.json")
        );
        assert_eq!(
            layout.checkpoint_file("cp_1"),
            PathBuf::from("/tmp/state/checkpoints/cp_1.json")
        );
        assert_eq!(
            layout.query_cache_dir(),
            PathBuf::from("/tmp/state/search-cache/queries")
        );
        assert!(layout
            .directories()
            .contains(&PathBuf::from("/tmp/state/search-cache/embeddings")));
    }
}
