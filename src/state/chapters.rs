//! ChapterStore - per-chapter state files under `chapter-states/`

use super::error::{Loaded, StateResult};
use super::fs::{list_json_stems, read_json, write_json_atomic};
use super::layout::StateLayout;
use crate::models::ChapterState;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A chapter file that could not be parsed
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedChapter {
    /// Chapter id derived from the file name
    pub file_id: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Everything found in `chapter-states/`
#[derive(Debug, Clone, Default)]
pub struct ChapterScan {
    /// Parsed states keyed by file stem
    pub states: BTreeMap<String, ChapterState>,
    pub malformed: Vec<MalformedChapter>,
}

impl ChapterScan {
    /// States keyed by their `chapterId`
    pub fn by_chapter_id(&self) -> BTreeMap<String, ChapterState> {
        self.states
            .values()
            .map(|s| (s.chapter_id.clone(), s.clone()))
            .collect()
    }
}

/// Reads and writes chapter state files
#[derive(Debug, Clone)]
pub struct ChapterStore {
    layout: StateLayout,
}

impl ChapterStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn path(&self, chapter_id: &str) -> PathBuf {
        self.layout.chapter_state_file(chapter_id)
    }

    pub async fn load(&self, chapter_id: &str) -> Loaded<ChapterState> {
        read_json(&self.path(chapter_id)).await
    }

    /// Load a chapter, creating an in-memory one if none exists yet
    ///
    /// A malformed file is replaced only when the caller saves the result.
    pub async fn load_or_new(&self, chapter_id: &str) -> ChapterState {
        match self.load(chapter_id).await {
            Loaded::Present(state) => state,
            Loaded::Absent => ChapterState::new(chapter_id),
            Loaded::Malformed(reason) => {
                tracing::warn!(chapter_id, reason = %reason, "replacing malformed chapter state");
                ChapterState::new(chapter_id)
            }
        }
    }

    /// Write a chapter file named after its `chapterId`
    pub async fn save(&self, state: &ChapterState) -> StateResult<PathBuf> {
        let path = self.path(&state.chapter_id);
        write_json_atomic(&path, state).await?;
        Ok(path)
    }

    /// Write a chapter back to the file it was read from
    pub async fn save_as(&self, file_id: &str, state: &ChapterState) -> StateResult<PathBuf> {
        let path = self.path(file_id);
        write_json_atomic(&path, state).await?;
        Ok(path)
    }

    pub async fn ids(&self) -> StateResult<Vec<String>> {
        list_json_stems(&self.layout.chapter_states_dir()).await
    }

    /// Read every chapter file, separating unparsable ones
    pub async fn scan(&self) -> StateResult<ChapterScan> {
        let mut scan = ChapterScan::default();
        for file_id in self.ids().await? {
            let path = self.path(&file_id);
            match read_json::<ChapterState>(&path).await {
                Loaded::Present(state) => {
                    scan.states.insert(file_id, state);
                }
                Loaded::Absent => scan.malformed.push(MalformedChapter {
                    file_id,
                    path,
                    reason: "empty file".to_string(),
                }),
                Loaded::Malformed(reason) => scan.malformed.push(MalformedChapter {
                    file_id,
                    path,
                    reason,
                }),
            }
        }
        Ok(scan)
    }
}
