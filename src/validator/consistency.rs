//! Cross-Entity Consistency Validator
//!
//! Validates that the global state and the chapter states agree:
//! - Every completed chapter has a COMPLETED chapter state
//! - COMPLETED chapters have no pending decisions
//! - Every COMPLETED chapter state is recorded as completed
//! - Decision ids are unique across all chapters
//! - The current phase points at an existing chapter state
//!
//! In fix mode every repair is applied to in-memory copies first and each
//! modified file is written once at the end. Duplicate decision ids are
//! reported only.

use crate::models::{ChapterState, ChapterStatus, GenerationState, ValidationReport};
use crate::state::{ChapterStore, Loaded, StateResult, StateStore};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

pub type ConsistencyReport = ValidationReport<ConsistencyDetails, ConsistencyFixes>;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyDetails {
    pub missing_chapter_states: Vec<String>,
    pub completed_mismatch: Vec<StatusMismatch>,
    pub completed_with_pending_decisions: Vec<PendingOnCompleted>,
    pub duplicate_decision_ids: Vec<DuplicateDecisionId>,
    pub invalid_current_phase_chapter: Option<InvalidPhaseChapter>,
    pub orphan_completed_chapters: Vec<String>,
    pub filename_id_mismatch: Vec<FilenameMismatch>,
    pub malformed_chapter_states: Vec<MalformedEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusMismatch {
    pub chapter_id: String,
    pub status: ChapterStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingOnCompleted {
    pub chapter_id: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateDecisionId {
    pub decision_id: String,
    pub chapters: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvalidPhaseChapter {
    pub chapter_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilenameMismatch {
    pub file: String,
    pub chapter_id: String,
    pub expected: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MalformedEntry {
    pub file: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyFixes {
    pub removed_from_completed: Vec<RemovedChapter>,
    pub cleared_pending_on_completed: Vec<String>,
    pub added_to_completed: Vec<String>,
    pub removed_invalid_current_phase_chapter: bool,
    pub files_written: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemovedChapter {
    pub chapter_id: String,
    pub reason: String,
}

/// A parsed chapter state with the file it came from
struct ChapterEntry {
    file_id: String,
    state: ChapterState,
    dirty: bool,
}

/// Cross-entity consistency validator
#[derive(Clone)]
pub struct ConsistencyValidator {
    store: Arc<StateStore>,
    chapters: ChapterStore,
}

impl ConsistencyValidator {
    pub fn new(store: Arc<StateStore>, chapters: ChapterStore) -> Self {
        Self { store, chapters }
    }

    /// Run all five checks, repairing what can be repaired when `fix` is set
    ///
    /// Problems found are reported even when fixed; re-run to confirm.
    pub async fn validate(&self, fix: bool) -> StateResult<ConsistencyReport> {
        let mut problems = Vec::new();
        let mut details = ConsistencyDetails::default();
        let mut fixes = ConsistencyFixes::default();
        let fixed = |fixes: ConsistencyFixes| fix.then_some(fixes);

        let state_path = self.store.layout().current_state_file();
        let mut current = match self.store.load().await {
            Loaded::Present(state) => state,
            Loaded::Absent => {
                problems.push(format!("missing state file: {}", state_path.display()));
                return Ok(ValidationReport::new(problems, details, fixed(fixes)));
            }
            Loaded::Malformed(reason) => {
                problems.push(format!("invalid state: {}", reason));
                return Ok(ValidationReport::new(problems, details, fixed(fixes)));
            }
        };

        let scan = self.chapters.scan().await?;
        for malformed in &scan.malformed {
            problems.push(format!(
                "chapter state {}.json is unreadable: {}",
                malformed.file_id, malformed.reason
            ));
            details.malformed_chapter_states.push(MalformedEntry {
                file: format!("{}.json", malformed.file_id),
                reason: malformed.reason.clone(),
            });
        }

        let files_present: BTreeSet<String> = scan
            .states
            .keys()
            .cloned()
            .chain(scan.malformed.iter().map(|m| m.file_id.clone()))
            .collect();

        // Keyed by chapterId; a later file with the same id wins
        let mut chapters: BTreeMap<String, ChapterEntry> = BTreeMap::new();
        for (file_id, state) in scan.states {
            if state.chapter_id != file_id {
                details.filename_id_mismatch.push(FilenameMismatch {
                    file: format!("{}.json", file_id),
                    chapter_id: state.chapter_id.clone(),
                    expected: file_id.clone(),
                });
            }
            chapters.insert(
                state.chapter_id.clone(),
                ChapterEntry {
                    file_id,
                    state,
                    dirty: false,
                },
            );
        }

        let listed: Vec<String> = current.completed_chapters.clone();
        let mut generation_dirty = false;

        // 1) Completed chapters need a COMPLETED chapter state
        let mut seen = BTreeSet::new();
        for chapter_id in listed.iter().filter(|id| seen.insert(id.as_str())) {
            let status = chapters
                .get(chapter_id)
                .map(|entry| entry.state.status)
                .or_else(|| {
                    chapters
                        .values()
                        .find(|entry| &entry.file_id == chapter_id)
                        .map(|entry| entry.state.status)
                });

            match status {
                None if !files_present.contains(chapter_id) => {
                    details.missing_chapter_states.push(chapter_id.clone());
                    problems.push(format!("completed chapter missing state file: {}", chapter_id));
                    if fix && current.unmark_chapter_completed(chapter_id) {
                        generation_dirty = true;
                        fixes.removed_from_completed.push(RemovedChapter {
                            chapter_id: chapter_id.clone(),
                            reason: "missing chapter-state".to_string(),
                        });
                    }
                }
                Some(status) if status != ChapterStatus::Completed => {
                    details.completed_mismatch.push(StatusMismatch {
                        chapter_id: chapter_id.clone(),
                        status,
                    });
                    problems.push(format!(
                        "chapter {} listed as completed but state.status={}",
                        chapter_id, status
                    ));
                    if fix && current.unmark_chapter_completed(chapter_id) {
                        generation_dirty = true;
                        fixes.removed_from_completed.push(RemovedChapter {
                            chapter_id: chapter_id.clone(),
                            reason: format!("status={}", status),
                        });
                    }
                }
                // COMPLETED, or only an unreadable file
                _ => {}
            }
        }

        // 2) COMPLETED chapters must not have pending decisions
        for (chapter_id, entry) in chapters.iter_mut() {
            let count = entry.state.pending_decisions.len();
            if entry.state.is_completed() && count > 0 {
                details
                    .completed_with_pending_decisions
                    .push(PendingOnCompleted {
                        chapter_id: chapter_id.clone(),
                        count,
                    });
                problems.push(format!(
                    "chapter {} is COMPLETED but has {} pendingDecisions",
                    chapter_id, count
                ));
                if fix {
                    entry.state.pending_decisions.clear();
                    entry.dirty = true;
                    fixes.cleared_pending_on_completed.push(chapter_id.clone());
                }
            }
        }

        // 3) COMPLETED chapter states must be recorded
        for (chapter_id, entry) in &chapters {
            if entry.state.is_completed() && !listed.contains(chapter_id) {
                details.orphan_completed_chapters.push(chapter_id.clone());
                problems.push(format!(
                    "chapter {} state is COMPLETED but not recorded in current.completedChapters",
                    chapter_id
                ));
                if fix && current.mark_chapter_completed(chapter_id) {
                    generation_dirty = true;
                    fixes.added_to_completed.push(chapter_id.clone());
                }
            }
        }

        // 4) Decision ids are unique across pending and completed decisions
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for (chapter_id, entry) in &chapters {
            for decision_id in entry.state.decision_ids() {
                match owners.get(decision_id) {
                    Some(first) => {
                        details.duplicate_decision_ids.push(DuplicateDecisionId {
                            decision_id: decision_id.to_string(),
                            chapters: vec![first.to_string(), chapter_id.clone()],
                        });
                        problems.push(format!(
                            "duplicate decisionId '{}' across chapters {} and {}",
                            decision_id, first, chapter_id
                        ));
                    }
                    None => {
                        owners.insert(decision_id, chapter_id.as_str());
                    }
                }
            }
        }

        // 5) The current phase must point at an existing chapter state
        if let Some(chapter_id) = current.current_phase.chapter_id.clone() {
            let exists = chapters.contains_key(&chapter_id) || files_present.contains(&chapter_id);
            if !exists {
                details.invalid_current_phase_chapter = Some(InvalidPhaseChapter {
                    chapter_id: chapter_id.clone(),
                    reason: "missing chapter-state".to_string(),
                });
                problems.push(format!(
                    "currentPhase references chapter '{}' which has no chapter-state",
                    chapter_id
                ));
                if fix {
                    current.current_phase.chapter_id = None;
                    generation_dirty = true;
                    fixes.removed_invalid_current_phase_chapter = true;
                }
            }
        }

        if fix {
            self.write_repairs(&chapters, generation_dirty.then_some(&current), &mut fixes)
                .await?;
        }

        if !problems.is_empty() {
            tracing::debug!(problems = problems.len(), fix, "consistency problems found");
        }
        Ok(ValidationReport::new(problems, details, fixed(fixes)))
    }

    async fn write_repairs(
        &self,
        chapters: &BTreeMap<String, ChapterEntry>,
        current: Option<&GenerationState>,
        fixes: &mut ConsistencyFixes,
    ) -> StateResult<()> {
        for entry in chapters.values().filter(|entry| entry.dirty) {
            let path = self.chapters.save_as(&entry.file_id, &entry.state).await?;
            fixes.files_written.push(path);
        }

        if let Some(current) = current {
            self.store.replace(current).await?;
            fixes.files_written.push(self.store.layout().current_state_file());
        }

        if !fixes.files_written.is_empty() {
            tracing::info!(files = fixes.files_written.len(), "consistency repairs written");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompletedDecision, PendingDecision};
    use crate::state::{InitOptions, StateLayout};
    use serde_json::{Map, Value};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: Arc<StateStore>,
        chapters: ChapterStore,
        validator: ConsistencyValidator,
    }

    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let layout = StateLayout::new(temp.path().join("state"));
        let store = Arc::new(StateStore::new(layout.clone(), 30_000));
        store.initialize(&InitOptions::default()).await.unwrap();
        store.stop_autosave().await;
        let chapters = ChapterStore::new(layout);
        let validator = ConsistencyValidator::new(Arc::clone(&store), chapters.clone());
        Fixture {
            _temp: temp,
            store,
            chapters,
            validator,
        }
    }

    fn chapter(id: &str, status: ChapterStatus) -> ChapterState {
        let mut state = ChapterState::new(id);
        state.status = status;
        state
    }

    fn pending(id: &str) -> PendingDecision {
        PendingDecision {
            decision_id: id.to_string(),
            decision_type: "GENERIC".to_string(),
            context: Value::Null,
            extra: Map::new(),
        }
    }

    async fn set_state(store: &StateStore, f: impl FnOnce(&mut GenerationState)) {
        let mut state = store.current().await.unwrap();
        f(&mut state);
        store.replace(&state).await.unwrap();
    }

    #[tokio::test]
    async fn test_fresh_state_is_consistent() {
        let f = fixture().await;
        let report = f.validator.validate(false).await.unwrap();
        assert!(report.valid);
        assert!(report.fixed.is_none());
    }

    #[tokio::test]
    async fn test_missing_state_file() {
        let temp = TempDir::new().unwrap();
        let layout = StateLayout::new(temp.path());
        let validator = ConsistencyValidator::new(
            Arc::new(StateStore::new(layout.clone(), 30_000)),
            ChapterStore::new(layout),
        );

        let report = validator.validate(true).await.unwrap();
        assert!(!report.valid);
        assert_eq!(report.problems.len(), 1);
        assert!(report.problems[0].starts_with("missing state file"));
    }

    #[tokio::test]
    async fn test_completed_with_pending_is_cleared() {
        let f = fixture().await;
        let mut ch = chapter("01", ChapterStatus::Completed);
        ch.pending_decisions.push(pending("d1"));
        f.chapters.save(&ch).await.unwrap();
        set_state(&f.store, |s| s.completed_chapters = vec!["01".to_string()]).await;

        let report = f.validator.validate(true).await.unwrap();
        assert!(!report.valid);
        assert_eq!(
            report.details.completed_with_pending_decisions,
            vec![PendingOnCompleted {
                chapter_id: "01".to_string(),
                count: 1
            }]
        );
        let fixes = report.fixed.unwrap();
        assert_eq!(fixes.cleared_pending_on_completed, vec!["01".to_string()]);
        assert_eq!(fixes.files_written, vec![f.chapters.path("01")]);

        let saved = f.chapters.load("01").await.present().unwrap();
        assert!(saved.pending_decisions.is_empty());
        assert!(f.validator.validate(false).await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_malformed_chapter_counts_as_present() {
        let f = fixture().await;
        std::fs::create_dir_all(f.store.layout().chapter_states_dir()).unwrap();
        std::fs::write(f.chapters.path("01"), "{ broken").unwrap();
        set_state(&f.store, |s| {
            s.completed_chapters = vec!["01".to_string()];
            s.current_phase.chapter_id = Some("01".to_string());
        })
        .await;

        let report = f.validator.validate(true).await.unwrap();
        assert_eq!(report.problems.len(), 1);
        assert_eq!(report.details.malformed_chapter_states.len(), 1);
        assert!(report.details.missing_chapter_states.is_empty());
        assert!(report.details.invalid_current_phase_chapter.is_none());
        assert!(report.fixed.unwrap().files_written.is_empty());

        let state = f.store.current().await.unwrap();
        assert_eq!(state.completed_chapters, vec!["01".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_decisions_are_report_only() {
        let f = fixture().await;
        let mut a = chapter("a", ChapterStatus::InProgress);
        a.pending_decisions.push(pending("dup"));
        let mut b = chapter("b", ChapterStatus::InProgress);
        b.completed_decisions.push(CompletedDecision {
            decision_id: "dup".to_string(),
            resolution: Value::Null,
            resolved_at: None,
            extra: Map::new(),
        });
        f.chapters.save(&a).await.unwrap();
        f.chapters.save(&b).await.unwrap();

        let report = f.validator.validate(true).await.unwrap();
        assert_eq!(
            report.details.duplicate_decision_ids,
            vec![DuplicateDecisionId {
                decision_id: "dup".to_string(),
                chapters: vec!["a".to_string(), "b".to_string()],
            }]
        );
        assert!(report.fixed.unwrap().files_written.is_empty());
        assert!(!f.validator.validate(false).await.unwrap().valid);
    }

    #[tokio::test]
    async fn test_filename_mismatch_is_detail_only() {
        let f = fixture().await;
        f.chapters
            .save_as("old", &chapter("new", ChapterStatus::InProgress))
            .await
            .unwrap();

        let report = f.validator.validate(false).await.unwrap();
        assert!(report.valid);
        assert_eq!(report.details.filename_id_mismatch[0].expected, "old");
    }

    #[tokio::test]
    async fn test_fix_is_idempotent() {
        let f = fixture().await;
        f.chapters.save(&chapter("01", ChapterStatus::InProgress)).await.unwrap();
        f.chapters.save(&chapter("03", ChapterStatus::Completed)).await.unwrap();
        set_state(&f.store, |s| {
            s.completed_chapters = vec!["01".to_string(), "02".to_string(), "01".to_string()];
            s.current_phase.chapter_id = Some("02".to_string());
        })
        .await;

        let first = f.validator.validate(true).await.unwrap();
        assert!(!first.valid);
        let fixes = first.fixed.unwrap();
        assert_eq!(fixes.removed_from_completed.len(), 2);
        assert_eq!(fixes.added_to_completed, vec!["03".to_string()]);
        assert!(fixes.removed_invalid_current_phase_chapter);
        assert_eq!(fixes.files_written, vec![f.store.layout().current_state_file()]);

        let second = f.validator.validate(true).await.unwrap();
        assert!(second.valid, "{:?}", second.problems);
        assert!(second.fixed.unwrap().files_written.is_empty());

        let state = f.store.current().await.unwrap();
        assert_eq!(state.completed_chapters, vec!["03".to_string()]);
        assert!(state.current_phase.chapter_id.is_none());
    }

    #[tokio::test]
    async fn test_repair_keeps_unknown_decision_and_history_fields() {
        let f = fixture().await;
        let path = f.chapters.path("ch");
        std::fs::write(
            &path,
            serde_json::to_string_pretty(&serde_json::json!({
                "chapterId": "ch",
                "status": "COMPLETED",
                "pendingDecisions": [{ "decisionId": "p1", "type": "GENERIC", "context": {} }],
                "completedDecisions": [{ "decisionId": "d1", "resolution": 1, "reviewer": "alice" }],
                "completedSections": [],
                "searchHistory": [{
                    "decisionId": "d1",
                    "type": "SEARCH_RESULTS_SELECTION",
                    "decidedAt": "2024-01-01T00:00:00Z",
                    "collection": "docs"
                }]
            }))
            .unwrap(),
        )
        .unwrap();

        let report = f.validator.validate(true).await.unwrap();
        assert_eq!(
            report.fixed.unwrap().cleared_pending_on_completed,
            vec!["ch".to_string()]
        );

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["pendingDecisions"], serde_json::json!([]));
        assert_eq!(raw["completedDecisions"][0]["reviewer"], "alice");
        assert_eq!(raw["searchHistory"][0]["collection"], "docs");
    }
}
