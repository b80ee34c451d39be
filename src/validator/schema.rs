//! JSON Schema Validation for State Files
//!
//! Validates `current-generation.json` and every chapter state against the
//! embedded schemas. Fix mode injects defaults for missing or mistyped keys and
//! writes a file back only when the repaired document passes.

use crate::models::generation::INITIAL_PHASE;
use crate::models::ValidationReport;
use crate::state::fs::write_json_atomic;
use crate::state::{ChapterStore, StateError, StateResult, StateStore};
use jsonschema::Validator;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CURRENT_STATE_SCHEMA: &str = include_str!("../../schemas/current-generation.schema.json");
const CHAPTER_STATE_SCHEMA: &str = include_str!("../../schemas/chapter-state.schema.json");

const DEFAULT_ALPHA: f64 = 0.7;

pub type SchemaReport = ValidationReport<SchemaDetails, SchemaFixes>;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDetails {
    pub current: FileCheck,
    pub chapters: Vec<FileCheck>,
}

/// Schema result for one file
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileCheck {
    pub file: String,
    pub valid: bool,
    pub problems: Vec<String>,
    pub fixed: bool,
}

impl FileCheck {
    fn new(file: &str, problems: Vec<String>, fixed: bool) -> Self {
        Self {
            file: file.to_string(),
            valid: problems.is_empty(),
            problems,
            fixed,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchemaFixes {
    pub files_written: Vec<PathBuf>,
}

/// Schema validator for the state tree
pub struct SchemaValidator {
    store: Arc<StateStore>,
    chapters: ChapterStore,
    autosave_ms: u64,
    current_schema: Validator,
    chapter_schema: Validator,
}

fn compile(name: &'static str, source: &str) -> StateResult<Validator> {
    let schema: Value = serde_json::from_str(source).map_err(|e| StateError::Schema {
        name,
        reason: e.to_string(),
    })?;
    Validator::new(&schema).map_err(|e| StateError::Schema {
        name,
        reason: e.to_string(),
    })
}

/// Every schema error as `<instance path> <message>`
fn schema_errors(validator: &Validator, document: &Value) -> Vec<String> {
    validator
        .iter_errors(document)
        .map(|error| {
            let path = error.instance_path.to_string();
            let path = if path.is_empty() { "/".to_string() } else { path };
            format!("{} {}", path, error)
        })
        .collect()
}

/// Outcome of reading a raw JSON document
enum RawDocument {
    Missing,
    Invalid(String),
    Parsed(Value),
}

async fn read_raw(path: &Path) -> RawDocument {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(value) => RawDocument::Parsed(value),
            Err(e) => RawDocument::Invalid(e.to_string()),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => RawDocument::Missing,
        Err(e) => RawDocument::Invalid(e.to_string()),
    }
}

impl SchemaValidator {
    pub fn new(store: Arc<StateStore>, chapters: ChapterStore, autosave_ms: u64) -> StateResult<Self> {
        Ok(Self {
            store,
            chapters,
            autosave_ms,
            current_schema: compile("current-generation", CURRENT_STATE_SCHEMA)?,
            chapter_schema: compile("chapter-state", CHAPTER_STATE_SCHEMA)?,
        })
    }

    pub async fn validate(&self, fix: bool) -> StateResult<SchemaReport> {
        let mut problems = Vec::new();
        let mut fixes = SchemaFixes::default();

        let current = self.check_current(fix, &mut fixes).await?;
        problems.extend(current.problems.iter().map(|p| format!("{}: {}", current.file, p)));

        let mut chapters = Vec::new();
        for file_id in self.chapters.ids().await? {
            let check = self.check_chapter(&file_id, fix, &mut fixes).await?;
            problems.extend(check.problems.iter().map(|p| format!("{}: {}", check.file, p)));
            chapters.push(check);
        }

        let details = SchemaDetails { current, chapters };
        Ok(ValidationReport::new(problems, details, fix.then_some(fixes)))
    }

    async fn check_current(&self, fix: bool, fixes: &mut SchemaFixes) -> StateResult<FileCheck> {
        let path = self.store.layout().current_state_file();
        let file = "current-generation.json";

        let mut document = match read_raw(&path).await {
            RawDocument::Missing => {
                return Ok(FileCheck::new(
                    file,
                    vec![format!("state file missing: {}", path.display())],
                    false,
                ))
            }
            RawDocument::Invalid(reason) => {
                return Ok(FileCheck::new(
                    file,
                    vec![format!("state not valid JSON: {}", reason)],
                    false,
                ))
            }
            RawDocument::Parsed(document) => document,
        };

        let problems = schema_errors(&self.current_schema, &document);
        if problems.is_empty() || !fix {
            return Ok(FileCheck::new(file, problems, false));
        }

        repair_current(&mut document, self.autosave_ms);
        let remaining = schema_errors(&self.current_schema, &document);
        if !remaining.is_empty() {
            return Ok(FileCheck::new(file, remaining, false));
        }

        self.store.replace_document(&document).await?;
        tracing::info!(file, "state repaired with schema defaults");
        fixes.files_written.push(path);
        Ok(FileCheck::new(file, Vec::new(), true))
    }

    async fn check_chapter(
        &self,
        file_id: &str,
        fix: bool,
        fixes: &mut SchemaFixes,
    ) -> StateResult<FileCheck> {
        let path = self.chapters.path(file_id);
        let file = format!("{}.json", file_id);

        let mut document = match read_raw(&path).await {
            RawDocument::Parsed(document) => document,
            RawDocument::Missing => return Ok(FileCheck::new(&file, Vec::new(), false)),
            RawDocument::Invalid(reason) => {
                return Ok(FileCheck::new(
                    &file,
                    vec![format!("invalid JSON: {}", reason)],
                    false,
                ))
            }
        };

        let problems = schema_errors(&self.chapter_schema, &document);
        if problems.is_empty() || !fix {
            return Ok(FileCheck::new(&file, problems, false));
        }

        repair_chapter(&mut document, file_id);
        let remaining = schema_errors(&self.chapter_schema, &document);
        if !remaining.is_empty() {
            return Ok(FileCheck::new(&file, remaining, false));
        }

        write_json_atomic(&path, &document).await?;
        tracing::info!(file = %file, "chapter state repaired with schema defaults");
        fixes.files_written.push(path);
        Ok(FileCheck::new(&file, Vec::new(), true))
    }
}

/// Run `f` on the object at `key`, replacing a missing or non-object value
fn with_object(parent: &mut Map<String, Value>, key: &str, f: impl FnOnce(&mut Map<String, Value>)) {
    let mut map = match parent.remove(key) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    f(&mut map);
    parent.insert(key.to_string(), Value::Object(map));
}

fn ensure_array(map: &mut Map<String, Value>, key: &str) {
    if !map.get(key).is_some_and(Value::is_array) {
        map.insert(key.to_string(), Value::Array(Vec::new()));
    }
}

fn repair_current(document: &mut Value, autosave_ms: u64) {
    let Value::Object(root) = document else {
        return;
    };

    with_object(root, "userPreferences", |preferences| {
        with_object(preferences, "searchStrategy", |strategy| {
            if !strategy.get("alpha").is_some_and(Value::is_number) {
                strategy.insert("alpha".to_string(), json!(DEFAULT_ALPHA));
            }
        })
    });

    ensure_array(root, "completedChapters");

    with_object(root, "globalSettings", |settings| {
        if !settings.get("autoSaveInterval").is_some_and(Value::is_u64) {
            settings.insert("autoSaveInterval".to_string(), json!(autosave_ms));
        }
    });

    with_object(root, "statistics", |_| {});

    with_object(root, "currentPhase", |phase| {
        if !phase.get("phase").is_some_and(Value::is_string) {
            phase.insert("phase".to_string(), json!(INITIAL_PHASE));
        }
    });
}

fn repair_chapter(document: &mut Value, file_id: &str) {
    let Value::Object(root) = document else {
        return;
    };

    let has_id = root
        .get("chapterId")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.is_empty());
    if !has_id {
        root.insert("chapterId".to_string(), json!(file_id));
    }
    if root.get("status").map_or(true, Value::is_null) {
        root.insert("status".to_string(), json!("IN_PROGRESS"));
    }
    for key in ["completedSections", "pendingDecisions", "completedDecisions"] {
        ensure_array(root, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChapterState, ChapterStatus};
    use crate::state::{InitOptions, StateLayout};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: Arc<StateStore>,
        chapters: ChapterStore,
        validator: SchemaValidator,
    }

    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let layout = StateLayout::new(temp.path().join("state"));
        let store = Arc::new(StateStore::new(layout.clone(), 30_000));
        store.initialize(&InitOptions::default()).await.unwrap();
        store.stop_autosave().await;
        let chapters = ChapterStore::new(layout);
        let validator = SchemaValidator::new(Arc::clone(&store), chapters.clone(), 30_000).unwrap();
        Fixture {
            _temp: temp,
            store,
            chapters,
            validator,
        }
    }

    fn write_raw(path: &Path, value: &Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_written_state_passes_schema() {
        let f = fixture().await;
        let mut chapter = ChapterState::new("01");
        chapter.status = ChapterStatus::Reviewed;
        f.chapters.save(&chapter).await.unwrap();

        let report = f.validator.validate(false).await.unwrap();
        assert!(report.valid, "{:?}", report.problems);
        assert_eq!(report.details.chapters.len(), 1);
    }

    #[tokio::test]
    async fn test_problems_carry_instance_path() {
        let f = fixture().await;
        let path = f.store.layout().current_state_file();
        let mut doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        doc["status"] = json!("SLEEPING");
        write_raw(&path, &doc);

        let report = f.validator.validate(false).await.unwrap();
        assert!(!report.valid);
        assert!(report.details.current.problems[0].starts_with("/status "));
        assert!(report.problems[0].starts_with("current-generation.json: /status"));
    }

    #[tokio::test]
    async fn test_fix_injects_defaults_and_result_loads() {
        let f = fixture().await;
        write_raw(
            &f.store.layout().current_state_file(),
            &json!({
                "generationId": "gen_1",
                "status": "IN_PROGRESS",
                "currentPhase": { "phase": "WRITING" },
                "completedChapters": "01",
                "globalSettings": { "autoSaveInterval": "soon" },
                "statistics": {},
                "custom": { "kept": true }
            }),
        );

        let report = f.validator.validate(true).await.unwrap();
        assert!(report.valid, "{:?}", report.problems);
        assert!(report.details.current.fixed);
        assert_eq!(report.fixed.unwrap().files_written.len(), 1);

        let state = f.store.current().await.unwrap();
        assert!(state.completed_chapters.is_empty());
        assert_eq!(state.global_settings.auto_save_interval, 30_000);
        assert_eq!(state.user_preferences.search_strategy.alpha, DEFAULT_ALPHA);
        assert_eq!(state.extra["custom"], json!({ "kept": true }));
    }

    #[tokio::test]
    async fn test_unrepairable_file_is_not_written() {
        let f = fixture().await;
        let path = f.chapters.path("02");
        let doc = json!({ "chapterId": "02", "status": "LOST" });
        write_raw(&path, &doc);

        let report = f.validator.validate(true).await.unwrap();
        assert!(!report.valid);
        assert!(!report.details.chapters[0].fixed);
        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, doc);
    }

    #[tokio::test]
    async fn test_chapter_fix_uses_file_name() {
        let f = fixture().await;
        write_raw(&f.chapters.path("03-usage"), &json!({ "pendingDecisions": {} }));

        let report = f.validator.validate(true).await.unwrap();
        assert!(report.valid, "{:?}", report.problems);

        let chapter = f.chapters.load("03-usage").await.present().unwrap();
        assert_eq!(chapter.chapter_id, "03-usage");
        assert_eq!(chapter.status, ChapterStatus::InProgress);
    }

    #[tokio::test]
    async fn test_invalid_json_is_reported() {
        let f = fixture().await;
        std::fs::write(f.store.layout().current_state_file(), "{").unwrap();

        let report = f.validator.validate(true).await.unwrap();
        assert!(!report.valid);
        assert!(report.details.current.problems[0].starts_with("state not valid JSON"));
    }
}
