//! Configuration
//!
//! Settings come from `bookstate.toml` in the project root, overridden by
//! environment variables. The chapter structure used by coverage and report
//! commands is resolved separately, see [`active_chapters`].

use crate::state::layout::StateLayout;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the project root
pub const CONFIG_FILE: &str = "bookstate.toml";

/// Floor for the autosave period
pub const MIN_AUTOSAVE_MS: u64 = 3000;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Root of the state tree
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Root of the output artifacts, one sub-directory per chapter
    #[serde(default = "default_outputs_dir")]
    pub outputs_dir: PathBuf,

    /// Autosave period in milliseconds (floored at MIN_AUTOSAVE_MS)
    #[serde(default = "default_autosave_ms")]
    pub autosave_ms: u64,

    /// Retention: number of checkpoints kept
    #[serde(default = "default_checkpoints_to_keep")]
    pub checkpoints_to_keep: usize,

    /// Coverage threshold for chapters that declare none
    #[serde(default = "default_min_sections")]
    pub min_sections_per_chapter: usize,

    /// Chapter structure declared inline
    #[serde(default)]
    pub chapters: Vec<ChapterDefinition>,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

fn default_outputs_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_autosave_ms() -> u64 {
    30_000
}

fn default_checkpoints_to_keep() -> usize {
    10
}

fn default_min_sections() -> usize {
    1
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            outputs_dir: default_outputs_dir(),
            autosave_ms: default_autosave_ms(),
            checkpoints_to_keep: default_checkpoints_to_keep(),
            min_sections_per_chapter: default_min_sections(),
            chapters: Vec::new(),
        }
    }
}

impl StateConfig {
    /// Load config from bookstate.toml and the process environment
    pub fn load(project_root: &Path) -> Result<Self> {
        Self::load_with_env(project_root, |key| std::env::var(key).ok())
    }

    /// Load config using a custom environment lookup
    pub fn load_with_env<F>(project_root: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = project_root.join(CONFIG_FILE);
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<StateConfig>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            Self::default()
        };

        config.apply_env(env)?;
        config.state_dir = absolutize(project_root, &config.state_dir);
        config.outputs_dir = absolutize(project_root, &config.outputs_dir);
        Ok(config)
    }

    /// Config rooted in a single directory (state/ and outputs/ below it)
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            state_dir: root.join("state"),
            outputs_dir: root.join("outputs"),
            ..Self::default()
        }
    }

    fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("OUTPUTS_DIR") {
            self.outputs_dir = PathBuf::from(dir);
        }
        if let Some(ms) = get("AUTO_SAVE_INTERVAL") {
            self.autosave_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("AUTO_SAVE_INTERVAL is not a number: {}", ms))?;
        }
        if let Some(keep) = get("MAX_CHECKPOINTS") {
            self.checkpoints_to_keep = keep
                .trim()
                .parse()
                .with_context(|| format!("MAX_CHECKPOINTS is not a number: {}", keep))?;
        }
        if let Some(min) = get("MIN_SECTIONS_PER_CHAPTER") {
            self.min_sections_per_chapter = min
                .trim()
                .parse()
                .with_context(|| format!("MIN_SECTIONS_PER_CHAPTER is not a number: {}", min))?;
        }
        Ok(())
    }

    /// Autosave period with the floor applied
    pub fn autosave_period_ms(&self) -> u64 {
        self.autosave_ms.max(MIN_AUTOSAVE_MS)
    }

    pub fn layout(&self) -> StateLayout {
        StateLayout::new(&self.state_dir)
    }
}

fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

// =============================================================================
// Chapter structure
// =============================================================================

/// Per-chapter acceptance criteria
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationCriteria {
    /// Minimum number of output artifacts
    #[serde(default, alias = "required_sections")]
    pub required_sections: Option<usize>,
}

/// A declared chapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChapterDefinition {
    pub id: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub sections: Vec<String>,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default, alias = "validation_criteria")]
    pub validation_criteria: ValidationCriteria,
}

impl ChapterDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            sections: Vec::new(),
            dependencies: Vec::new(),
            validation_criteria: ValidationCriteria::default(),
        }
    }

    pub fn with_required_sections(mut self, required: usize) -> Self {
        self.validation_criteria.required_sections = Some(required);
        self
    }
}

/// Where the chapter structure came from
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChapterSource {
    /// Active structure stored under the state tree
    Active,
    /// `[[chapters]]` in bookstate.toml
    Config,
    /// Chapter ids found in chapter-states/
    Discovered,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredStructure {
    chapters: Vec<ChapterDefinition>,
}

/// Resolve the chapter structure: active file, then config, then discovery
pub fn active_chapters(config: &StateConfig) -> (ChapterSource, Vec<ChapterDefinition>) {
    let active_path = config.layout().active_structure_file();
    if let Ok(content) = std::fs::read_to_string(&active_path) {
        match serde_json::from_str::<StoredStructure>(&content) {
            Ok(stored) if !stored.chapters.is_empty() => {
                return (ChapterSource::Active, normalize(stored.chapters));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(
                path = %active_path.display(),
                error = %e,
                "ignoring unreadable chapter structure"
            ),
        }
    }

    if !config.chapters.is_empty() {
        return (ChapterSource::Config, normalize(config.chapters.clone()));
    }

    (ChapterSource::Discovered, discover_chapters(&config.layout()))
}

/// Load a chapter structure from a JSON file and make it active
///
/// Accepts either `{"chapters": [...]}` or a bare array.
pub fn set_active_chapters(config: &StateConfig, source: &Path) -> Result<Vec<ChapterDefinition>> {
    let content = std::fs::read_to_string(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;
    let raw: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", source.display()))?;

    let list = match raw {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut obj) => match obj.remove("chapters") {
            Some(serde_json::Value::Array(items)) => items,
            _ => anyhow::bail!("Structure must contain a 'chapters' array or be an array"),
        },
        _ => anyhow::bail!("Structure must contain a 'chapters' array or be an array"),
    };

    let chapters: Vec<ChapterDefinition> = normalize(
        list.into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
    );
    if chapters.is_empty() {
        anyhow::bail!("No valid chapters in {}", source.display());
    }

    let target = config.layout().active_structure_file();
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let stored = StoredStructure {
        chapters: chapters.clone(),
    };
    std::fs::write(&target, serde_json::to_string_pretty(&stored)?)
        .with_context(|| format!("Failed to write {}", target.display()))?;

    Ok(chapters)
}

/// Remove the active structure; returns true if one existed
pub fn clear_active_chapters(config: &StateConfig) -> Result<bool> {
    let target = config.layout().active_structure_file();
    match std::fs::remove_file(&target) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", target.display())),
    }
}

fn normalize(chapters: Vec<ChapterDefinition>) -> Vec<ChapterDefinition> {
    chapters
        .into_iter()
        .filter_map(|mut ch| {
            ch.id = ch.id.trim().to_string();
            (!ch.id.is_empty()).then_some(ch)
        })
        .collect()
}

fn discover_chapters(layout: &StateLayout) -> Vec<ChapterDefinition> {
    let Ok(entries) = std::fs::read_dir(layout.chapter_states_dir()) else {
        return Vec::new();
    };

    let mut ids: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.strip_suffix(".json").map(str::to_string)
        })
        .collect();
    ids.sort();
    ids.into_iter().map(ChapterDefinition::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_config_file() {
        let temp = TempDir::new().unwrap();
        let config = StateConfig::load_with_env(temp.path(), no_env).unwrap();

        assert_eq!(config.state_dir, temp.path().join("state"));
        assert_eq!(config.outputs_dir, temp.path().join("outputs"));
        assert_eq!(config.autosave_ms, 30_000);
        assert_eq!(config.checkpoints_to_keep, 10);
        assert_eq!(config.min_sections_per_chapter, 1);
    }

    #[test]
    fn test_toml_then_env_overrides() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE),
            r#"
state_dir = "run/state"
checkpoints_to_keep = 3

[[chapters]]
id = "01-overview"
sections = ["Intro", "Roles"]
validationCriteria = { requiredSections = 2 }
"#,
        )
        .unwrap();

        let env: HashMap<&str, &str> =
            [("MAX_CHECKPOINTS", "5"), ("AUTO_SAVE_INTERVAL", "1000")].into_iter().collect();
        let config =
            StateConfig::load_with_env(temp.path(), |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.state_dir, temp.path().join("run/state"));
        assert_eq!(config.checkpoints_to_keep, 5);
        assert_eq!(config.autosave_ms, 1000);
        assert_eq!(config.autosave_period_ms(), MIN_AUTOSAVE_MS);
        assert_eq!(config.chapters.len(), 1);
        assert_eq!(config.chapters[0].validation_criteria.required_sections, Some(2));
    }

    #[test]
    fn test_bad_env_number_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = StateConfig::load_with_env(temp.path(), |k| {
            (k == "MAX_CHECKPOINTS").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_active_structure_precedence() {
        let temp = TempDir::new().unwrap();
        let mut config = StateConfig::rooted_at(temp.path());

        // Discovery from chapter-states/
        let chapters_dir = config.layout().chapter_states_dir();
        std::fs::create_dir_all(&chapters_dir).unwrap();
        std::fs::write(chapters_dir.join("b.json"), "{}").unwrap();
        std::fs::write(chapters_dir.join("a.json"), "{}").unwrap();
        let (source, chapters) = active_chapters(&config);
        assert_eq!(source, ChapterSource::Discovered);
        assert_eq!(chapters.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        // Config beats discovery
        config.chapters = vec![ChapterDefinition::new("from-config")];
        let (source, _) = active_chapters(&config);
        assert_eq!(source, ChapterSource::Config);

        // Active file beats config
        let file = temp.path().join("structure.json");
        std::fs::write(&file, r#"[{"id": "x", "sections": ["One"]}, {"id": "  "}]"#).unwrap();
        let stored = set_active_chapters(&config, &file).unwrap();
        assert_eq!(stored.len(), 1);
        let (source, chapters) = active_chapters(&config);
        assert_eq!(source, ChapterSource::Active);
        assert_eq!(chapters[0].id, "x");

        assert!(clear_active_chapters(&config).unwrap());
        assert!(!clear_active_chapters(&config).unwrap());
        assert_eq!(active_chapters(&config).0, ChapterSource::Config);
    }

    #[test]
    fn test_set_active_rejects_empty_structure() {
        let temp = TempDir::new().unwrap();
        let config = StateConfig::rooted_at(temp.path());
        let file = temp.path().join("empty.json");
        std::fs::write(&file, r#"{"chapters": []}"#).unwrap();

        assert!(set_active_chapters(&config, &file).is_err());
    }
}
