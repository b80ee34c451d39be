//! JSON file primitives shared by the stores
//!
//! Every write goes through [`write_json_atomic`]: the document is written to a
//! temporary file in the target directory and then persisted over the target,
//! so a reader never observes a partially written file.

use super::error::{Loaded, StateError, StateResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Serialize `value` as pretty JSON and atomically replace `path` with it
pub async fn write_json_atomic<T>(path: &Path, value: &T) -> StateResult<()>
where
    T: Serialize + ?Sized,
{
    let content = serde_json::to_string_pretty(value).map_err(|source| StateError::Serialize {
        what: path.display().to_string(),
        source,
    })?;

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&target, content.as_bytes()))
        .await
        .map_err(|e| StateError::io(path, std::io::Error::other(e)))?
}

fn write_atomic_blocking(path: &Path, bytes: &[u8]) -> StateResult<()> {
    let parent = path.parent().ok_or_else(|| {
        StateError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent directory"),
        )
    })?;
    std::fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;

    let mut temp_file = NamedTempFile::new_in(parent).map_err(|e| StateError::io(parent, e))?;
    let written = temp_file
        .write_all(bytes)
        .and_then(|_| temp_file.as_file().sync_all());
    if let Err(e) = written {
        return Err(StateError::io(temp_file.path(), e));
    }

    // persist() is an atomic rename on the same filesystem
    temp_file
        .persist(path)
        .map_err(|e| StateError::io(path, e.error))?;

    Ok(())
}

/// Read and parse a JSON document
///
/// Missing or empty files are `Absent`; unreadable or unparsable ones are
/// `Malformed` with the reason.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Loaded<T> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Loaded::Absent,
        Err(e) => return Loaded::Malformed(format!("unreadable: {}", e)),
    };

    if content.trim().is_empty() {
        return Loaded::Absent;
    }

    match serde_json::from_str::<T>(&content) {
        Ok(value) => Loaded::Present(value),
        Err(e) => Loaded::Malformed(e.to_string()),
    }
}

/// Stems of the `*.json` files in `dir`, sorted; a missing directory is empty
pub async fn list_json_stems(dir: &Path) -> StateResult<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StateError::io(dir, e)),
    };

    let mut stems = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| StateError::io(dir, e))? {
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(stem) = name.strip_suffix(".json") {
            if !stem.is_empty() {
                stems.push(stem.to_string());
            }
        }
    }

    stems.sort();
    Ok(stems)
}

/// Create every directory in `dirs`; existing ones are fine
pub async fn ensure_dirs(dirs: &[PathBuf]) -> StateResult<()> {
    for dir in dirs {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StateError::io(dir, e))?;
    }
    Ok(())
}

/// Remove a file; returns false when it did not exist
pub async fn remove_if_exists(path: &Path) -> StateResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StateError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_atomic_write_creates_parent_and_leaves_no_temp() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("nested/doc.json");

        write_json_atomic(&target, &json!({ "a": 1 })).await.unwrap();
        write_json_atomic(&target, &json!({ "a": 2 })).await.unwrap();

        let loaded: Loaded<Value> = read_json(&target).await;
        assert_eq!(loaded, Loaded::Present(json!({ "a": 2 })));

        let names: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["doc.json".to_string()]);
    }

    #[tokio::test]
    async fn test_read_distinguishes_absent_and_malformed() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.json");
        let empty = temp.path().join("empty.json");
        let broken = temp.path().join("broken.json");
        std::fs::write(&empty, "  \n").unwrap();
        std::fs::write(&broken, "{ not json").unwrap();

        assert_eq!(read_json::<Value>(&missing).await, Loaded::Absent);
        assert_eq!(read_json::<Value>(&empty).await, Loaded::Absent);
        assert!(matches!(read_json::<Value>(&broken).await, Loaded::Malformed(_)));
    }

    #[tokio::test]
    async fn test_list_json_stems_sorted_and_filtered() {
        let temp = TempDir::new().unwrap();
        for name in ["b.json", "a.json", "notes.txt", ".tmpXYZ"] {
            std::fs::write(temp.path().join(name), "{}").unwrap();
        }

        let stems = list_json_stems(temp.path()).await.unwrap();
        assert_eq!(stems, vec!["a".to_string(), "b".to_string()]);

        let none = list_json_stems(&temp.path().join("nope")).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_remove_if_exists() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("x.json");
        std::fs::write(&file, "{}").unwrap();

        assert!(remove_if_exists(&file).await.unwrap());
        assert!(!remove_if_exists(&file).await.unwrap());
    }
}
