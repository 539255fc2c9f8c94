// Backlog persistence - prd.json on disk

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{Backlog, BacklogLoadError, PersistError};

/// Where the build loop reads and writes its backlog
pub trait BacklogStore: Send + Sync {
    fn load(&self) -> Result<Backlog, BacklogLoadError>;
    fn save(&self, backlog: &Backlog) -> Result<(), PersistError>;
}

/// JSON file store. Writes go to a sibling temp file which is then renamed
/// over the existing file, so a crash never leaves a half-written backlog.
#[derive(Debug, Clone)]
pub struct JsonBacklogStore {
    path: PathBuf,
}

impl JsonBacklogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "prd.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl BacklogStore for JsonBacklogStore {
    fn load(&self) -> Result<Backlog, BacklogLoadError> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                BacklogLoadError::NotFound(self.path.clone())
            } else {
                BacklogLoadError::Io {
                    path: self.path.clone(),
                    source: e,
                }
            }
        })?;

        parse_backlog(&contents, &self.path)
    }

    fn save(&self, backlog: &Backlog) -> Result<(), PersistError> {
        let mut contents = serde_json::to_string_pretty(backlog)?;
        contents.push('\n');

        let tmp = self.temp_path();
        fs::write(&tmp, &contents).map_err(|e| PersistError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| PersistError::Io {
            path: self.path.clone(),
            source: e,
        })?;

        tracing::debug!("Saved backlog to {}", self.path.display());
        Ok(())
    }
}

/// Parse and validate backlog JSON. `path` is only used in error messages.
pub fn parse_backlog(contents: &str, path: &Path) -> Result<Backlog, BacklogLoadError> {
    let invalid = |reason: String| BacklogLoadError::Invalid {
        path: path.to_path_buf(),
        reason,
    };

    let value: Value =
        serde_json::from_str(contents).map_err(|e| BacklogLoadError::Malformed {
            path: path.to_path_buf(),
            source: e,
        })?;

    let Some(object) = value.as_object() else {
        return Err(invalid("top level must be a JSON object".to_string()));
    };
    match object.get("userStories") {
        None => return Err(invalid("missing 'userStories'".to_string())),
        Some(v) if !v.is_array() => {
            return Err(invalid("'userStories' must be a list".to_string()))
        }
        Some(_) => {}
    }

    let backlog: Backlog =
        serde_json::from_value(value).map_err(|e| BacklogLoadError::Malformed {
            path: path.to_path_buf(),
            source: e,
        })?;
    backlog.validate().map_err(invalid)?;

    Ok(backlog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::{Story, StoryStatus};

    const PRD: &str = r#"{
  "project": "Calculator",
  "branchName": "ralph/calculator",
  "description": "A tiny calculator",
  "userStories": [
    {
      "id": "US-001",
      "title": "Add numbers",
      "description": "As a user I can add two numbers",
      "acceptanceCriteria": ["add(2, 3) returns 5", "Typecheck passes"],
      "priority": 1,
      "passes": false,
      "notes": ""
    }
  ]
}"#;

    fn write_prd(dir: &Path, contents: &str) -> JsonBacklogStore {
        let path = dir.join("prd.json");
        fs::write(&path, contents).unwrap();
        JsonBacklogStore::new(path)
    }

    // ── loading ────────────────────────────────────────────────────────────────

    #[test]
    fn test_load_valid_prd() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_prd(dir.path(), PRD);
        let backlog = store.load().unwrap();
        assert_eq!(backlog.project_name, "Calculator");
        assert_eq!(backlog.description.as_deref(), Some("A tiny calculator"));
        assert_eq!(backlog.stories.len(), 1);
        assert_eq!(backlog.stories[0].acceptance_criteria.len(), 2);
        assert_eq!(backlog.stories[0].status, StoryStatus::Pending);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonBacklogStore::new(dir.path().join("prd.json"));
        assert!(matches!(store.load(), Err(BacklogLoadError::NotFound(_))));
    }

    #[test]
    fn test_load_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_prd(dir.path(), "{ not json");
        assert!(matches!(
            store.load(),
            Err(BacklogLoadError::Malformed { .. })
        ));
    }

    #[test]
    fn test_load_missing_user_stories() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_prd(dir.path(), r#"{"project": "x"}"#);
        let err = store.load().unwrap_err();
        assert!(matches!(err, BacklogLoadError::Invalid { .. }));
        assert!(err.to_string().contains("userStories"));
    }

    #[test]
    fn test_load_user_stories_not_a_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_prd(dir.path(), r#"{"project": "x", "userStories": {}}"#);
        assert!(matches!(
            store.load(),
            Err(BacklogLoadError::Invalid { .. })
        ));
    }

    #[test]
    fn test_load_story_with_wrong_field_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_prd(
            dir.path(),
            r#"{"project": "x", "userStories": [{"id": "A", "acceptanceCriteria": "nope"}]}"#,
        );
        assert!(matches!(
            store.load(),
            Err(BacklogLoadError::Malformed { .. })
        ));
    }

    // ── saving ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_save_then_load_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_prd(dir.path(), PRD);
        let mut backlog = store.load().unwrap();

        backlog.stories[0].start().unwrap();
        backlog.stories[0]
            .record_failure("Verification failed: add returns 6", 3)
            .unwrap();
        store.save(&backlog).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded, backlog);
        assert_eq!(reloaded.stories[0].attempt_count, 1);
        assert_eq!(reloaded.stories[0].notes.as_deref(), Some(""));
        assert!(!dir.path().join("prd.json.tmp").exists());
    }

    #[test]
    fn test_save_writes_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonBacklogStore::new(dir.path().join("prd.json"));
        store
            .save(&Backlog::new("p", vec![Story::new("A", "a")]))
            .unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"userStories\""));
        assert!(raw.contains("\"attemptCount\": 0"));
        assert!(raw.contains("\"failureReasons\": []"));
        assert!(raw.ends_with('\n'));
    }
}
