//! Slug-keyed scan outcome store.
//!
//! One JSON object per state file: `{ "<slug>": { revision, status,
//! timestamp } }`. Entries are overwritten wholesale on each terminal
//! outcome; no history is kept. Reads fail open (missing or corrupt file
//! reads as empty) while writes are atomic via temp-then-rename so a crash
//! mid-write cannot corrupt the store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStateEntry {
    pub revision: String,
    pub status: ScanOutcome,
    /// ISO-8601 instant of the recording.
    pub timestamp: String,
}

pub struct ScanStateStore {
    path: PathBuf,
}

impl ScanStateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self, slug: &str) -> Option<ScanStateEntry> {
        self.load().remove(slug)
    }

    pub fn load(&self) -> BTreeMap<String, ScanStateEntry> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %err,
                        "scan state unreadable, treating as empty"
                    );
                }
                return BTreeMap::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "scan state corrupt, treating as empty"
                );
                BTreeMap::new()
            }
        }
    }

    pub fn record(&self, slug: &str, entry: ScanStateEntry) -> Result<()> {
        let mut entries = self.load();
        entries.insert(slug.to_string(), entry);

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
                parent
            }
            _ => Path::new("."),
        };
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("scan-state");
        let tmp_path = parent.join(format!(".{file_name}.tmp"));

        let payload =
            serde_json::to_vec_pretty(&entries).context("serialize scan state")?;
        fs::write(&tmp_path, payload)
            .with_context(|| format!("write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("publish {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(revision: &str, status: ScanOutcome) -> ScanStateEntry {
        ScanStateEntry {
            revision: revision.to_string(),
            status,
            timestamp: "2026-08-06T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn records_and_reads_back_entries() {
        let dir = TempDir::new().unwrap();
        let store = ScanStateStore::new(dir.path().join("state.json"));

        store.record("tool", entry("r1", ScanOutcome::Success)).unwrap();
        store.record("other", entry("r9", ScanOutcome::Failed)).unwrap();

        assert_eq!(store.entry("tool"), Some(entry("r1", ScanOutcome::Success)));
        assert_eq!(store.entry("other"), Some(entry("r9", ScanOutcome::Failed)));
        assert_eq!(store.entry("missing"), None);
    }

    #[test]
    fn overwrites_prior_entry_wholesale() {
        let dir = TempDir::new().unwrap();
        let store = ScanStateStore::new(dir.path().join("state.json"));

        store.record("tool", entry("r1", ScanOutcome::Success)).unwrap();
        store.record("tool", entry("r2", ScanOutcome::Failed)).unwrap();

        assert_eq!(store.entry("tool"), Some(entry("r2", ScanOutcome::Failed)));
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn corrupt_store_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        let store = ScanStateStore::new(path);
        assert!(store.load().is_empty());
        // And recording over a corrupt file succeeds.
        store.record("tool", entry("r1", ScanOutcome::Success)).unwrap();
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = ScanStateStore::new(dir.path().join("nested").join("state.json"));
        store.record("tool", entry("r1", ScanOutcome::Success)).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["state.json"]);
    }

    #[test]
    fn missing_directory_is_created() {
        let dir = TempDir::new().unwrap();
        let store = ScanStateStore::new(dir.path().join("a/b/state.json"));
        store.record("tool", entry("r1", ScanOutcome::Success)).unwrap();
        assert!(store.path().is_file());
    }
}
