//! Language detection from file extensions.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::context::{Metadata, RunContext, StepResult};
use crate::pipeline::Step;

pub const STEP_NAME: &str = "languages";

/// Scans the repository tree and records which of the configured extensions
/// are present on `RunContext::detected_extensions`.
pub struct DetectLanguagesStep {
    extensions: Vec<String>,
}

impl DetectLanguagesStep {
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: normalize_extensions(extensions),
        }
    }
}

impl Step for DetectLanguagesStep {
    fn name(&self) -> &str {
        STEP_NAME
    }

    fn execute(&mut self, ctx: &mut RunContext) -> Result<StepResult> {
        if self.extensions.is_empty() {
            return Ok(StepResult::failed(
                STEP_NAME,
                "No extensions configured for language detection",
            ));
        }

        let mut detected = BTreeSet::new();
        scan_directory(&ctx.local_path, &self.extensions, &mut detected)?;

        let mut metadata = Metadata::new();
        metadata.insert(
            "extensions".to_string(),
            serde_json::json!(detected.iter().collect::<Vec<_>>()),
        );
        let message = format!("Detected {} extensions", detected.len());
        ctx.detected_extensions = detected;

        Ok(StepResult::ok(STEP_NAME, message).with_metadata(metadata))
    }
}

/// Lowercase, dot-prefix, and deduplicate while preserving first-seen order.
fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    let mut normalized = Vec::new();
    let mut seen = BTreeSet::new();
    for item in extensions {
        let ext = item.trim().to_ascii_lowercase();
        if ext.is_empty() {
            continue;
        }
        let ext = if ext.starts_with('.') {
            ext
        } else {
            format!(".{ext}")
        };
        if seen.insert(ext.clone()) {
            normalized.push(ext);
        }
    }
    normalized
}

fn scan_directory(
    root: &Path,
    extensions: &[String],
    detected: &mut BTreeSet<String>,
) -> Result<()> {
    let entries = fs::read_dir(root).with_context(|| format!("read {}", root.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry under {}", root.display()))?;
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|name| name == ".git") {
                continue;
            }
            scan_directory(&path, extensions, detected)?;
        } else if path.is_file() {
            if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
                let suffix = format!(".{}", ext.to_ascii_lowercase());
                if extensions.contains(&suffix) {
                    detected.insert(suffix);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Repository;
    use std::fs;
    use tempfile::TempDir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalizes_extension_input() {
        let normalized = normalize_extensions(&strings(&[".PY", "ts", " ", ".py", "Java"]));
        assert_eq!(normalized, [".py", ".ts", ".java"]);
    }

    #[test]
    fn detects_extensions_and_skips_git_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("src/app.py"), "print()").unwrap();
        fs::write(dir.path().join("src/Main.JAVA"), "class Main {}").unwrap();
        fs::write(dir.path().join("readme.md"), "# readme").unwrap();
        fs::write(dir.path().join(".git/config.py"), "ignored").unwrap();

        let mut ctx = RunContext::new(
            "ws",
            Repository {
                name: "Repo".to_string(),
                slug: "repo".to_string(),
                clone_url: "url".to_string(),
            },
            dir.path().to_path_buf(),
        );
        let mut step = DetectLanguagesStep::new(&strings(&[".py", ".java"]));
        let result = step.execute(&mut ctx).unwrap();

        assert!(result.success);
        let detected: Vec<&str> = ctx.detected_extensions.iter().map(String::as_str).collect();
        assert_eq!(detected, [".java", ".py"]);
        assert_eq!(result.metadata["extensions"], serde_json::json!([".java", ".py"]));
    }

    #[test]
    fn empty_configuration_reports_failure() {
        let dir = TempDir::new().unwrap();
        let mut ctx = RunContext::new(
            "ws",
            Repository {
                name: "Repo".to_string(),
                slug: "repo".to_string(),
                clone_url: "url".to_string(),
            },
            dir.path().to_path_buf(),
        );
        let mut step = DetectLanguagesStep::new(&[]);
        let result = step.execute(&mut ctx).unwrap();
        assert!(!result.success);
    }
}
