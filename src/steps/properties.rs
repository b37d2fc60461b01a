//! Scanner configuration file generation at the repository root.

use anyhow::{Context, Result};
use std::fs;

use crate::context::{Metadata, RunContext, StepResult};
use crate::pipeline::Step;
use crate::util::sanitize_component;

pub const STEP_NAME: &str = "sonar-properties";

const PROPERTIES_FILENAME: &str = "sonar-project.properties";
const JAVA_BINARIES_PATH: &str = "target/classes";

/// Writes `sonar-project.properties` from the detected extensions.
///
/// Language priority when several extensions are present: java, then
/// typescript, then javascript, then python, else a generic template.
pub struct SonarPropertiesStep {
    overwrite: bool,
}

impl SonarPropertiesStep {
    pub fn new(overwrite: bool) -> Self {
        Self { overwrite }
    }
}

impl Step for SonarPropertiesStep {
    fn name(&self) -> &str {
        STEP_NAME
    }

    fn execute(&mut self, ctx: &mut RunContext) -> Result<StepResult> {
        let target_path = ctx.local_path.join(PROPERTIES_FILENAME);
        let mut metadata = Metadata::new();
        metadata.insert(
            "path".to_string(),
            serde_json::json!(target_path.display().to_string()),
        );

        if target_path.exists() && !self.overwrite {
            metadata.insert("written".to_string(), serde_json::json!(false));
            metadata.insert("reason".to_string(), serde_json::json!("exists"));
            return Ok(StepResult::ok(
                STEP_NAME,
                format!("{PROPERTIES_FILENAME} already exists, skipped"),
            )
            .with_metadata(metadata));
        }

        let language = select_language(ctx);
        let content = build_content(ctx, language);
        fs::write(&target_path, content)
            .with_context(|| format!("write {}", target_path.display()))?;

        metadata.insert("written".to_string(), serde_json::json!(true));
        metadata.insert("language_template".to_string(), serde_json::json!(language));
        Ok(StepResult::ok(STEP_NAME, format!("{PROPERTIES_FILENAME} written"))
            .with_metadata(metadata))
    }
}

fn select_language(ctx: &RunContext) -> &'static str {
    let has = |ext: &str| ctx.detected_extensions.iter().any(|e| e == ext);
    if has(".java") {
        "java"
    } else if has(".ts") {
        "typescript"
    } else if has(".js") {
        "javascript"
    } else if has(".py") {
        "python"
    } else {
        "generic"
    }
}

fn build_content(ctx: &RunContext, language: &str) -> String {
    let project_key = sanitize_component(&format!(
        "{}_{}",
        ctx.workspace_id, ctx.repository.slug
    ));
    let mut lines = vec![
        format!("sonar.projectKey={project_key}"),
        format!("sonar.projectName={}", ctx.repository.name),
        "sonar.sources=.".to_string(),
        "sonar.sourceEncoding=UTF-8".to_string(),
    ];
    if language == "java" {
        lines.push(format!("sonar.java.binaries={JAVA_BINARIES_PATH}"));
    }
    lines.join("\n") + "\n"
}
