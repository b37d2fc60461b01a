//! Per-repository language rows in a shared CSV report.
//!
//! Idempotency: by default an existing row for the same workspace+slug is
//! left alone; with `regenerate` the row is rewritten in place. The format
//! is plain RFC-4180 with minimal quoting; the example corpus carries no
//! CSV crate, so reading and writing live here with their own tests.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::context::{Metadata, RunContext, StepResult};
use crate::pipeline::Step;

pub const STEP_NAME: &str = "language-report";

const FIELDNAMES: [&str; 5] = [
    "workspace",
    "repo_name",
    "repo_slug",
    "local_path",
    "extensions",
];
const EXTENSIONS_DELIMITER: &str = ";";

pub struct LanguageReportCsvStep {
    report_csv_path: PathBuf,
    regenerate: bool,
}

impl LanguageReportCsvStep {
    pub fn new(report_csv_path: PathBuf, regenerate: bool) -> Self {
        Self {
            report_csv_path,
            regenerate,
        }
    }

    fn read_rows(&self) -> Result<Vec<Vec<String>>> {
        if !self.report_csv_path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.report_csv_path)
            .with_context(|| format!("read {}", self.report_csv_path.display()))?;
        let mut rows = parse_csv(&content);
        if !rows.is_empty() {
            // Drop the header; it is rewritten on every save.
            rows.remove(0);
        }
        Ok(rows)
    }

    fn write_rows(&self, rows: &[Vec<String>]) -> Result<()> {
        let mut out = String::new();
        out.push_str(&format_row(&FIELDNAMES.map(String::from)));
        out.push('\n');
        for row in rows {
            out.push_str(&format_row(row));
            out.push('\n');
        }
        fs::write(&self.report_csv_path, out)
            .with_context(|| format!("write {}", self.report_csv_path.display()))
    }
}

impl Step for LanguageReportCsvStep {
    fn name(&self) -> &str {
        STEP_NAME
    }

    fn execute(&mut self, ctx: &mut RunContext) -> Result<StepResult> {
        if let Some(parent) = self.report_csv_path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }

        let extensions = ctx
            .detected_extensions
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(EXTENSIONS_DELIMITER);
        let target_row = vec![
            ctx.workspace_id.clone(),
            ctx.repository.name.clone(),
            ctx.repository.slug.clone(),
            ctx.local_path.display().to_string(),
            extensions,
        ];

        let mut rows = self.read_rows()?;
        let existing_index = rows.iter().position(|row| {
            row.first().map(String::as_str) == Some(ctx.workspace_id.as_str())
                && row.get(2).map(String::as_str) == Some(ctx.repository.slug.as_str())
        });

        let mut metadata = Metadata::new();
        metadata.insert(
            "csv_path".to_string(),
            serde_json::json!(self.report_csv_path.display().to_string()),
        );
        metadata.insert("regenerate".to_string(), serde_json::json!(self.regenerate));

        if existing_index.is_some() && !self.regenerate {
            metadata.insert("row_written".to_string(), serde_json::json!(false));
            return Ok(
                StepResult::ok(STEP_NAME, "CSV row already exists, skipped").with_metadata(metadata)
            );
        }

        match existing_index {
            Some(index) => rows[index] = target_row,
            None => rows.push(target_row),
        }
        self.write_rows(&rows)?;

        metadata.insert("row_written".to_string(), serde_json::json!(true));
        Ok(StepResult::ok(STEP_NAME, "CSV row written").with_metadata(metadata))
    }
}

fn format_row(fields: &[String]) -> String {
    fields
        .iter()
        .map(|field| quote_field(field))
        .collect::<Vec<_>>()
        .join(",")
}

fn quote_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Minimal CSV reader: handles quoted fields, escaped quotes, and embedded
/// newlines. A trailing newline does not produce an empty record.
fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(ch),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}
