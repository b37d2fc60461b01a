//! Core data records threaded through a scan run.
//!
//! These types carry no behavior beyond construction helpers; every decision
//! lives in the orchestrator, the pipeline, or the individual steps.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Free-form key/value payload attached to step results and run contexts.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// One repository as listed by the hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    pub name: String,
    /// Stable, path-safe identifier; names the local cache directory and
    /// keys the scan state store.
    pub slug: String,
    pub clone_url: String,
}

/// Mutable per-repository state shared by every pipeline step.
///
/// Created once per repository and passed by mutable reference through the
/// pipeline; later steps observe earlier steps' writes.
#[derive(Debug)]
pub struct RunContext {
    pub workspace_id: String,
    pub repository: Repository,
    pub local_path: PathBuf,
    pub detected_extensions: BTreeSet<String>,
    pub metadata: Metadata,
}

impl RunContext {
    pub fn new(workspace_id: &str, repository: Repository, local_path: PathBuf) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            repository,
            local_path,
            detected_extensions: BTreeSet::new(),
            metadata: Metadata::new(),
        }
    }
}

/// Outcome of one step invocation. Failure is a value: a step that cannot
/// run reports `success: false` instead of aborting the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step_name: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl StepResult {
    pub fn ok(step_name: &str, message: impl Into<String>) -> Self {
        Self {
            step_name: step_name.to_string(),
            success: true,
            message: message.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn failed(step_name: &str, message: impl Into<String>) -> Self {
        Self {
            step_name: step_name.to_string(),
            success: false,
            message: message.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Sync operation decided for one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Clone,
    Pull,
}

/// Per-repository slice of the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct RepositorySummary {
    pub repository: Repository,
    pub sync_operation: SyncOperation,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub step_results: Vec<StepResult>,
}

/// Full outcome of one scan run, always produced even on early halt.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub per_repository: Vec<RepositorySummary>,
    pub successful_count: usize,
    pub failed_count: usize,
    pub planned_steps: Vec<String>,
}
