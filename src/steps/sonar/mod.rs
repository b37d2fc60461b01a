//! Scanner submission step: revision de-dup, submission pacing, and the
//! sync/async wait protocol around the remote compute-engine task.

pub mod ce;
pub mod runner;
pub mod state;

use anyhow::Result;
use chrono::Utc;
use std::time::Duration;

use crate::config::{SonarConfig, WaitMode};
use crate::context::{Metadata, RunContext, StepResult};
use crate::git::{GitClient, ShellGitClient};
use crate::pipeline::Step;
use crate::util::{error_chain_message, truncate_string};

use ce::{CeTaskClient, CeTaskSnapshot, CeTaskStatus, Clock, HttpCeTaskClient, SystemClock};
use runner::{ShellSonarScanner, SonarScanner};
use state::{ScanOutcome, ScanStateEntry, ScanStateStore};

pub const STEP_NAME: &str = "sonar-scan";

const OUTPUT_SNIPPET_BYTES: usize = 4096;

pub struct SonarScanStep {
    settings: SonarConfig,
    scanner: Box<dyn SonarScanner>,
    ce_client: Box<dyn CeTaskClient>,
    git: Box<dyn GitClient>,
    clock: Box<dyn Clock>,
    state: ScanStateStore,
    submitted_once: bool,
}

enum WaitOutcome {
    Terminal(CeTaskSnapshot),
    TimedOut { last_error: Option<String> },
}

impl SonarScanStep {
    pub fn new(
        settings: SonarConfig,
        scanner: Box<dyn SonarScanner>,
        ce_client: Box<dyn CeTaskClient>,
        git: Box<dyn GitClient>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let state = ScanStateStore::new(settings.state_store_path.clone());
        Self {
            settings,
            scanner,
            ce_client,
            git,
            clock,
            state,
            submitted_once: false,
        }
    }

    /// Production wiring: shell scanner, HTTP CE client, shell git, real clock.
    pub fn from_config(settings: &SonarConfig) -> Self {
        let scanner = ShellSonarScanner::new(
            &settings.scanner_executable,
            &settings.scanner_args,
            settings.scanner_timeout,
        );
        let ce_client = HttpCeTaskClient::new(settings.poll_interval + Duration::from_secs(5));
        Self::new(
            settings.clone(),
            Box::new(scanner),
            Box::new(ce_client),
            Box::new(ShellGitClient::new()),
            Box::new(SystemClock),
        )
    }

    fn wait_for_task(&self, host_url: &str, token: &str, task_id: &str) -> WaitOutcome {
        let started = self.clock.now();
        let mut last_error = None;
        loop {
            if self.clock.now().duration_since(started) >= self.settings.poll_timeout {
                return WaitOutcome::TimedOut { last_error };
            }
            match self.ce_client.poll_task(host_url, token, task_id) {
                Ok(snapshot) if snapshot.status.is_terminal() => {
                    return WaitOutcome::Terminal(snapshot)
                }
                Ok(snapshot) => {
                    tracing::debug!(task_id, status = snapshot.status.as_str(), "task still running");
                }
                Err(err) => {
                    // Transient poll failures keep polling until the deadline.
                    last_error = Some(error_chain_message(&err));
                }
            }
            self.clock.sleep(self.settings.poll_interval);
        }
    }

    /// Persist the terminal outcome. A write failure downgrades an otherwise
    /// successful result; the de-dup record must be durable.
    fn finish(
        &self,
        slug: &str,
        revision: Option<&str>,
        outcome: ScanOutcome,
        mut result: StepResult,
    ) -> StepResult {
        let Some(revision) = revision else {
            result
                .metadata
                .insert("state_recorded".to_string(), serde_json::json!(false));
            return result;
        };
        let entry = ScanStateEntry {
            revision: revision.to_string(),
            status: outcome,
            timestamp: Utc::now().to_rfc3339(),
        };
        match self.state.record(slug, entry) {
            Ok(()) => {
                result
                    .metadata
                    .insert("state_recorded".to_string(), serde_json::json!(true));
                result
            }
            Err(err) => {
                let detail = error_chain_message(&err);
                result
                    .metadata
                    .insert("state_recorded".to_string(), serde_json::json!(false));
                result
                    .metadata
                    .insert("state_error".to_string(), serde_json::json!(detail));
                if result.success {
                    result.success = false;
                    result.message =
                        format!("{} but recording scan state failed: {detail}", result.message);
                }
                result
            }
        }
    }
}

impl Step for SonarScanStep {
    fn name(&self) -> &str {
        STEP_NAME
    }

    fn execute(&mut self, ctx: &mut RunContext) -> Result<StepResult> {
        let slug = ctx.repository.slug.clone();
        let mut metadata = Metadata::new();
        metadata.insert("repo_slug".to_string(), serde_json::json!(slug));
        metadata.insert(
            "wait_mode".to_string(),
            serde_json::json!(self.settings.wait_mode),
        );
        metadata.insert(
            "skip_unchanged".to_string(),
            serde_json::json!(self.settings.skip_unchanged),
        );
        metadata.insert("force".to_string(), serde_json::json!(self.settings.force));

        let Some(host_url) = self.settings.host_url.clone() else {
            return Ok(StepResult::failed(
                STEP_NAME,
                "Missing scanner host URL (SONARQUBE_URL or SONAR_HOST_URL)",
            )
            .with_metadata(metadata));
        };
        let Some(token) = self.settings.auth_token.clone() else {
            return Ok(StepResult::failed(
                STEP_NAME,
                "Missing scanner token (SONARQUBE_TOKEN or SONAR_TOKEN)",
            )
            .with_metadata(metadata));
        };

        let revision = match self.git.current_revision(&ctx.local_path) {
            Ok(revision) => Some(revision),
            Err(err) => {
                tracing::debug!(
                    repo = %slug,
                    error = %error_chain_message(&err),
                    "revision lookup failed; de-dup disabled for this repository"
                );
                None
            }
        };
        metadata.insert("revision".to_string(), serde_json::json!(revision));

        if self.settings.skip_unchanged && !self.settings.force {
            if let Some(revision) = &revision {
                if let Some(entry) = self.state.entry(&slug) {
                    if entry.status == ScanOutcome::Success && entry.revision == *revision {
                        metadata.insert("skipped".to_string(), serde_json::json!(true));
                        metadata.insert("reason".to_string(), serde_json::json!("unchanged"));
                        metadata
                            .insert("final_status".to_string(), serde_json::json!("skipped"));
                        tracing::info!(repo = %slug, revision = %revision, "scan skipped, repository unchanged");
                        return Ok(StepResult::ok(
                            STEP_NAME,
                            "Scan skipped (repository unchanged)",
                        )
                        .with_metadata(metadata));
                    }
                }
            }
        }

        // Fixed-delay pacing, waived for the run's first submission.
        if self.submitted_once && self.settings.submission_delay > Duration::ZERO {
            self.clock.sleep(self.settings.submission_delay);
        }

        let invocation = match self.scanner.submit(&ctx.local_path, &host_url, &token) {
            Ok(invocation) => invocation,
            Err(err) => {
                let message = format!("Scanner invocation failed: {}", error_chain_message(&err));
                metadata.insert("final_status".to_string(), serde_json::json!("failed"));
                let result = StepResult::failed(STEP_NAME, message).with_metadata(metadata);
                return Ok(self.finish(&slug, revision.as_deref(), ScanOutcome::Failed, result));
            }
        };
        self.submitted_once = true;

        metadata.insert(
            "exit_code".to_string(),
            serde_json::json!(invocation.exit_code),
        );
        metadata.insert(
            "ce_task_id".to_string(),
            serde_json::json!(invocation.task_id),
        );
        metadata.insert(
            "analysis_url".to_string(),
            serde_json::json!(invocation.analysis_url),
        );
        metadata.insert(
            "stdout".to_string(),
            serde_json::json!(truncate_string(&invocation.stdout, OUTPUT_SNIPPET_BYTES)),
        );
        metadata.insert(
            "stderr".to_string(),
            serde_json::json!(truncate_string(&invocation.stderr, OUTPUT_SNIPPET_BYTES)),
        );

        let (success, message, final_status) = if invocation.exit_code != 0 {
            (
                false,
                format!("Scan failed (scanner exit code {})", invocation.exit_code),
                "failed".to_string(),
            )
        } else {
            match self.settings.wait_mode {
                WaitMode::Async => {
                    metadata.insert("status".to_string(), serde_json::json!("submitted"));
                    (true, "Scan submitted".to_string(), "submitted".to_string())
                }
                WaitMode::Sync => match invocation.task_id.as_deref() {
                    None => (
                        false,
                        "Scan submitted but no CE task id was found".to_string(),
                        "failed".to_string(),
                    ),
                    Some(task_id) => match self.wait_for_task(&host_url, &token, task_id) {
                        WaitOutcome::Terminal(snapshot) => {
                            metadata.insert(
                                "ce_task_status".to_string(),
                                serde_json::json!(snapshot.status.as_str()),
                            );
                            metadata.insert(
                                "ce_analysis_id".to_string(),
                                serde_json::json!(snapshot.analysis_id),
                            );
                            metadata.insert(
                                "ce_component_key".to_string(),
                                serde_json::json!(snapshot.component_key),
                            );
                            metadata.insert(
                                "ce_error_message".to_string(),
                                serde_json::json!(snapshot.error_message),
                            );
                            if snapshot.status == CeTaskStatus::Success {
                                (
                                    true,
                                    "Scan completed and processed".to_string(),
                                    "success".to_string(),
                                )
                            } else {
                                (
                                    false,
                                    format!(
                                        "Scan submitted but processing ended with status {}",
                                        snapshot.status.as_str()
                                    ),
                                    snapshot.status.as_str().to_string(),
                                )
                            }
                        }
                        WaitOutcome::TimedOut { last_error } => {
                            metadata.insert(
                                "ce_task_status".to_string(),
                                serde_json::json!("timeout"),
                            );
                            metadata
                                .insert("ce_poll_error".to_string(), serde_json::json!(last_error));
                            (
                                false,
                                format!(
                                    "Scan submitted but processing wait timed out after {}s",
                                    self.settings.poll_timeout.as_secs()
                                ),
                                "timeout".to_string(),
                            )
                        }
                    },
                },
            }
        };

        metadata.insert("final_status".to_string(), serde_json::json!(final_status));
        let result = if success {
            StepResult::ok(STEP_NAME, message)
        } else {
            StepResult::failed(STEP_NAME, message)
        }
        .with_metadata(metadata);

        let outcome = if success {
            ScanOutcome::Success
        } else {
            ScanOutcome::Failed
        };
        Ok(self.finish(&slug, revision.as_deref(), outcome, result))
    }
}
