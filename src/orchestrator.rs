//! Top-level scan loop: plan sync operations, run the pipeline per
//! repository, enforce the failure policy, and fold a run summary.
//!
//! Strictly sequential: a repository's pipeline (including any synchronous
//! scanner wait) completes before the next repository starts.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::{Path, PathBuf};

use crate::config::{SelectionConfig, SelectionMode};
use crate::context::{
    Repository, RepositorySummary, RunContext, RunSummary, SyncOperation,
};
use crate::fs::FileSystem;
use crate::git::GitClient;
use crate::pipeline::StepPipeline;
use crate::provider::GitProvider;
use crate::util::{error_chain_message, sanitize_component};

/// Run-wide orchestrator options.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub base_dir: PathBuf,
    pub dry_run: bool,
    pub stop_on_error: bool,
    pub selection: SelectionConfig,
}

/// Pure sync decision: clone when the local cache is absent, pull otherwise.
pub fn plan_sync(exists: bool) -> SyncOperation {
    if exists {
        SyncOperation::Pull
    } else {
        SyncOperation::Clone
    }
}

pub struct ScanOrchestrator {
    provider: Box<dyn GitProvider>,
    git: Box<dyn GitClient>,
    fs: Box<dyn FileSystem>,
    pipeline: StepPipeline,
}

impl ScanOrchestrator {
    pub fn new(
        provider: Box<dyn GitProvider>,
        git: Box<dyn GitClient>,
        fs: Box<dyn FileSystem>,
        pipeline: StepPipeline,
    ) -> Self {
        Self {
            provider,
            git,
            fs,
            pipeline,
        }
    }

    pub fn run(&mut self, workspace_id: &str, options: &ScanOptions) -> Result<RunSummary> {
        let listed = self
            .provider
            .list_repositories(workspace_id)
            .context("list workspace repositories")?;
        let total = listed.len();
        let repositories = select_repositories(listed, &options.selection);
        tracing::info!(
            workspace = workspace_id,
            listed = total,
            selected = repositories.len(),
            dry_run = options.dry_run,
            "starting scan run"
        );

        let planned_steps = self.pipeline.step_names();
        let mut per_repository = Vec::with_capacity(repositories.len());

        for repository in repositories {
            let summary = self.process_repository(workspace_id, repository, options);
            let failed = !summary.success;
            per_repository.push(summary);
            if failed && options.stop_on_error {
                tracing::warn!("stopping after first failed repository (stop-on-error)");
                break;
            }
        }

        let successful_count = per_repository.iter().filter(|s| s.success).count();
        let failed_count = per_repository.len() - successful_count;
        tracing::info!(successful_count, failed_count, "scan run finished");

        Ok(RunSummary {
            per_repository,
            successful_count,
            failed_count,
            planned_steps,
        })
    }

    fn process_repository(
        &mut self,
        workspace_id: &str,
        repository: Repository,
        options: &ScanOptions,
    ) -> RepositorySummary {
        let local_path = options
            .base_dir
            .join(sanitize_component(&repository.slug));
        let operation = plan_sync(self.fs.path_exists(&local_path));

        if options.dry_run {
            tracing::info!(
                repo = %repository.slug,
                operation = ?operation,
                "dry-run: would sync and run pipeline"
            );
            return RepositorySummary {
                repository,
                sync_operation: operation,
                success: true,
                error: None,
                step_results: Vec::new(),
            };
        }

        if let Err(err) = self.sync_repository(&repository, &local_path, operation, options) {
            let error = error_chain_message(&err);
            tracing::error!(repo = %repository.slug, error = %error, "sync failed");
            return RepositorySummary {
                repository,
                sync_operation: operation,
                success: false,
                error: Some(error),
                step_results: Vec::new(),
            };
        }

        let mut context = RunContext::new(workspace_id, repository.clone(), local_path);
        match self.pipeline.run(&mut context) {
            Ok(step_results) => RepositorySummary {
                repository,
                sync_operation: operation,
                success: true,
                error: None,
                step_results,
            },
            Err(err) => {
                let error = error_chain_message(&err);
                tracing::error!(repo = %repository.slug, error = %error, "pipeline faulted");
                RepositorySummary {
                    repository,
                    sync_operation: operation,
                    success: false,
                    error: Some(error),
                    step_results: Vec::new(),
                }
            }
        }
    }

    fn sync_repository(
        &self,
        repository: &Repository,
        local_path: &Path,
        operation: SyncOperation,
        options: &ScanOptions,
    ) -> Result<()> {
        self.fs.ensure_directory(&options.base_dir)?;
        match operation {
            SyncOperation::Clone => {
                let clone_url = self.provider.clone_url(repository);
                tracing::info!(repo = %repository.slug, "cloning");
                self.git.clone_repo(&clone_url, local_path)
            }
            SyncOperation::Pull => {
                tracing::info!(repo = %repository.slug, "pulling");
                self.git.pull(local_path)
            }
        }
    }
}

/// Apply the repository selection policy once, before the loop starts.
///
/// Order of application: single-slug filter, then `first N` truncation or a
/// seeded shuffle for `random N`. Listing order is preserved except under
/// the random mode.
pub fn select_repositories(
    mut repositories: Vec<Repository>,
    selection: &SelectionConfig,
) -> Vec<Repository> {
    if let Some(slug) = &selection.repo_slug {
        repositories.retain(|repository| repository.slug == *slug);
    }
    let Some(max_repos) = selection.max_repos else {
        return repositories;
    };
    if repositories.len() <= max_repos {
        return repositories;
    }
    match selection.mode {
        SelectionMode::First => repositories.truncate(max_repos),
        SelectionMode::Random => {
            let mut rng = match selection.random_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            repositories.shuffle(&mut rng);
            repositories.truncate(max_repos);
        }
    }
    repositories
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repos(slugs: &[&str]) -> Vec<Repository> {
        slugs
            .iter()
            .map(|slug| Repository {
                name: slug.to_string(),
                slug: slug.to_string(),
                clone_url: format!("https://example.invalid/{slug}.git"),
            })
            .collect()
    }

    fn selection(
        repo_slug: Option<&str>,
        mode: SelectionMode,
        max_repos: Option<usize>,
        random_seed: Option<u64>,
    ) -> SelectionConfig {
        SelectionConfig {
            repo_slug: repo_slug.map(str::to_string),
            mode,
            max_repos,
            random_seed,
        }
    }

    fn slugs(repositories: &[Repository]) -> Vec<&str> {
        repositories.iter().map(|r| r.slug.as_str()).collect()
    }

    #[test]
    fn plan_is_clone_when_missing_and_pull_when_present() {
        assert_eq!(plan_sync(false), SyncOperation::Clone);
        assert_eq!(plan_sync(true), SyncOperation::Pull);
    }

    #[test]
    fn no_selection_keeps_listing_order() {
        let selected = select_repositories(
            repos(&["a", "b", "c"]),
            &selection(None, SelectionMode::First, None, None),
        );
        assert_eq!(slugs(&selected), ["a", "b", "c"]);
    }

    #[test]
    fn slug_filter_applies_before_truncation() {
        let selected = select_repositories(
            repos(&["a", "b", "c"]),
            &selection(Some("b"), SelectionMode::First, Some(1), None),
        );
        assert_eq!(slugs(&selected), ["b"]);
    }

    #[test]
    fn first_mode_truncates() {
        let selected = select_repositories(
            repos(&["a", "b", "c", "d"]),
            &selection(None, SelectionMode::First, Some(2), None),
        );
        assert_eq!(slugs(&selected), ["a", "b"]);
    }

    #[test]
    fn seeded_random_selection_is_deterministic() {
        let first = select_repositories(
            repos(&["a", "b", "c", "d", "e"]),
            &selection(None, SelectionMode::Random, Some(2), Some(7)),
        );
        let second = select_repositories(
            repos(&["a", "b", "c", "d", "e"]),
            &selection(None, SelectionMode::Random, Some(2), Some(7)),
        );
        assert_eq!(slugs(&first), slugs(&second));
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn max_larger_than_listing_is_a_no_op() {
        let selected = select_repositories(
            repos(&["a", "b"]),
            &selection(None, SelectionMode::Random, Some(10), Some(1)),
        );
        assert_eq!(slugs(&selected), ["a", "b"], "order untouched when nothing to drop");
    }
}
