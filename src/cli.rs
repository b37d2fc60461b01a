//! CLI argument parsing for the workspace scan workflow.
//!
//! Flags mirror the environment surface one-to-one; resolution order is
//! always flag > environment variable > default and happens in `config`,
//! not here.

use clap::{Parser, Subcommand};

use crate::config::{ProviderKind, SelectionMode, WaitMode};

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "worksweep",
    version,
    about = "Sync every repository of a workspace and run an analysis pipeline per repo",
    after_help = "Examples:\n  worksweep scan --provider bitbucket --workspace acme --base-dir ~/repos\n  worksweep scan --workspace acme --base-dir ~/repos --steps languages,language-report\n  worksweep scan --workspace acme --base-dir ~/repos --dry-run --json\n  worksweep steps",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Command {
    Scan(ScanArgs),
    /// List the step names accepted by --steps, in their default order
    Steps,
}

/// Scan command inputs. Every option falls back to an environment variable.
#[derive(Parser, Debug, Default)]
#[command(about = "Sync and analyze every repository in a workspace")]
pub struct ScanArgs {
    /// Git hosting provider (GIT_PROVIDER); only bitbucket is implemented
    #[arg(long, value_enum)]
    pub provider: Option<ProviderKind>,

    /// Workspace identifier (GIT_WORKSPACE)
    #[arg(long, value_name = "ID")]
    pub workspace: Option<String>,

    /// Local base directory for repository clones (BASE_DIR)
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<String>,

    /// Process only the repository with this slug (GIT_REPO_SLUG)
    #[arg(long, value_name = "SLUG")]
    pub repo_slug: Option<String>,

    /// Process at most N repositories (GIT_MAX_REPOS)
    #[arg(long, value_name = "N")]
    pub max_repos: Option<usize>,

    /// How to pick repositories when --max-repos truncates (GIT_REPO_SELECTION)
    #[arg(long, value_enum)]
    pub selection: Option<SelectionMode>,

    /// Seed for the random selection mode (GIT_RANDOM_SEED)
    #[arg(long, value_name = "SEED")]
    pub random_seed: Option<u64>,

    /// Comma-separated ordered step list (WORKSWEEP_STEPS)
    #[arg(long, value_name = "LIST")]
    pub steps: Option<String>,

    /// Comma-separated file extensions for language detection (LANGUAGE_EXTENSIONS)
    #[arg(long, value_name = "LIST")]
    pub languages: Option<String>,

    /// Destination of the per-repository language CSV report (LANGUAGE_REPORT_CSV)
    #[arg(long, value_name = "PATH")]
    pub language_report_csv: Option<String>,

    /// Rewrite existing CSV rows instead of skipping them
    #[arg(long)]
    pub regenerate_report: bool,

    /// Scanner server URL (SONARQUBE_URL, then SONAR_HOST_URL)
    #[arg(long, value_name = "URL")]
    pub sonar_url: Option<String>,

    /// Scanner auth token (SONARQUBE_TOKEN, then SONAR_TOKEN)
    #[arg(long, value_name = "TOKEN")]
    pub sonar_token: Option<String>,

    /// Wait for server-side scan completion or submit and continue (SONAR_WAIT_MODE)
    #[arg(long, value_enum)]
    pub wait_mode: Option<WaitMode>,

    /// Fixed delay in seconds between scanner submissions (SONAR_SUBMISSION_DELAY_SECONDS)
    #[arg(long, value_name = "SECONDS")]
    pub submission_delay: Option<f64>,

    /// Poll interval in seconds for synchronous waiting (SONAR_POLL_INTERVAL_SECONDS)
    #[arg(long, value_name = "SECONDS")]
    pub poll_interval: Option<f64>,

    /// Maximum synchronous wait in seconds per scan (SONAR_WAIT_TIMEOUT_SECONDS)
    #[arg(long, value_name = "SECONDS")]
    pub poll_timeout: Option<f64>,

    /// Always submit, even when the revision was already scanned successfully
    #[arg(long)]
    pub no_skip_unchanged: bool,

    /// Force a scan even when the revision did not change (SONAR_FORCE_SCAN)
    #[arg(long)]
    pub force_scan: bool,

    /// Scan state store location (SONAR_STATE_FILE)
    #[arg(long, value_name = "PATH")]
    pub state_file: Option<String>,

    /// Scanner executable to invoke (SONAR_SCANNER_EXECUTABLE)
    #[arg(long, value_name = "BIN")]
    pub scanner_executable: Option<String>,

    /// Extra scanner arguments as one shell-quoted string (SONAR_SCANNER_ARGS)
    #[arg(long, value_name = "ARGS")]
    pub scanner_args: Option<String>,

    /// Scanner subprocess timeout in seconds (SONAR_SCANNER_TIMEOUT_SECONDS)
    #[arg(long, value_name = "SECONDS")]
    pub scanner_timeout: Option<f64>,

    /// Overwrite an existing sonar-project.properties
    #[arg(long)]
    pub overwrite_properties: bool,

    /// Report planned work without touching the filesystem or any remote
    #[arg(long)]
    pub dry_run: bool,

    /// Stop after the first repository that fails
    #[arg(long)]
    pub stop_on_error: bool,

    /// Emit the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,
}
