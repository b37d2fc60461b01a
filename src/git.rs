//! Shell git client used for repository sync and revision lookup.

use anyhow::{anyhow, Context, Result};
use std::io;
use std::path::Path;
use std::process::{Command, Output};

pub trait GitClient {
    fn clone_repo(&self, clone_url: &str, local_path: &Path) -> Result<()>;
    fn pull(&self, local_path: &Path) -> Result<()>;
    /// Current commit hash of the checked-out work tree.
    fn current_revision(&self, local_path: &Path) -> Result<String>;
}

pub struct ShellGitClient {
    executable: String,
}

impl ShellGitClient {
    pub fn new() -> Self {
        Self {
            executable: "git".to_string(),
        }
    }

    fn run_git(&self, args: &[&str], cwd: Option<&Path>) -> Result<Output> {
        let mut command = Command::new(&self.executable);
        command.args(args);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        command.output().map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound && which::which(&self.executable).is_err() {
                anyhow!("git executable '{}' was not found in PATH", self.executable)
            } else {
                anyhow::Error::new(err).context(format!("run git {}", args.join(" ")))
            }
        })
    }

    fn check_status(&self, verb: &str, output: &Output, path: &Path) -> Result<()> {
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(anyhow!(
            "git {} failed for {} ({}): {}",
            verb,
            path.display(),
            output.status,
            stderr.trim()
        ))
    }
}

impl Default for ShellGitClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GitClient for ShellGitClient {
    fn clone_repo(&self, clone_url: &str, local_path: &Path) -> Result<()> {
        let path = local_path
            .to_str()
            .ok_or_else(|| anyhow!("local path {} is not valid UTF-8", local_path.display()))?;
        let output = self.run_git(&["clone", clone_url, path], None)?;
        self.check_status("clone", &output, local_path)
    }

    fn pull(&self, local_path: &Path) -> Result<()> {
        let output = self.run_git(&["pull", "--ff-only"], Some(local_path))?;
        self.check_status("pull", &output, local_path)
    }

    fn current_revision(&self, local_path: &Path) -> Result<String> {
        let output = self.run_git(&["rev-parse", "HEAD"], Some(local_path))?;
        self.check_status("rev-parse", &output, local_path)
            .context("resolve current revision")?;
        let revision = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if revision.is_empty() {
            return Err(anyhow!(
                "git rev-parse returned an empty revision for {}",
                local_path.display()
            ));
        }
        Ok(revision)
    }
}
