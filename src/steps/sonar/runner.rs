//! Shell `sonar-scanner` invocation with output capture and a wall-clock
//! timeout.
//!
//! Child output goes to anonymous temp files instead of pipes so a chatty
//! scanner cannot deadlock the single-threaded wait.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Outcome of one scanner subprocess run.
#[derive(Debug, Clone)]
pub struct ScannerInvocation {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Server-side task id parsed from the scanner report output, when
    /// present; polled for completion in synchronous wait mode.
    pub task_id: Option<String>,
    pub analysis_url: Option<String>,
}

pub trait SonarScanner {
    fn submit(&self, repo_path: &Path, host_url: &str, token: &str) -> Result<ScannerInvocation>;
}

pub struct ShellSonarScanner {
    executable: String,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl ShellSonarScanner {
    pub fn new(executable: &str, extra_args: &[String], timeout: Duration) -> Self {
        Self {
            executable: executable.to_string(),
            extra_args: extra_args.to_vec(),
            timeout,
        }
    }
}

impl SonarScanner for ShellSonarScanner {
    fn submit(&self, repo_path: &Path, host_url: &str, token: &str) -> Result<ScannerInvocation> {
        let mut stdout_capture = tempfile::tempfile().context("create stdout capture file")?;
        let mut stderr_capture = tempfile::tempfile().context("create stderr capture file")?;

        let mut command = Command::new(&self.executable);
        command
            .arg(format!("-Dsonar.host.url={host_url}"))
            .arg(format!("-Dsonar.token={token}"))
            .args(&self.extra_args)
            .current_dir(repo_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(
                stdout_capture.try_clone().context("clone stdout capture")?,
            ))
            .stderr(Stdio::from(
                stderr_capture.try_clone().context("clone stderr capture")?,
            ));

        let mut child = command.spawn().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound
                && which::which(&self.executable).is_err()
            {
                anyhow!(
                    "scanner executable '{}' was not found in PATH",
                    self.executable
                )
            } else {
                anyhow::Error::new(err).context(format!("spawn {}", self.executable))
            }
        })?;

        let status = match child
            .wait_timeout(self.timeout)
            .context("wait for scanner")?
        {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(anyhow!(
                    "scanner timed out after {}s in {}",
                    self.timeout.as_secs(),
                    repo_path.display()
                ));
            }
        };

        let stdout = read_capture(&mut stdout_capture).context("read scanner stdout")?;
        let stderr = read_capture(&mut stderr_capture).context("read scanner stderr")?;
        let task_id = extract_ce_task_id(&stdout).or_else(|| extract_ce_task_id(&stderr));
        let analysis_url =
            extract_analysis_url(&stdout).or_else(|| extract_analysis_url(&stderr));

        Ok(ScannerInvocation {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
            task_id,
            analysis_url,
        })
    }
}

fn read_capture(file: &mut File) -> Result<String> {
    file.seek(SeekFrom::Start(0)).context("rewind capture")?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).context("read capture")?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// The scanner prints the report-processing URL on success; the capture
/// group is the CE task id.
pub(crate) fn extract_ce_task_id(text: &str) -> Option<String> {
    let pattern = Regex::new(r"https?://[^\s]*/api/ce/task\?id=([A-Za-z0-9\-]+)")
        .expect("regex for ce task url");
    pattern
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

pub(crate) fn extract_analysis_url(text: &str) -> Option<String> {
    let pattern =
        Regex::new(r"https?://[^\s]*dashboard\?id=[^\s]+").expect("regex for analysis url");
    pattern.find(text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCANNER_OUTPUT: &str = "\
INFO: ANALYSIS SUCCESSFUL, you can find the results at: https://sonar.example.com/dashboard?id=acme_tool
INFO: More about the report processing at https://sonar.example.com/api/ce/task?id=AYx-12ab
INFO: Analysis total time: 12.345 s";

    #[test]
    fn extracts_ce_task_id() {
        assert_eq!(
            extract_ce_task_id(SCANNER_OUTPUT).as_deref(),
            Some("AYx-12ab")
        );
        assert_eq!(extract_ce_task_id("no urls here"), None);
    }

    #[test]
    fn extracts_analysis_url() {
        assert_eq!(
            extract_analysis_url(SCANNER_OUTPUT).as_deref(),
            Some("https://sonar.example.com/dashboard?id=acme_tool")
        );
        assert_eq!(extract_analysis_url("nothing"), None);
    }
}
