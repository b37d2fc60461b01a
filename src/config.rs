//! Configuration resolution: one explicit structure built at startup.
//!
//! Every option resolves as flag > environment variable > default, matching
//! the env surface documented on the CLI flags. Environment access goes
//! through an injected lookup; `ScanConfig::resolve` passes `std::env::var`.

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::ScanArgs;
use crate::provider::BitbucketAuth;
use crate::util::{expand_tilde, is_truthy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum ProviderKind {
    Bitbucket,
    Github,
    Gitlab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum SelectionMode {
    First,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[value(rename_all = "lower")]
#[serde(rename_all = "snake_case")]
pub enum WaitMode {
    Sync,
    Async,
}

/// Up-front repository selection, applied once before the scan loop.
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    pub repo_slug: Option<String>,
    pub mode: SelectionMode,
    pub max_repos: Option<usize>,
    pub random_seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct LanguagesConfig {
    pub extensions: Vec<String>,
    pub report_csv_path: PathBuf,
    pub regenerate_report: bool,
}

/// Scanner-submission step settings, resolved once per run.
#[derive(Debug, Clone)]
pub struct SonarConfig {
    pub host_url: Option<String>,
    pub auth_token: Option<String>,
    pub wait_mode: WaitMode,
    pub submission_delay: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub skip_unchanged: bool,
    pub force: bool,
    pub state_store_path: PathBuf,
    pub scanner_executable: String,
    pub scanner_args: Vec<String>,
    pub scanner_timeout: Duration,
    pub overwrite_properties: bool,
}

#[derive(Debug, Clone)]
pub struct BitbucketConfig {
    pub api_base_url: String,
    pub token: Option<String>,
    pub username: Option<String>,
    pub app_password: Option<String>,
    pub timeout: Duration,
}

impl BitbucketConfig {
    pub fn auth(&self) -> Result<BitbucketAuth> {
        if let Some(token) = &self.token {
            return Ok(BitbucketAuth::Bearer(token.clone()));
        }
        if let (Some(username), Some(app_password)) = (&self.username, &self.app_password) {
            return Ok(BitbucketAuth::Basic {
                username: username.clone(),
                app_password: app_password.clone(),
            });
        }
        Err(anyhow!(
            "Missing Bitbucket authentication. Set BITBUCKET_TOKEN or BITBUCKET_USERNAME/BITBUCKET_APP_PASSWORD"
        ))
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub provider: ProviderKind,
    pub workspace: String,
    pub base_dir: PathBuf,
    pub dry_run: bool,
    pub stop_on_error: bool,
    pub steps: Vec<String>,
    pub selection: SelectionConfig,
    pub languages: LanguagesConfig,
    pub sonar: SonarConfig,
    pub bitbucket: BitbucketConfig,
}

pub const DEFAULT_STEPS: [&str; 4] = [
    crate::steps::languages::STEP_NAME,
    crate::steps::report::STEP_NAME,
    crate::steps::properties::STEP_NAME,
    crate::steps::sonar::STEP_NAME,
];

const DEFAULT_EXTENSIONS: &str = ".java,.ts,.js,.py";
const DEFAULT_BITBUCKET_API_BASE: &str = "https://api.bitbucket.org/2.0";

impl ScanConfig {
    pub fn resolve(args: &ScanArgs) -> Result<Self> {
        Self::resolve_with(args, |key| std::env::var(key).ok())
    }

    pub fn resolve_with(
        args: &ScanArgs,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let env = |key: &str| lookup(key).and_then(normalize_empty);

        let provider = match args.provider {
            Some(provider) => provider,
            None => match env("GIT_PROVIDER") {
                Some(raw) => parse_value_enum::<ProviderKind>(&raw, "GIT_PROVIDER")?,
                None => return Err(anyhow!("Missing provider. Use --provider or set GIT_PROVIDER")),
            },
        };

        let workspace = pick(args.workspace.as_deref(), env("GIT_WORKSPACE"))
            .ok_or_else(|| anyhow!("Missing workspace. Use --workspace or set GIT_WORKSPACE"))?;

        let base_dir_raw = pick(args.base_dir.as_deref(), env("BASE_DIR"))
            .ok_or_else(|| anyhow!("Missing base directory. Use --base-dir or set BASE_DIR"))?;
        let base_dir = expand_tilde(&base_dir_raw);

        let selection = Self::resolve_selection(args, &env)?;
        let steps = Self::resolve_steps(args, &env);
        let languages = Self::resolve_languages(args, &env, &base_dir);
        let sonar = Self::resolve_sonar(args, &env, &base_dir)?;
        let bitbucket = Self::resolve_bitbucket(&env)?;

        Ok(Self {
            provider,
            workspace,
            base_dir,
            dry_run: args.dry_run,
            stop_on_error: args.stop_on_error,
            steps,
            selection,
            languages,
            sonar,
            bitbucket,
        })
    }

    fn resolve_selection(
        args: &ScanArgs,
        env: &impl Fn(&str) -> Option<String>,
    ) -> Result<SelectionConfig> {
        let mode = match args.selection {
            Some(mode) => mode,
            None => match env("GIT_REPO_SELECTION") {
                Some(raw) => parse_value_enum::<SelectionMode>(&raw, "GIT_REPO_SELECTION")?,
                None => SelectionMode::First,
            },
        };

        let max_repos = match (args.max_repos, env("GIT_MAX_REPOS")) {
            (Some(value), _) => Some(value),
            (None, Some(raw)) => Some(
                raw.parse::<usize>()
                    .with_context(|| format!("GIT_MAX_REPOS must be an integer, got '{raw}'"))?,
            ),
            (None, None) => None,
        };
        if max_repos == Some(0) {
            return Err(anyhow!("GIT_MAX_REPOS/--max-repos must be greater than 0"));
        }

        let random_seed = match (args.random_seed, env("GIT_RANDOM_SEED")) {
            (Some(value), _) => Some(value),
            (None, Some(raw)) => Some(
                raw.parse::<u64>()
                    .with_context(|| format!("GIT_RANDOM_SEED must be an integer, got '{raw}'"))?,
            ),
            (None, None) => None,
        };

        Ok(SelectionConfig {
            repo_slug: pick(args.repo_slug.as_deref(), env("GIT_REPO_SLUG")),
            mode,
            max_repos,
            random_seed,
        })
    }

    fn resolve_steps(args: &ScanArgs, env: &impl Fn(&str) -> Option<String>) -> Vec<String> {
        let raw = pick(args.steps.as_deref(), env("WORKSWEEP_STEPS"));
        match raw {
            Some(raw) => split_list(&raw),
            None => DEFAULT_STEPS.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn resolve_languages(
        args: &ScanArgs,
        env: &impl Fn(&str) -> Option<String>,
        base_dir: &std::path::Path,
    ) -> LanguagesConfig {
        let raw = pick(args.languages.as_deref(), env("LANGUAGE_EXTENSIONS"))
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.to_string());
        let report_csv_path = pick(args.language_report_csv.as_deref(), env("LANGUAGE_REPORT_CSV"))
            .map(|raw| expand_tilde(&raw))
            .unwrap_or_else(|| base_dir.join("language-report.csv"));
        LanguagesConfig {
            extensions: split_list(&raw),
            report_csv_path,
            regenerate_report: args.regenerate_report,
        }
    }

    fn resolve_sonar(
        args: &ScanArgs,
        env: &impl Fn(&str) -> Option<String>,
        base_dir: &std::path::Path,
    ) -> Result<SonarConfig> {
        let host_url = pick(args.sonar_url.as_deref(), env("SONARQUBE_URL"))
            .or_else(|| env("SONAR_HOST_URL"))
            .map(|url| url.trim_end_matches('/').to_string());
        let auth_token =
            pick(args.sonar_token.as_deref(), env("SONARQUBE_TOKEN")).or_else(|| env("SONAR_TOKEN"));

        let wait_mode = match args.wait_mode {
            Some(mode) => mode,
            None => match env("SONAR_WAIT_MODE") {
                Some(raw) => parse_value_enum::<WaitMode>(&raw, "SONAR_WAIT_MODE")?,
                None => WaitMode::Sync,
            },
        };

        let submission_delay = seconds_option(
            args.submission_delay,
            env("SONAR_SUBMISSION_DELAY_SECONDS"),
            "SONAR_SUBMISSION_DELAY_SECONDS",
            0.0,
        )?
        .max(0.0);
        let poll_interval = seconds_option(
            args.poll_interval,
            env("SONAR_POLL_INTERVAL_SECONDS"),
            "SONAR_POLL_INTERVAL_SECONDS",
            5.0,
        )?
        .max(0.1);
        let poll_timeout = seconds_option(
            args.poll_timeout,
            env("SONAR_WAIT_TIMEOUT_SECONDS"),
            "SONAR_WAIT_TIMEOUT_SECONDS",
            1800.0,
        )?
        .max(1.0);
        let scanner_timeout = seconds_option(
            args.scanner_timeout,
            env("SONAR_SCANNER_TIMEOUT_SECONDS"),
            "SONAR_SCANNER_TIMEOUT_SECONDS",
            1800.0,
        )?
        .max(1.0);

        let skip_unchanged = if args.no_skip_unchanged {
            false
        } else {
            env("SONAR_SKIP_UNCHANGED").map_or(true, |raw| is_truthy(&raw))
        };
        let force = args.force_scan || env("SONAR_FORCE_SCAN").is_some_and(|raw| is_truthy(&raw));

        let state_store_path = pick(args.state_file.as_deref(), env("SONAR_STATE_FILE"))
            .map(|raw| expand_tilde(&raw))
            .unwrap_or_else(|| base_dir.join(".worksweep").join("sonar-state.json"));

        let scanner_executable = pick(
            args.scanner_executable.as_deref(),
            env("SONAR_SCANNER_EXECUTABLE"),
        )
        .unwrap_or_else(|| "sonar-scanner".to_string());

        let scanner_args = match pick(args.scanner_args.as_deref(), env("SONAR_SCANNER_ARGS")) {
            Some(raw) => shell_words::split(&raw)
                .with_context(|| format!("parse scanner arguments '{raw}'"))?,
            None => Vec::new(),
        };

        Ok(SonarConfig {
            host_url,
            auth_token,
            wait_mode,
            submission_delay: Duration::from_secs_f64(submission_delay),
            poll_interval: Duration::from_secs_f64(poll_interval),
            poll_timeout: Duration::from_secs_f64(poll_timeout),
            skip_unchanged,
            force,
            state_store_path,
            scanner_executable,
            scanner_args,
            scanner_timeout: Duration::from_secs_f64(scanner_timeout),
            overwrite_properties: args.overwrite_properties,
        })
    }

    fn resolve_bitbucket(env: &impl Fn(&str) -> Option<String>) -> Result<BitbucketConfig> {
        let timeout_seconds = match env("BITBUCKET_TIMEOUT_SECONDS") {
            Some(raw) => raw
                .parse::<f64>()
                .with_context(|| format!("BITBUCKET_TIMEOUT_SECONDS must be a number, got '{raw}'"))?,
            None => 30.0,
        };
        Ok(BitbucketConfig {
            api_base_url: env("BITBUCKET_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BITBUCKET_API_BASE.to_string()),
            token: env("BITBUCKET_TOKEN"),
            username: env("BITBUCKET_USERNAME"),
            app_password: env("BITBUCKET_APP_PASSWORD"),
            timeout: Duration::from_secs_f64(timeout_seconds.max(1.0)),
        })
    }
}

fn pick(flag: Option<&str>, env_value: Option<String>) -> Option<String> {
    flag.and_then(|value| normalize_empty(value.to_string()))
        .or(env_value)
}

fn normalize_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_value_enum<T: ValueEnum>(raw: &str, source: &str) -> Result<T> {
    T::from_str(raw, true).map_err(|_| {
        let allowed = T::value_variants()
            .iter()
            .filter_map(|variant| variant.to_possible_value())
            .map(|value| value.get_name().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        anyhow!("Invalid {source} value '{raw}'. Allowed values: {allowed}")
    })
}

fn seconds_option(
    flag: Option<f64>,
    env_value: Option<String>,
    source: &str,
    default: f64,
) -> Result<f64> {
    match (flag, env_value) {
        (Some(value), _) => Ok(value),
        (None, Some(raw)) => raw
            .parse::<f64>()
            .with_context(|| format!("{source} must be a number, got '{raw}'")),
        (None, None) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn resolve(args: &ScanArgs, pairs: &[(&str, &str)]) -> Result<ScanConfig> {
        let env = env_map(pairs);
        ScanConfig::resolve_with(args, |key| env.get(key).cloned())
    }

    fn minimal_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("GIT_PROVIDER", "bitbucket"),
            ("GIT_WORKSPACE", "acme"),
            ("BASE_DIR", "/tmp/repos"),
        ]
    }

    #[test]
    fn missing_workspace_is_rejected() {
        let err = resolve(&ScanArgs::default(), &[("GIT_PROVIDER", "bitbucket")]).unwrap_err();
        assert!(err.to_string().contains("GIT_WORKSPACE"));
    }

    #[test]
    fn flags_override_environment() {
        let args = ScanArgs {
            workspace: Some("from-flag".to_string()),
            ..ScanArgs::default()
        };
        let config = resolve(&args, &minimal_env()).unwrap();
        assert_eq!(config.workspace, "from-flag");
    }

    #[test]
    fn defaults_are_applied() {
        let config = resolve(&ScanArgs::default(), &minimal_env()).unwrap();
        assert_eq!(config.steps, DEFAULT_STEPS);
        assert_eq!(config.selection.mode, SelectionMode::First);
        assert_eq!(config.sonar.wait_mode, WaitMode::Sync);
        assert!(config.sonar.skip_unchanged);
        assert!(!config.sonar.force);
        assert_eq!(config.sonar.poll_interval, Duration::from_secs(5));
        assert_eq!(
            config.sonar.state_store_path,
            PathBuf::from("/tmp/repos/.worksweep/sonar-state.json")
        );
        assert_eq!(
            config.languages.extensions,
            vec![".java", ".ts", ".js", ".py"]
        );
    }

    #[test]
    fn sonar_url_env_fallback_order() {
        let mut env = minimal_env();
        env.push(("SONAR_HOST_URL", "https://fallback.example.com/"));
        let config = resolve(&ScanArgs::default(), &env).unwrap();
        assert_eq!(
            config.sonar.host_url.as_deref(),
            Some("https://fallback.example.com")
        );

        let mut env = minimal_env();
        env.push(("SONAR_HOST_URL", "https://fallback.example.com"));
        env.push(("SONARQUBE_URL", "https://primary.example.com"));
        let config = resolve(&ScanArgs::default(), &env).unwrap();
        assert_eq!(
            config.sonar.host_url.as_deref(),
            Some("https://primary.example.com")
        );
    }

    #[test]
    fn zero_max_repos_is_rejected() {
        let mut env = minimal_env();
        env.push(("GIT_MAX_REPOS", "0"));
        let err = resolve(&ScanArgs::default(), &env).unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
    }

    #[test]
    fn invalid_selection_mode_lists_choices() {
        let mut env = minimal_env();
        env.push(("GIT_REPO_SELECTION", "newest"));
        let err = resolve(&ScanArgs::default(), &env).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("first"));
        assert!(message.contains("random"));
    }

    #[test]
    fn poll_interval_is_clamped() {
        let args = ScanArgs {
            poll_interval: Some(0.0),
            ..ScanArgs::default()
        };
        let config = resolve(&args, &minimal_env()).unwrap();
        assert_eq!(config.sonar.poll_interval, Duration::from_secs_f64(0.1));
    }

    #[test]
    fn scanner_args_are_shell_split() {
        let mut env = minimal_env();
        env.push(("SONAR_SCANNER_ARGS", "-Dsonar.foo=bar '-Dsonar.name=two words'"));
        let config = resolve(&ScanArgs::default(), &env).unwrap();
        assert_eq!(
            config.sonar.scanner_args,
            vec!["-Dsonar.foo=bar", "-Dsonar.name=two words"]
        );
    }

    #[test]
    fn truthy_env_toggles() {
        let mut env = minimal_env();
        env.push(("SONAR_SKIP_UNCHANGED", "off"));
        env.push(("SONAR_FORCE_SCAN", "yes"));
        let config = resolve(&ScanArgs::default(), &env).unwrap();
        assert!(!config.sonar.skip_unchanged);
        assert!(config.sonar.force);
    }

    #[test]
    fn bitbucket_auth_prefers_token() {
        let bitbucket = BitbucketConfig {
            api_base_url: DEFAULT_BITBUCKET_API_BASE.to_string(),
            token: Some("t".to_string()),
            username: Some("u".to_string()),
            app_password: Some("p".to_string()),
            timeout: Duration::from_secs(30),
        };
        assert!(matches!(bitbucket.auth().unwrap(), BitbucketAuth::Bearer(_)));

        let missing = BitbucketConfig {
            token: None,
            username: None,
            app_password: None,
            ..bitbucket
        };
        assert!(missing.auth().is_err());
    }
}
