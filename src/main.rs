use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use worksweep::cli::{Command, RootArgs, ScanArgs};
use worksweep::config::{ProviderKind, ScanConfig};
use worksweep::context::{RunSummary, SyncOperation};
use worksweep::fs::LocalFileSystem;
use worksweep::git::ShellGitClient;
use worksweep::orchestrator::{ScanOptions, ScanOrchestrator};
use worksweep::provider::{BitbucketCloudProvider, GitProvider};
use worksweep::steps;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = RootArgs::parse();
    match args.command {
        Command::Scan(scan_args) => run_scan(&scan_args),
        Command::Steps => {
            for (name, description) in steps::available_steps() {
                println!("{name:<18} {description}");
            }
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_scan(args: &ScanArgs) -> Result<()> {
    let config = ScanConfig::resolve(args)?;
    let provider = build_provider(&config)?;
    let pipeline = steps::build_pipeline(&config)?;
    let mut orchestrator = ScanOrchestrator::new(
        provider,
        Box::new(ShellGitClient::new()),
        Box::new(LocalFileSystem),
        pipeline,
    );
    let options = ScanOptions {
        base_dir: config.base_dir.clone(),
        dry_run: config.dry_run,
        stop_on_error: config.stop_on_error,
        selection: config.selection.clone(),
    };

    let summary = orchestrator.run(&config.workspace, &options)?;

    if args.json {
        let text = serde_json::to_string_pretty(&summary)?;
        println!("{text}");
    } else {
        print_summary(&summary, config.dry_run);
    }

    if summary.failed_count > 0 {
        return Err(anyhow!(
            "{} of {} repositories failed",
            summary.failed_count,
            summary.per_repository.len()
        ));
    }
    Ok(())
}

fn build_provider(config: &ScanConfig) -> Result<Box<dyn GitProvider>> {
    match config.provider {
        ProviderKind::Bitbucket => {
            let auth = config.bitbucket.auth()?;
            Ok(Box::new(BitbucketCloudProvider::new(
                &config.bitbucket.api_base_url,
                auth,
                config.bitbucket.timeout,
            )))
        }
        ProviderKind::Github => Err(anyhow!(
            "provider 'github' is not implemented yet; only bitbucket is supported"
        )),
        ProviderKind::Gitlab => Err(anyhow!(
            "provider 'gitlab' is not implemented yet; only bitbucket is supported"
        )),
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    for repo in &summary.per_repository {
        let operation = match repo.sync_operation {
            SyncOperation::Clone => "clone",
            SyncOperation::Pull => "pull",
        };
        let status = if dry_run {
            "planned"
        } else if repo.success {
            "ok"
        } else {
            "failed"
        };
        println!("{operation:<7} {:<40} {status}", repo.repository.slug);
        if let Some(error) = &repo.error {
            println!("        {error}");
        }
        for step in &repo.step_results {
            if !step.success {
                println!("        step {}: {}", step.step_name, step.message);
            }
        }
    }
    println!(
        "{} succeeded, {} failed; steps: {}",
        summary.successful_count,
        summary.failed_count,
        summary.planned_steps.join(", ")
    );
}
