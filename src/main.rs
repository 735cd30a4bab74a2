use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use review_lens::cli::{Cli, CliCommand};
use review_lens::config::Config;
use review_lens::error::{Error, Result};
use review_lens::fetcher::{Fetcher, UreqTransport};
use review_lens::filter::FilterState;
use review_lens::github::Repository;
use review_lens::model::{AnalysisResult, DateRange};
use review_lens::orchestrator::{Analyzer, AnalyzerSettings, StderrReporter};
use review_lens::overrides::{FileOverrideStorage, ManualOverrideStore, OverrideToggle};
use review_lens::report::{self, ReportView};
use review_lens::state::StateManager;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli.command, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: CliCommand, config: Config) -> Result<()> {
    let overrides = ManualOverrideStore::new(FileOverrideStorage::new(&config.state_dir));

    match command {
        CliCommand::Analyze {
            owner,
            repo,
            since,
            until,
            output,
            top,
            ..
        } => {
            let state = StateManager::new(&config.state_dir);
            let repository = resolve_repository(&state, owner, repo)?;
            let range = DateRange::parse(&since, &until)?;

            let fetcher = Fetcher::new(Arc::new(UreqTransport::new()), config.token())
                .with_graphql_url(config.graphql_url.clone());
            let analyzer = Analyzer::new(Arc::new(fetcher), AnalyzerSettings::from(&config));
            let result = analyzer.analyze(&repository, range, &StderrReporter).await?;

            if let Err(e) = state.set_last_repository(&repository.owner, &repository.name) {
                warn!(error = %e, "failed to remember repository");
            }
            if let Some(path) = output {
                std::fs::write(&path, result.to_json()?)?;
                info!(path = %path.display(), "wrote analysis export");
            }

            let mut decorated = result.clone();
            overrides.apply(&mut decorated.pull_requests)?;
            print_report(&decorated, &FilterState::default(), config.similarity_threshold, top);
        }
        CliCommand::Report {
            file,
            priorities,
            acceptance,
            top,
        } => {
            let mut result = load_export(&file)?;
            overrides.apply(&mut result.pull_requests)?;
            let state = FilterState::from_selection(&priorities, acceptance);
            print_report(&result, &state, config.similarity_threshold, top);
        }
        CliCommand::Override { url, not_accepted } => {
            let url = url.trim();
            if url.is_empty() {
                return Err(Error::InvalidInput("issue URL must not be empty".to_string()));
            }
            match overrides.set(url, !not_accepted)? {
                OverrideToggle::Set { accepted: true } => {
                    println!("Override set: {url} marked accepted")
                }
                OverrideToggle::Set { accepted: false } => {
                    println!("Override set: {url} marked not accepted")
                }
                OverrideToggle::Removed => {
                    println!("Override removed: {url} uses automatic detection again")
                }
            }
        }
        CliCommand::Overrides => {
            let stored = overrides.get()?;
            if stored.is_empty() {
                println!("No manual overrides.");
            }
            for (url, record) in &stored {
                let decision = if record.accepted { "accepted" } else { "not accepted" };
                println!("{url}\t{decision}\t{}", record.timestamp.to_rfc3339());
            }
        }
    }
    Ok(())
}

/// Owner/repo from the flags, falling back to the last analyzed pair.
fn resolve_repository(
    state: &StateManager,
    owner: Option<String>,
    repo: Option<String>,
) -> Result<Repository> {
    let last = state.last_repository();
    let owner = owner.or_else(|| last.as_ref().map(|l| l.owner.clone()));
    let repo = repo.or_else(|| last.as_ref().map(|l| l.repo.clone()));
    match (owner, repo) {
        (Some(owner), Some(repo)) => Repository::new(&owner, &repo),
        _ => Err(Error::InvalidInput(
            "no repository given: pass --owner and --repo".to_string(),
        )),
    }
}

fn load_export(path: &Path) -> Result<AnalysisResult> {
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    AnalysisResult::from_json(&content)
}

fn print_report(result: &AnalysisResult, state: &FilterState, threshold: f64, top: usize) {
    let view = ReportView::build(&result.pull_requests, state, threshold);
    println!("{}", report::render_summary(result));
    println!();
    println!("{}", report::render_counts(state, &view.counts));
    println!();
    println!("{}", report::render_groups(&view.groups, top));
}
