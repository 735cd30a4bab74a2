use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_BATCH_PAUSE_MS, DEFAULT_BATCH_SIZE};
use crate::error::{Error, Result};
use crate::extractor;
use crate::fetcher::{DEFAULT_API_URL, Fetcher, RateLimit};
use crate::github::comments::{CommentCollector, DEFAULT_BOT_LOGIN};
use crate::github::threads::ThreadResolver;
use crate::github::{Repository, SearchItem, search_closed_pull_requests};
use crate::model::{AcceptanceMethod, AnalysisResult, DateRange, PullRequest, Summary};

/// Snapshot emitted after each batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub rate_limit: Option<RateLimit>,
}

/// Observer for analysis progress. Implementations must not block.
pub trait ProgressReporter: Send + Sync {
    fn progress(&self, progress: &Progress);
}

impl<F> ProgressReporter for F
where
    F: Fn(&Progress) + Send + Sync,
{
    fn progress(&self, progress: &Progress) {
        self(progress)
    }
}

/// Default reporter that prints to stderr.
pub struct StderrReporter;

impl ProgressReporter for StderrReporter {
    fn progress(&self, progress: &Progress) {
        match &progress.rate_limit {
            Some(rl) => eprintln!(
                "[review-lens] Processed {}/{} PRs (API quota {}/{})",
                progress.current, progress.total, rl.remaining, rl.limit
            ),
            None => eprintln!(
                "[review-lens] Processed {}/{} PRs",
                progress.current, progress.total
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub api_url: String,
    pub bot_login: String,
    pub batch_size: usize,
    pub batch_pause: Duration,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            bot_login: DEFAULT_BOT_LOGIN.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause: Duration::from_millis(DEFAULT_BATCH_PAUSE_MS),
        }
    }
}

impl From<&Config> for AnalyzerSettings {
    fn from(config: &Config) -> Self {
        Self {
            api_url: config.api_url.clone(),
            bot_login: config.bot_login.clone(),
            batch_size: config.batch_size,
            batch_pause: config.batch_pause,
        }
    }
}

/// Runs search, batched per-PR processing and aggregation.
pub struct Analyzer {
    fetcher: Arc<Fetcher>,
    collector: Arc<CommentCollector>,
    resolver: Arc<ThreadResolver>,
    settings: AnalyzerSettings,
}

impl Analyzer {
    pub fn new(fetcher: Arc<Fetcher>, settings: AnalyzerSettings) -> Self {
        let collector = Arc::new(CommentCollector::new(
            Arc::clone(&fetcher),
            &settings.api_url,
            &settings.bot_login,
        ));
        let resolver = Arc::new(ThreadResolver::new(Arc::clone(&fetcher)));
        Self {
            fetcher,
            collector,
            resolver,
            settings,
        }
    }

    /// Analyze closed PRs of `repo` created within `range`.
    ///
    /// Only the search itself is fatal; per-PR failures degrade that PR to
    /// "no issues" and are logged. PRs without issues are left out of the
    /// result but still count towards `totalPRs`.
    pub async fn analyze(
        &self,
        repo: &Repository,
        range: DateRange,
        reporter: &dyn ProgressReporter,
    ) -> Result<AnalysisResult> {
        if self.settings.batch_size == 0 {
            return Err(Error::InvalidInput("batch size must be > 0".to_string()));
        }

        info!(repo = %repo, range = %range, "searching closed pull requests");
        let items = search_closed_pull_requests(&self.fetcher, &self.settings.api_url, repo, &range)
            .await
            .map_err(|e| search_error(e, repo))?;
        let total = items.len();
        info!(total, "found pull requests");

        let batches: Vec<&[SearchItem]> = items.chunks(self.settings.batch_size).collect();
        let batch_count = batches.len();
        let mut pull_requests = Vec::new();
        let mut current = 0;

        for (batch_index, batch) in batches.into_iter().enumerate() {
            debug!(batch = batch_index + 1, of = batch_count, size = batch.len(), "processing batch");
            let results = self.process_batch(repo, batch).await;
            current += batch.len();
            pull_requests.extend(results.into_iter().flatten());

            reporter.progress(&Progress {
                current,
                total,
                rate_limit: self.fetcher.rate_limit(),
            });

            if batch_index + 1 < batch_count && !self.settings.batch_pause.is_zero() {
                tokio::time::sleep(self.settings.batch_pause).await;
            }
        }

        let summary = Summary::compute(total, &pull_requests);
        info!(
            prs_with_issues = summary.total_prs_with_issues,
            issues = summary.total_issues,
            "analysis complete"
        );
        Ok(AnalysisResult {
            repository_identifier: repo.to_string(),
            date_range: range,
            summary,
            pull_requests,
        })
    }

    /// Process one batch concurrently. Output order follows `batch`; PRs that
    /// yield no issues (or whose task failed) are `None`.
    async fn process_batch(
        &self,
        repo: &Repository,
        batch: &[SearchItem],
    ) -> Vec<Option<PullRequest>> {
        let mut join_set = JoinSet::new();
        for (index, item) in batch.iter().enumerate() {
            let collector = Arc::clone(&self.collector);
            let resolver = Arc::clone(&self.resolver);
            let repo = repo.clone();
            let item = item.clone();
            join_set.spawn(async move {
                (index, process_pull_request(&collector, &resolver, &repo, item).await)
            });
        }

        let mut results: Vec<Option<PullRequest>> = vec![None; batch.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, pr)) => results[index] = pr,
                Err(e) => warn!(error = %e, "pull request task failed"),
            }
        }
        results
    }
}

/// Collect comments and thread resolution in parallel, then extract issues.
async fn process_pull_request(
    collector: &CommentCollector,
    resolver: &ThreadResolver,
    repo: &Repository,
    item: SearchItem,
) -> Option<PullRequest> {
    let (comments, resolution) = tokio::join!(
        collector.collect(repo, item.number),
        resolver.resolve(repo, item.number)
    );

    let issues: Vec<_> = comments
        .iter()
        .filter_map(|comment| {
            let mut issue = extractor::parse(&comment.body)?.into_issue(&comment.url, &comment.created_at);
            if resolution.is_resolved(comment.kind, comment.id, &comment.url) {
                issue.record_acceptance(AcceptanceMethod::ResolvedViaQuery);
            }
            Some(issue)
        })
        .collect();

    debug!(pr = item.number, comments = comments.len(), issues = issues.len(), "processed pull request");
    if issues.is_empty() {
        return None;
    }

    let author = item.author();
    Some(PullRequest {
        id: item.number,
        title: item.title,
        url: item.html_url,
        state: item.state,
        author,
        created_at: item.created_at,
        issues,
    })
}

fn search_error(e: Error, repo: &Repository) -> Error {
    match e {
        Error::AuthRequired | Error::RateLimitExceeded { .. } | Error::Search(_) => e,
        Error::NotFound(_) => Error::NotFound(format!(
            "repository {repo} (check the owner and repository name, or provide a token for private repositories)"
        )),
        other => Error::Search(other.to_string()),
    }
}
