use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fetcher::Fetcher;

use super::Repository;
use super::comments::CommentKind;

const REVIEW_THREADS_QUERY: &str = r#"
    query ReviewThreads($owner: String!, $repo: String!, $number: Int!) {
        repository(owner: $owner, name: $repo) {
            pullRequest(number: $number) {
                reviewThreads(first: 100) {
                    nodes {
                        isResolved
                        comments(first: 100) {
                            nodes { databaseId url }
                        }
                    }
                }
            }
        }
    }
"#;

// ---------------------------------------------------------------------------
// GraphQL response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryNode {
    pull_request: Option<PullRequestNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestNode {
    review_threads: ThreadConnection,
}

#[derive(Debug, Deserialize)]
struct ThreadConnection {
    nodes: Vec<ThreadNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadNode {
    is_resolved: bool,
    comments: CommentConnection,
}

#[derive(Debug, Deserialize)]
struct CommentConnection {
    nodes: Vec<ThreadComment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadComment {
    database_id: Option<u64>,
    url: Option<String>,
}

/// Comments that belong to resolved review threads of one PR.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadResolution {
    resolved_ids: HashSet<u64>,
    resolved_urls: HashSet<String>,
}

impl ThreadResolution {
    /// Whether the comment sits in a resolved thread, matched by URL. Thread
    /// comment ids are review-comment ids, so only inline comments match by id.
    pub fn is_resolved(&self, kind: CommentKind, comment_id: u64, comment_url: &str) -> bool {
        self.resolved_urls.contains(comment_url)
            || (kind == CommentKind::Inline && self.resolved_ids.contains(&comment_id))
    }

    pub fn is_empty(&self) -> bool {
        self.resolved_ids.is_empty() && self.resolved_urls.is_empty()
    }

    fn from_threads(threads: Vec<ThreadNode>) -> Self {
        let mut resolution = Self::default();
        for thread in threads.into_iter().filter(|t| t.is_resolved) {
            for comment in thread.comments.nodes {
                if let Some(id) = comment.database_id {
                    resolution.resolved_ids.insert(id);
                }
                if let Some(url) = comment.url {
                    resolution.resolved_urls.insert(url);
                }
            }
        }
        resolution
    }
}

/// Looks up review-thread resolution state through the GraphQL API.
pub struct ThreadResolver {
    fetcher: Arc<Fetcher>,
}

impl ThreadResolver {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Resolution info for a PR. Failures degrade to "nothing resolved".
    pub async fn resolve(&self, repo: &Repository, number: u64) -> ThreadResolution {
        match self.try_resolve(repo, number).await {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(pr = number, error = %e, "failed to query review threads; continuing without resolution info");
                ThreadResolution::default()
            }
        }
    }

    async fn try_resolve(&self, repo: &Repository, number: u64) -> Result<ThreadResolution> {
        let data = self
            .fetcher
            .graphql(
                REVIEW_THREADS_QUERY,
                serde_json::json!({
                    "owner": repo.owner,
                    "repo": repo.name,
                    "number": number,
                }),
            )
            .await?;

        let repository: Option<RepositoryNode> =
            serde_json::from_value(data.get("repository").cloned().unwrap_or_default())
                .map_err(|e| Error::Network(format!("failed to parse review threads: {e}")))?;

        let threads = repository
            .and_then(|r| r.pull_request)
            .map(|pr| pr.review_threads.nodes)
            .unwrap_or_default();

        let resolution = ThreadResolution::from_threads(threads);
        debug!(
            pr = number,
            resolved_comments = resolution.resolved_urls.len(),
            "fetched review thread resolution"
        );
        Ok(resolution)
    }
}
