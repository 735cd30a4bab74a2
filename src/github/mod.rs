pub mod comments;
pub mod threads;

use std::fmt;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::model::DateRange;

/// `owner/name` pair identifying a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl Repository {
    pub fn new(owner: &str, name: &str) -> Result<Self> {
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() {
            return Err(Error::InvalidInput(
                "both owner and repository are required".to_string(),
            ));
        }
        let valid = |s: &str| {
            s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(owner) || !valid(name) {
            return Err(Error::InvalidInput(format!(
                "invalid repository identifier: {owner}/{name}"
            )));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhUser {
    pub login: String,
}

/// A pull request as returned by the issue search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchItem {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub state: String,
    pub user: Option<GhUser>,
    pub created_at: String,
}

impl SearchItem {
    pub fn author(&self) -> String {
        self.user
            .as_ref()
            .map(|u| u.login.clone())
            .unwrap_or_else(|| "ghost".to_string())
    }
}

/// Search query for closed PRs (merged or not) created within `range`.
pub fn search_query(repo: &Repository, range: &DateRange) -> String {
    format!(
        "type:pr is:closed repo:{repo} created:{}..{}",
        range.start, range.end
    )
}

pub fn search_url(api_url: &str, repo: &Repository, range: &DateRange) -> String {
    format!(
        "{}/search/issues?q={}&sort=created&order=desc",
        api_url.trim_end_matches('/'),
        urlencoding::encode(&search_query(repo, range))
    )
}

/// Find closed PRs created in `range`, newest first, capped at the search ceiling.
pub async fn search_closed_pull_requests(
    fetcher: &Fetcher,
    api_url: &str,
    repo: &Repository,
    range: &DateRange,
) -> Result<Vec<SearchItem>> {
    let url = search_url(api_url, repo, range);
    let items = fetcher.fetch_all_pages(&url).await?;
    let prs = items
        .into_iter()
        .map(serde_json::from_value::<SearchItem>)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Search(format!("failed to parse search results: {e}")))?;
    debug!(repo = %repo, count = prs.len(), "search returned pull requests");
    Ok(prs)
}
