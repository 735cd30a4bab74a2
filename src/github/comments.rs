use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::fetcher::Fetcher;

use super::{GhUser, Repository};

pub const DEFAULT_BOT_LOGIN: &str = "coderabbitai[bot]";

/// Which endpoint a comment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    Review,
    Inline,
    General,
}

/// A bot comment normalized across the three comment endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct BotComment {
    pub id: u64,
    pub kind: CommentKind,
    pub body: String,
    pub url: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
struct GhComment {
    id: u64,
    body: Option<String>,
    html_url: String,
    user: Option<GhUser>,
    created_at: Option<String>,
    /// Reviews carry `submitted_at` instead of `created_at`.
    submitted_at: Option<String>,
}

/// Gathers one PR's comments authored by the review bot.
pub struct CommentCollector {
    fetcher: Arc<Fetcher>,
    api_url: String,
    bot_login: String,
}

impl CommentCollector {
    pub fn new(fetcher: Arc<Fetcher>, api_url: &str, bot_login: &str) -> Self {
        Self {
            fetcher,
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_login: bot_login.to_string(),
        }
    }

    /// Fetch review, inline and general comments concurrently and keep the
    /// bot's. Any fetch failure degrades the PR to no comments.
    pub async fn collect(&self, repo: &Repository, number: u64) -> Vec<BotComment> {
        match self.try_collect(repo, number).await {
            Ok(comments) => comments,
            Err(e) => {
                warn!(pr = number, error = %e, "failed to fetch PR comments; skipping PR");
                Vec::new()
            }
        }
    }

    async fn try_collect(&self, repo: &Repository, number: u64) -> Result<Vec<BotComment>> {
        let base = format!("{}/repos/{}/{}", self.api_url, repo.owner, repo.name);
        let reviews_url = format!("{base}/pulls/{number}/reviews");
        let inline_url = format!("{base}/pulls/{number}/comments");
        let general_url = format!("{base}/issues/{number}/comments");

        let (reviews, inline, general) = tokio::join!(
            self.fetcher.fetch_all_pages(&reviews_url),
            self.fetcher.fetch_all_pages(&inline_url),
            self.fetcher.fetch_all_pages(&general_url),
        );

        let mut comments = Vec::new();
        for (kind, items) in [
            (CommentKind::Review, reviews?),
            (CommentKind::Inline, inline?),
            (CommentKind::General, general?),
        ] {
            comments.extend(
                items
                    .into_iter()
                    .filter_map(|item| self.to_bot_comment(kind, item)),
            );
        }

        debug!(pr = number, count = comments.len(), "collected bot comments");
        Ok(comments)
    }

    fn to_bot_comment(&self, kind: CommentKind, item: Value) -> Option<BotComment> {
        let comment: GhComment = match serde_json::from_value(item) {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "skipping unparseable comment");
                return None;
            }
        };
        if comment.user.as_ref()?.login != self.bot_login {
            return None;
        }
        let body = comment.body.filter(|b| !b.trim().is_empty())?;
        Some(BotComment {
            id: comment.id,
            kind,
            body,
            url: comment.html_url,
            created_at: comment
                .created_at
                .or(comment.submitted_at)
                .unwrap_or_default(),
        })
    }
}
