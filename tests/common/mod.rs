#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use serde_json::{Value, json};

use review_lens::fetcher::{HttpRequest, HttpResponse, HttpTransport, Method};
use review_lens::github::comments::DEFAULT_BOT_LOGIN;
use review_lens::model::{AnalysisResult, DateRange, PullRequest, Summary};

/// Canned GitHub: search results, per-PR comment lists and resolved comment ids.
#[derive(Default)]
pub struct FakeGitHub {
    pub pulls: Vec<Value>,
    pub review_comments: HashMap<u64, Vec<Value>>,
    pub inline_comments: HashMap<u64, Vec<Value>>,
    pub issue_comments: HashMap<u64, Vec<Value>>,
    pub resolved: HashMap<u64, Vec<u64>>,
    pub failing_pulls: Vec<u64>,
    pub requests: Mutex<Vec<String>>,
}

impl FakeGitHub {
    fn comments_for(&self, url: &str) -> Option<&Vec<Value>> {
        let mut parts = url.split('?').next()?.rsplit('/');
        let endpoint = parts.next()?;
        let number: u64 = parts.next()?.parse().ok()?;
        let kind = parts.next()?;
        match (kind, endpoint) {
            ("pulls", "reviews") => self.review_comments.get(&number),
            ("pulls", "comments") => self.inline_comments.get(&number),
            ("issues", "comments") => self.issue_comments.get(&number),
            _ => None,
        }
    }

    fn pr_of(url: &str) -> Option<u64> {
        let mut parts = url.split('?').next()?.rsplit('/');
        parts.next()?;
        parts.next()?.parse().ok()
    }
}

impl HttpTransport for FakeGitHub {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        self.requests.lock().unwrap().push(request.url.clone());

        if request.method == Method::Post {
            let variables = &request.body.as_ref().ok_or("missing body")?["variables"];
            let number = variables["number"].as_u64().unwrap_or(0);
            let ids = self.resolved.get(&number).cloned().unwrap_or_default();
            let nodes: Vec<Value> = ids
                .iter()
                .map(|id| {
                    json!({
                        "databaseId": id,
                        "url": format!("https://github.com/octo/app/pull/{number}#discussion_r{id}"),
                    })
                })
                .collect();
            return Ok(ok(json!({ "data": { "repository": { "pullRequest": {
                "reviewThreads": { "nodes": [
                    { "isResolved": true, "comments": { "nodes": nodes } }
                ] }
            } } } })));
        }

        if request.url.contains("/search/issues") {
            return Ok(ok(json!({
                "total_count": self.pulls.len(),
                "items": self.pulls,
            })));
        }

        if let Some(number) = Self::pr_of(&request.url)
            && self.failing_pulls.contains(&number)
        {
            return Ok(HttpResponse {
                status: 404,
                headers: HashMap::new(),
                body: "{}".to_string(),
            });
        }

        Ok(ok(Value::Array(
            self.comments_for(&request.url).cloned().unwrap_or_default(),
        )))
    }
}

pub fn ok(body: Value) -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: HashMap::from([
            ("x-ratelimit-limit".to_string(), "5000".to_string()),
            ("x-ratelimit-remaining".to_string(), "4999".to_string()),
        ]),
        body: body.to_string(),
    }
}

pub fn pull(number: u64) -> Value {
    json!({
        "number": number,
        "title": format!("Change {number}"),
        "html_url": format!("https://github.com/octo/app/pull/{number}"),
        "state": "closed",
        "user": { "login": "dev" },
        "created_at": "2025-03-01T10:00:00Z",
    })
}

pub fn bot_comment(id: u64, pr: u64, body: &str) -> Value {
    json!({
        "id": id,
        "body": body,
        "html_url": format!("https://github.com/octo/app/pull/{pr}#discussion_r{id}"),
        "user": { "login": DEFAULT_BOT_LOGIN },
        "created_at": "2025-03-02T10:00:00Z",
    })
}

pub fn human_comment(id: u64, pr: u64, body: &str) -> Value {
    json!({
        "id": id,
        "body": body,
        "html_url": format!("https://github.com/octo/app/pull/{pr}#issuecomment-{id}"),
        "user": { "login": "reviewer" },
        "created_at": "2025-03-02T11:00:00Z",
    })
}

/// Bot comment body with the standard severity/priority marker.
pub fn issue_body(priority: &str, title: &str) -> String {
    let glyph = match priority {
        "Critical" => "🔴",
        "Major" => "🟠",
        "Minor" => "🟡",
        _ => "🔵",
    };
    format!("_⚠️ Potential issue_ | _{glyph} {priority}_\n\n**{title}**\n\nDetails follow.")
}

/// Write an export with the given PRs into `dir` and return its path.
pub fn write_export(dir: &Path, pull_requests: Vec<PullRequest>) -> std::path::PathBuf {
    let result = AnalysisResult {
        repository_identifier: "octo/app".to_string(),
        date_range: DateRange::parse("2025-03-01", "2025-03-31").unwrap(),
        summary: Summary::compute(pull_requests.len(), &pull_requests),
        pull_requests,
    };
    let path = dir.join("analysis.json");
    std::fs::write(&path, result.to_json().unwrap()).unwrap();
    path
}
