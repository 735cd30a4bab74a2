use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of finding, taken from the first half of the comment marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "Potential issue")]
    PotentialIssue,
    #[serde(rename = "Nitpick")]
    Nitpick,
    #[serde(rename = "Refactor suggestion")]
    Suggestion,
    #[serde(rename = "Review")]
    Review,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::PotentialIssue => "Potential issue",
            Severity::Nitpick => "Nitpick",
            Severity::Suggestion => "Refactor suggestion",
            Severity::Review => "Review",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Urgency of a finding. Ordered from most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    Major,
    Minor,
    Trivial,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::Major,
        Priority::Minor,
        Priority::Trivial,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Priority::Critical => "Critical",
            Priority::Major => "Major",
            Priority::Minor => "Minor",
            Priority::Trivial => "Trivial",
        }
    }

    /// Case-insensitive parse of a priority label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How an issue came to be considered accepted.
///
/// Variants are ordered by precedence: a later variant always wins over an
/// earlier one when several sources report on the same issue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum AcceptanceMethod {
    #[default]
    None,
    DetectedInBody,
    ResolvedViaQuery,
    Manual,
}

impl fmt::Display for AcceptanceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AcceptanceMethod::None => "none",
            AcceptanceMethod::DetectedInBody => "detected-in-body",
            AcceptanceMethod::ResolvedViaQuery => "resolved-via-query",
            AcceptanceMethod::Manual => "manual",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionableIssue {
    pub severity: Severity,
    pub priority: Priority,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "sourceCommentURL")]
    pub source_comment_url: String,
    pub timestamp: String,
    pub accepted: bool,
    pub acceptance_method: AcceptanceMethod,
    /// Strongest automatic determination seen so far. Kept apart from the
    /// effective fields so dropping a manual override can restore it.
    #[serde(default)]
    pub automatic_acceptance: AcceptanceMethod,
}

impl ActionableIssue {
    /// Record an automatic acceptance signal. Only raises the stored method;
    /// a manual decision stays in effect.
    pub fn record_acceptance(&mut self, method: AcceptanceMethod) {
        if method == AcceptanceMethod::Manual || method <= self.automatic_acceptance {
            return;
        }
        self.automatic_acceptance = method;
        if self.acceptance_method != AcceptanceMethod::Manual {
            self.restore_automatic();
        }
    }

    /// Replace the effective state with a manual decision.
    pub fn apply_manual(&mut self, accepted: bool) {
        self.accepted = accepted;
        self.acceptance_method = AcceptanceMethod::Manual;
    }

    /// Drop any manual decision and fall back to automatic detection.
    pub fn restore_automatic(&mut self) {
        self.accepted = self.automatic_acceptance != AcceptanceMethod::None;
        self.acceptance_method = self.automatic_acceptance;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub id: u64,
    pub title: String,
    pub url: String,
    pub state: String,
    pub author: String,
    pub created_at: String,
    pub issues: Vec<ActionableIssue>,
}

/// Inclusive range of creation dates used for PR discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidInput(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse two `YYYY-MM-DD` dates.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| {
                Error::InvalidInput(format!("invalid date '{s}' (expected YYYY-MM-DD): {e}"))
            })
        };
        Self::new(parse(start)?, parse(end)?)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    #[serde(rename = "totalPRs")]
    pub total_prs: usize,
    #[serde(rename = "totalPRsWithIssues")]
    pub total_prs_with_issues: usize,
    pub total_issues: usize,
    #[serde(rename = "avgIssuesPerPR")]
    pub avg_issues_per_pr: f64,
}

impl Summary {
    pub fn compute(total_prs: usize, pull_requests: &[PullRequest]) -> Self {
        let total_issues: usize = pull_requests.iter().map(|pr| pr.issues.len()).sum();
        let with_issues = pull_requests.iter().filter(|pr| !pr.issues.is_empty()).count();
        let avg_issues_per_pr = if with_issues == 0 {
            0.0
        } else {
            total_issues as f64 / with_issues as f64
        };
        Self {
            total_prs,
            total_prs_with_issues: with_issues,
            total_issues,
            avg_issues_per_pr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub repository_identifier: String,
    pub date_range: DateRange,
    pub summary: Summary,
    pub pull_requests: Vec<PullRequest>,
}

impl AnalysisResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}
