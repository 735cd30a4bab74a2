use crate::cluster::{self, TitleGroup};
use crate::filter::{self, FilterCounts, FilterState};
use crate::model::{AnalysisResult, Priority, PullRequest};

/// Clustered and filtered view over a set of (override-decorated) PRs.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportView {
    pub groups: Vec<TitleGroup>,
    pub counts: FilterCounts,
}

impl ReportView {
    /// Cluster all issue titles, then filter. Counts are taken over every
    /// occurrence so each option shows what selecting it would yield.
    pub fn build(pull_requests: &[PullRequest], state: &FilterState, threshold: f64) -> Self {
        let entries = cluster::title_entries(pull_requests);
        let groups = cluster::cluster(&entries, threshold);
        let counts = filter::counts(state, groups.iter().flat_map(|g| g.occurrences.iter()));
        Self {
            groups: filter::apply(state, &groups),
            counts,
        }
    }
}

pub fn render_summary(result: &AnalysisResult) -> String {
    let s = &result.summary;
    [
        format!(
            "Repository: {} ({})",
            result.repository_identifier, result.date_range
        ),
        format!("PRs analyzed:        {}", s.total_prs),
        format!("PRs with issues:     {}", s.total_prs_with_issues),
        format!("Actionable issues:   {}", s.total_issues),
        format!("Avg issues per PR:   {:.2}", s.avg_issues_per_pr),
    ]
    .join("\n")
}

pub fn render_counts(state: &FilterState, counts: &FilterCounts) -> String {
    let mark = |selected: bool| if selected { "*" } else { " " };
    let all_priorities = state.priorities == filter::PrioritySelection::All;

    let mut priority_line = vec![format!(
        "{}All ({})",
        mark(all_priorities),
        counts.all_priorities
    )];
    for p in Priority::ALL {
        let selected = !all_priorities && state.priorities.contains(p);
        let n = counts.by_priority.get(&p).copied().unwrap_or(0);
        priority_line.push(format!("{}{p} ({n})", mark(selected)));
    }

    let acceptance = [
        (filter::AcceptanceFilter::All, counts.all_acceptance),
        (filter::AcceptanceFilter::Accepted, counts.accepted),
        (filter::AcceptanceFilter::NotAccepted, counts.not_accepted),
    ]
    .iter()
    .map(|(a, n)| format!("{}{a} ({n})", mark(state.acceptance == *a)))
    .collect::<Vec<_>>();

    format!(
        "Priority:   {}\nAcceptance: {}",
        priority_line.join("  "),
        acceptance.join("  ")
    )
}

/// Top `limit` groups: representative, counts, PR numbers and other members.
pub fn render_groups(groups: &[TitleGroup], limit: usize) -> String {
    if groups.is_empty() {
        return "No matching issues.".to_string();
    }

    let mut lines = Vec::new();
    for (rank, group) in groups.iter().take(limit).enumerate() {
        let prs = group
            .pr_numbers()
            .iter()
            .map(|n| format!("#{n}"))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!(
            "{:>3}. {} [{} total, {} accepted] PRs: {prs}",
            rank + 1,
            group.representative,
            group.total_count,
            group.accepted_count()
        ));
        for member in group.members.iter().skip(1) {
            lines.push(format!("       ~ {member}"));
        }
    }
    if groups.len() > limit {
        lines.push(format!("     ... and {} more", groups.len() - limit));
    }
    lines.join("\n")
}
