use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::model::{AcceptanceMethod, Priority, PullRequest};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;
/// Connectives dropped before comparing titles, unless nothing else is left.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "be", "by", "in", "is", "it", "of", "on", "or", "the", "to",
];

static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

/// One issue instance, denormalized for filtering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    /// Exact title of the issue, one of the group's members.
    pub title: String,
    pub pr_number: u64,
    pub issue_url: String,
    pub priority: Priority,
    pub accepted: bool,
    pub acceptance_method: AcceptanceMethod,
}

/// All occurrences sharing one exact title.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleEntry {
    pub title: String,
    pub occurrences: Vec<Occurrence>,
}

impl TitleEntry {
    pub fn count(&self) -> usize {
        self.occurrences.len()
    }
}

/// A cluster of near-duplicate titles.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleGroup {
    pub representative: String,
    pub members: Vec<String>,
    pub total_count: usize,
    pub occurrences: Vec<Occurrence>,
}

impl TitleGroup {
    pub fn accepted_count(&self) -> usize {
        self.occurrences.iter().filter(|o| o.accepted).count()
    }

    pub fn pr_numbers(&self) -> Vec<u64> {
        let mut numbers: Vec<u64> = self.occurrences.iter().map(|o| o.pr_number).collect();
        numbers.sort_unstable();
        numbers.dedup();
        numbers
    }
}

/// Lowercase, replace punctuation with spaces, collapse whitespace.
pub fn normalize(title: &str) -> String {
    let lowered = title.to_lowercase();
    NON_WORD_RE
        .replace_all(&lowered, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(title: &str) -> HashSet<String> {
    let normalized = normalize(title);
    let words: HashSet<String> = normalized
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    let content: HashSet<String> = words
        .iter()
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .cloned()
        .collect();
    if content.is_empty() { words } else { content }
}

/// Jaccard similarity of the normalized token sets; 0 when both are empty.
/// Stop words are left out of a set unless it consists of nothing else.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = tokens(a);
    let b = tokens(b);
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Group occurrences by exact title, most frequent first. Ties keep the
/// order in which titles first appeared.
pub fn title_entries(pull_requests: &[PullRequest]) -> Vec<TitleEntry> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut entries: Vec<TitleEntry> = Vec::new();

    for pr in pull_requests {
        for issue in &pr.issues {
            let occurrence = Occurrence {
                title: issue.title.clone(),
                pr_number: pr.id,
                issue_url: issue.source_comment_url.clone(),
                priority: issue.priority,
                accepted: issue.accepted,
                acceptance_method: issue.acceptance_method,
            };
            match index.get(issue.title.as_str()) {
                Some(&i) => entries[i].occurrences.push(occurrence),
                None => {
                    index.insert(issue.title.as_str(), entries.len());
                    entries.push(TitleEntry {
                        title: issue.title.clone(),
                        occurrences: vec![occurrence],
                    });
                }
            }
        }
    }

    entries.sort_by(|a, b| b.count().cmp(&a.count()));
    entries
}

/// Greedy single-pass clustering against each group's representative.
///
/// `entries` should be ordered by descending count. Each unassigned entry
/// opens a group and absorbs later unassigned entries whose similarity to the
/// representative reaches `threshold`. Members are never compared with each
/// other, so grouping is not transitive.
pub fn cluster(entries: &[TitleEntry], threshold: f64) -> Vec<TitleGroup> {
    let mut assigned = vec![false; entries.len()];
    let mut groups = Vec::new();

    for i in 0..entries.len() {
        if assigned[i] {
            continue;
        }
        assigned[i] = true;
        let representative = &entries[i];
        let mut group = TitleGroup {
            representative: representative.title.clone(),
            members: vec![representative.title.clone()],
            total_count: representative.count(),
            occurrences: representative.occurrences.clone(),
        };

        for j in (i + 1)..entries.len() {
            if assigned[j] || similarity(&representative.title, &entries[j].title) < threshold {
                continue;
            }
            assigned[j] = true;
            group.members.push(entries[j].title.clone());
            group.total_count += entries[j].count();
            group
                .occurrences
                .extend(entries[j].occurrences.iter().cloned());
        }

        groups.push(group);
    }

    sort_groups(&mut groups);
    groups
}

/// Order groups by total count, largest first. Stable for equal totals.
pub fn sort_groups(groups: &mut [TitleGroup]) {
    groups.sort_by(|a, b| b.total_count.cmp(&a.total_count));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::make_issue;

    fn entry(title: &str, count: usize) -> TitleEntry {
        TitleEntry {
            title: title.to_string(),
            occurrences: (0..count)
                .map(|i| Occurrence {
                    title: title.to_string(),
                    pr_number: i as u64 + 1,
                    issue_url: format!("https://x/{title}/{i}"),
                    priority: Priority::Minor,
                    accepted: false,
                    acceptance_method: AcceptanceMethod::None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Avoid `var`,  please!! "), "avoid var please");
        assert_eq!(normalize("snake_case stays"), "snake_case stays");
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let pairs = [
            ("Avoid using var", "Use const instead of var"),
            ("Missing null check", "Add a null check"),
            ("", "something"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a));
        }
    }

    #[test]
    fn test_similarity_identity_and_empty() {
        assert_eq!(similarity("Avoid using var", "avoid USING var!"), 1.0);
        assert_eq!(similarity("", ""), 0.0);
        assert_eq!(similarity("...", "!!"), 0.0);
    }

    #[test]
    fn test_similarity_uses_set_semantics() {
        assert_eq!(similarity("var var var", "var"), 1.0);
    }

    #[test]
    fn test_similarity_ignores_stop_words() {
        assert_eq!(similarity("Avoid using var in loop", "Avoid using var here"), 0.6);
    }

    #[test]
    fn test_similarity_identity_for_short_titles() {
        for title in ["Go to DB", "Fix UI", "a b", "to be or", "in"] {
            assert_eq!(similarity(title, title), 1.0, "{title}");
        }
    }

    #[test]
    fn test_short_distinct_titles_stay_apart() {
        assert!(similarity("Add ID", "Add UI") < DEFAULT_SIMILARITY_THRESHOLD);
        let groups = cluster(
            &[entry("Add ID", 2), entry("Add UI", 1)],
            DEFAULT_SIMILARITY_THRESHOLD,
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec!["Add ID"]);
        assert_eq!(groups[1].members, vec!["Add UI"]);
    }

    #[test]
    fn test_similar_titles_cluster_together() {
        let groups = cluster(
            &[entry("Avoid using var in loop", 1), entry("Avoid using var here", 1)],
            DEFAULT_SIMILARITY_THRESHOLD,
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].total_count, 2);
        assert_eq!(groups[0].representative, "Avoid using var in loop");
        assert_eq!(groups[0].members.len(), 2);
    }

    #[test]
    fn test_clustering_is_representative_only() {
        // b and c are each close to a, but not to each other; d is close to c only.
        let a = "alpha beta gamma delta";
        let b = "alpha beta gamma epsilon";
        let c = "alpha beta gamma zeta";
        let d = "beta gamma zeta eta";
        assert!(similarity(a, b) >= 0.6);
        assert!(similarity(a, c) >= 0.6);
        assert!(similarity(a, d) < 0.6);
        assert!(similarity(c, d) >= 0.6);

        let groups = cluster(
            &[entry(a, 4), entry(b, 3), entry(c, 2), entry(d, 1)],
            DEFAULT_SIMILARITY_THRESHOLD,
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec![a, b, c]);
        assert_eq!(groups[0].total_count, 9);
        assert_eq!(groups[1].members, vec![d]);
    }

    #[test]
    fn test_groups_sorted_by_total() {
        let groups = cluster(
            &[entry("one thing", 3), entry("other", 2), entry("other stuff entirely", 2), entry("another other", 2)],
            DEFAULT_SIMILARITY_THRESHOLD,
        );
        let totals: Vec<usize> = groups.iter().map(|g| g.total_count).collect();
        let mut sorted = totals.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(totals, sorted);
        assert_eq!(groups.iter().map(|g| g.total_count).sum::<usize>(), 9);
    }

    #[test]
    fn test_reclustering_representatives_is_idempotent() {
        let entries = vec![
            entry("Avoid using var in loop", 5),
            entry("Avoid using var here", 4),
            entry("Missing error handling", 3),
            entry("Missing error handling for fetch", 2),
            entry("Unused import", 1),
        ];
        let first = cluster(&entries, DEFAULT_SIMILARITY_THRESHOLD);
        let reps: Vec<TitleEntry> = first
            .iter()
            .map(|g| TitleEntry {
                title: g.representative.clone(),
                occurrences: g.occurrences.clone(),
            })
            .collect();
        let second = cluster(&reps, DEFAULT_SIMILARITY_THRESHOLD);
        let reps_again: Vec<&str> = second.iter().map(|g| g.representative.as_str()).collect();
        let reps_first: Vec<&str> = first.iter().map(|g| g.representative.as_str()).collect();
        assert_eq!(reps_again, reps_first);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.total_count, b.total_count);
            assert_eq!(a.occurrences, b.occurrences);
        }
    }

    #[test]
    fn test_title_entries_counts_and_orders() {
        let pr = |id: u64, titles: &[&str]| PullRequest {
            id,
            title: format!("PR {id}"),
            url: format!("https://github.com/o/r/pull/{id}"),
            state: "closed".to_string(),
            author: "dev".to_string(),
            created_at: "2025-01-01T00:00:00Z".to_string(),
            issues: titles
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let mut issue = make_issue(&format!("u{id}-{i}"), Priority::Major);
                    issue.title = t.to_string();
                    issue
                })
                .collect(),
        };
        let entries = title_entries(&[pr(1, &["a", "b"]), pr(2, &["b", "c"]), pr(3, &["b"])]);
        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "a", "c"]);
        assert_eq!(entries[0].count(), 3);
        assert_eq!(entries[0].occurrences[1].pr_number, 2);
    }
}
