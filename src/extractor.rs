use std::sync::LazyLock;

use regex::Regex;

use crate::model::{AcceptanceMethod, ActionableIssue, Priority, Severity};

const SEVERITY_MARKERS: &[(&str, Severity)] = &[
    ("⚠️ Potential issue", Severity::PotentialIssue),
    ("🧹 Nitpick", Severity::Nitpick),
    ("🛠️ Refactor suggestion", Severity::Suggestion),
    ("🔍 Review", Severity::Review),
];

const PRIORITY_MARKERS: &[(&str, Priority)] = &[
    ("🔴 Critical", Priority::Critical),
    ("🟠 Major", Priority::Major),
    ("🟡 Minor", Priority::Minor),
    ("🔵 Trivial", Priority::Trivial),
    ("⚪ Trivial", Priority::Trivial),
];

const ACCEPTANCE_PHRASE: &str = "addressed in commit";
const FALLBACK_TITLE_MAX_CHARS: usize = 100;

/// Emoji presentation selector; bots emit glyphs both with and without it.
const VARIATION_SELECTOR: char = '\u{FE0F}';

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = |labels: Vec<&str>| {
        labels
            .into_iter()
            .map(|label| {
                let bare = label.replace(VARIATION_SELECTOR, "");
                let (glyph, text) = bare.split_once(' ').unwrap_or(("", bare.as_str()));
                format!(
                    "{}{}?\\s+{}",
                    regex::escape(glyph),
                    VARIATION_SELECTOR,
                    regex::escape(text)
                )
            })
            .collect::<Vec<_>>()
            .join("|")
    };
    let severities = alternatives(SEVERITY_MARKERS.iter().map(|(l, _)| *l).collect());
    let priorities = alternatives(PRIORITY_MARKERS.iter().map(|(l, _)| *l).collect());
    Regex::new(&format!(
        r"_\s*(?P<severity>{severities})\s*_\s*\|\s*_\s*(?P<priority>{priorities})\s*_"
    ))
    .expect("marker regex is valid")
});

static HEADING_AFTER_DETAILS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)</details>\s*\*\*(?P<title>.+?)\*\*").expect("valid regex"));
static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(?P<title>[^\n]+?)\*\*").expect("valid regex"));
static SECTION_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<details>|<!--").expect("valid regex"));
static BLANK_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*){2,}").expect("valid regex"));
static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static EMPHASIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*|__|~~|`").expect("valid regex"));
static EDGE_EMPHASIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)[_*]+|[_*]+(?:\s|$)").expect("valid regex"));

/// Fields recovered from a single comment body. URL and timestamp belong to
/// the comment, not the text, and are attached by [`ParsedIssue::into_issue`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIssue {
    pub severity: Severity,
    pub priority: Priority,
    pub title: String,
    pub description: Option<String>,
    pub accepted: bool,
    pub acceptance_method: AcceptanceMethod,
}

impl ParsedIssue {
    pub fn into_issue(self, source_comment_url: &str, timestamp: &str) -> ActionableIssue {
        let mut issue = ActionableIssue {
            severity: self.severity,
            priority: self.priority,
            title: self.title,
            description: self.description,
            source_comment_url: source_comment_url.to_string(),
            timestamp: timestamp.to_string(),
            accepted: false,
            acceptance_method: AcceptanceMethod::None,
            automatic_acceptance: AcceptanceMethod::None,
        };
        issue.record_acceptance(self.acceptance_method);
        issue
    }
}

/// A title candidate plus whatever text follows it.
struct TitleMatch<'a> {
    title: String,
    description: Option<String>,
    rest: &'a str,
}

type TitleStrategy = for<'a> fn(&'a str, &'a str) -> Option<TitleMatch<'a>>;

/// Title strategies in the order they are tried. Each receives the text after
/// the marker and the whole body.
const TITLE_STRATEGIES: &[TitleStrategy] = &[
    heading_after_details,
    first_bold_span,
    first_line_after_marker,
    first_line_of_body,
];

/// Parse a bot comment into an issue. Returns `None` for comments without a
/// severity/priority marker.
pub fn parse(body: &str) -> Option<ParsedIssue> {
    let caps = MARKER_RE.captures(body)?;
    let severity = lookup(SEVERITY_MARKERS, caps.name("severity")?.as_str())?;
    let priority = lookup(PRIORITY_MARKERS, caps.name("priority")?.as_str())?;
    let after = &body[caps.get(0)?.end()..];

    let found = TITLE_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(after, body).filter(|m| !m.title.is_empty()))?;

    let description = found
        .description
        .or_else(|| first_non_empty_line(found.rest).map(strip_markup))
        .filter(|d| !d.is_empty());

    let accepted = body.to_lowercase().contains(ACCEPTANCE_PHRASE);

    Some(ParsedIssue {
        severity,
        priority,
        title: found.title,
        description,
        accepted,
        acceptance_method: if accepted {
            AcceptanceMethod::DetectedInBody
        } else {
            AcceptanceMethod::None
        },
    })
}

fn lookup<T: Copy>(table: &[(&str, T)], matched: &str) -> Option<T> {
    let normalize = |s: &str| {
        s.replace(VARIATION_SELECTOR, "")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    };
    let matched = normalize(matched);
    table
        .iter()
        .find(|(label, _)| normalize(label) == matched)
        .map(|(_, value)| *value)
}

// ---------------------------------------------------------------------------
// Title strategies
// ---------------------------------------------------------------------------

fn heading_after_details<'a>(after: &'a str, _body: &'a str) -> Option<TitleMatch<'a>> {
    let caps = HEADING_AFTER_DETAILS_RE.captures(after)?;
    let title = caps.name("title")?.as_str().trim().to_string();
    let rest = &after[caps.get(0)?.end()..];
    let section = match SECTION_END_RE.find(rest) {
        Some(m) => &rest[..m.start()],
        None => rest,
    };
    let description = BLANK_RUN_RE.replace_all(section, "\n\n").trim().to_string();
    Some(TitleMatch {
        title,
        description: Some(description).filter(|d| !d.is_empty()),
        rest,
    })
}

fn first_bold_span<'a>(after: &'a str, _body: &'a str) -> Option<TitleMatch<'a>> {
    let caps = BOLD_RE.captures(after)?;
    Some(TitleMatch {
        title: caps.name("title")?.as_str().trim().to_string(),
        description: None,
        rest: &after[caps.get(0)?.end()..],
    })
}

fn first_line_after_marker<'a>(after: &'a str, _body: &'a str) -> Option<TitleMatch<'a>> {
    let (line, rest) = split_first_non_empty_line(after)?;
    Some(TitleMatch {
        title: strip_markup(line),
        description: None,
        rest,
    })
}

fn first_line_of_body<'a>(_after: &'a str, body: &'a str) -> Option<TitleMatch<'a>> {
    let (line, rest) = split_first_non_empty_line(body)?;
    let stripped = strip_markup(line);
    let title = if stripped.chars().count() > FALLBACK_TITLE_MAX_CHARS {
        let head: String = stripped.chars().take(FALLBACK_TITLE_MAX_CHARS).collect();
        format!("{head}...")
    } else {
        stripped
    };
    Some(TitleMatch {
        title,
        description: None,
        rest,
    })
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// First line with visible content, and the text after it.
fn split_first_non_empty_line(text: &str) -> Option<(&str, &str)> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return Some((trimmed, &text[offset..]));
        }
    }
    None
}

fn first_non_empty_line(text: &str) -> Option<&str> {
    split_first_non_empty_line(text).map(|(line, _)| line)
}

/// Remove HTML tags, inline code ticks and emphasis markers from one line.
pub fn strip_markup(line: &str) -> String {
    let without_tags = HTML_TAG_RE.replace_all(line, "");
    let without_emphasis = EMPHASIS_RE.replace_all(&without_tags, "");
    let without_edges = EDGE_EMPHASIS_RE.replace_all(&without_emphasis, " ");
    without_edges
        .trim()
        .trim_start_matches(['#', '>', '-'])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
