use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::filter::AcceptanceFilter;
use crate::model::Priority;
use crate::state::STATE_DIR_NAME;

/// Analyze bot code-review comments across pull requests
#[derive(Parser, Debug, Clone)]
#[command(name = "review-lens", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,

    /// Path to config file (default: <state-dir>/config.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding config, remembered repository and overrides
    #[arg(long, global = true, default_value = STATE_DIR_NAME)]
    pub state_dir: PathBuf,

    /// Jaccard similarity threshold for grouping titles, in (0, 1]
    #[arg(long, global = true)]
    pub threshold: Option<f64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Fetch closed PRs in a date range and extract the bot's actionable issues
    Analyze {
        /// Repository owner (default: last analyzed)
        #[arg(long)]
        owner: Option<String>,

        /// Repository name (default: last analyzed)
        #[arg(long)]
        repo: Option<String>,

        /// First creation date to include (YYYY-MM-DD)
        #[arg(long)]
        since: String,

        /// Last creation date to include (YYYY-MM-DD)
        #[arg(long)]
        until: String,

        /// Write the JSON export to this file
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Number of title groups to print
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Bot account whose comments are analyzed
        #[arg(long)]
        bot_login: Option<String>,

        /// PRs processed concurrently per batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Cluster and filter issues from a previously exported analysis
    Report {
        /// JSON export written by `analyze --output`
        file: PathBuf,

        /// Only include these priorities (repeatable)
        #[arg(long = "priority", short, value_parser = parse_priority)]
        priorities: Vec<Priority>,

        /// Acceptance filter (all, accepted, not-accepted)
        #[arg(long, default_value = "all")]
        acceptance: AcceptanceFilter,

        /// Number of title groups to print
        #[arg(long, default_value_t = 20)]
        top: usize,
    },

    /// Toggle a manual acceptance override for an issue URL
    Override {
        /// Source comment URL of the issue
        url: String,

        /// Record the issue as not accepted instead of accepted
        #[arg(long)]
        not_accepted: bool,
    },

    /// List stored manual overrides
    Overrides,
}

fn parse_priority(s: &str) -> Result<Priority, String> {
    Priority::from_label(s)
        .ok_or_else(|| format!("unknown priority: {s} (expected: critical, major, minor, trivial)"))
}
