use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::cluster::{Occurrence, TitleGroup, sort_groups};
use crate::error::{Error, Result};
use crate::model::Priority;

/// Priority dimension of the filter. A specific selection is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PrioritySelection {
    #[default]
    All,
    Only(BTreeSet<Priority>),
}

impl PrioritySelection {
    pub fn contains(&self, priority: Priority) -> bool {
        match self {
            PrioritySelection::All => true,
            PrioritySelection::Only(set) => set.contains(&priority),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptanceFilter {
    #[default]
    All,
    Accepted,
    NotAccepted,
}

impl AcceptanceFilter {
    pub fn matches(&self, accepted: bool) -> bool {
        match self {
            AcceptanceFilter::All => true,
            AcceptanceFilter::Accepted => accepted,
            AcceptanceFilter::NotAccepted => !accepted,
        }
    }
}

impl FromStr for AcceptanceFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(AcceptanceFilter::All),
            "accepted" => Ok(AcceptanceFilter::Accepted),
            "not-accepted" | "not_accepted" | "unaccepted" => Ok(AcceptanceFilter::NotAccepted),
            other => Err(Error::InvalidInput(format!(
                "unknown acceptance filter: {other} (expected: all, accepted, not-accepted)"
            ))),
        }
    }
}

impl fmt::Display for AcceptanceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AcceptanceFilter::All => "all",
            AcceptanceFilter::Accepted => "accepted",
            AcceptanceFilter::NotAccepted => "not-accepted",
        };
        f.write_str(s)
    }
}

/// Current selection in both filter dimensions. Transitions consume the
/// state and return the next one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterState {
    pub priorities: PrioritySelection,
    pub acceptance: AcceptanceFilter,
}

impl FilterState {
    /// Select "all" priorities. Also clears the acceptance filter.
    pub fn select_all_priorities(self) -> Self {
        Self::default()
    }

    /// Toggle one priority. Leaves "all" mode when a specific value is picked;
    /// deselecting the last specific value resets both dimensions.
    pub fn toggle_priority(self, priority: Priority) -> Self {
        let mut selected = match self.priorities {
            PrioritySelection::All => BTreeSet::new(),
            PrioritySelection::Only(set) => set,
        };
        if !selected.remove(&priority) {
            selected.insert(priority);
        }
        if selected.is_empty() {
            return Self::default();
        }
        Self {
            priorities: PrioritySelection::Only(selected),
            acceptance: self.acceptance,
        }
    }

    /// Select an acceptance filter. Re-selecting the active specific value
    /// resets both dimensions.
    pub fn toggle_acceptance(self, acceptance: AcceptanceFilter) -> Self {
        if acceptance != AcceptanceFilter::All && acceptance == self.acceptance {
            return Self::default();
        }
        Self {
            priorities: self.priorities,
            acceptance,
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, occurrence: &Occurrence) -> bool {
        self.priorities.contains(occurrence.priority)
            && self.acceptance.matches(occurrence.accepted)
    }

    /// Build a state from CLI-style selections: an empty priority list means "all".
    pub fn from_selection(priorities: &[Priority], acceptance: AcceptanceFilter) -> Self {
        let state = priorities
            .iter()
            .fold(Self::default(), |state, p| {
                if state.priorities.contains(*p) && state.priorities != PrioritySelection::All {
                    state
                } else {
                    state.toggle_priority(*p)
                }
            });
        state.toggle_acceptance(acceptance)
    }
}

/// Keep matching occurrences, drop emptied groups, recompute totals.
/// Members without a matching occurrence are dropped too; if the
/// representative is among them, the first surviving member takes its place.
pub fn apply(state: &FilterState, groups: &[TitleGroup]) -> Vec<TitleGroup> {
    let mut filtered: Vec<TitleGroup> = groups
        .iter()
        .filter_map(|group| {
            let occurrences: Vec<Occurrence> = group
                .occurrences
                .iter()
                .filter(|o| state.matches(o))
                .cloned()
                .collect();
            if occurrences.is_empty() {
                return None;
            }
            let members: Vec<String> = group
                .members
                .iter()
                .filter(|m| occurrences.iter().any(|o| &o.title == *m))
                .cloned()
                .collect();
            let representative = if members.contains(&group.representative) {
                group.representative.clone()
            } else {
                members.first()?.clone()
            };
            Some(TitleGroup {
                representative,
                members,
                total_count: occurrences.len(),
                occurrences,
            })
        })
        .collect();
    sort_groups(&mut filtered);
    filtered
}

/// Per-option counts for both dimensions. Each dimension is counted under the
/// other dimension's current selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterCounts {
    pub all_priorities: usize,
    pub by_priority: BTreeMap<Priority, usize>,
    pub all_acceptance: usize,
    pub accepted: usize,
    pub not_accepted: usize,
}

pub fn counts<'a>(
    state: &FilterState,
    occurrences: impl IntoIterator<Item = &'a Occurrence>,
) -> FilterCounts {
    let mut counts = FilterCounts {
        by_priority: Priority::ALL.iter().map(|p| (*p, 0)).collect(),
        ..Default::default()
    };
    for occurrence in occurrences {
        if state.acceptance.matches(occurrence.accepted) {
            counts.all_priorities += 1;
            *counts.by_priority.entry(occurrence.priority).or_insert(0) += 1;
        }
        if state.priorities.contains(occurrence.priority) {
            counts.all_acceptance += 1;
            if occurrence.accepted {
                counts.accepted += 1;
            } else {
                counts.not_accepted += 1;
            }
        }
    }
    counts
}
