use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::PullRequest;

/// A manual acceptance decision for one issue URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub accepted: bool,
    pub timestamp: DateTime<Utc>,
}

pub type OverrideMap = BTreeMap<String, OverrideRecord>;

/// Outcome of toggling an override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideToggle {
    Set { accepted: bool },
    Removed,
}

/// Get/set contract for wherever overrides live. `load` fails with
/// `Error::State` when stored data cannot be decoded.
pub trait OverrideStorage {
    fn load(&self) -> Result<OverrideMap>;
    fn save(&self, overrides: &OverrideMap) -> Result<()>;
}

/// Overrides persisted as TOML, keyed by issue URL.
pub struct FileOverrideStorage {
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OverrideFile {
    #[serde(default)]
    overrides: OverrideMap,
}

impl FileOverrideStorage {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("overrides.toml"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OverrideStorage for FileOverrideStorage {
    fn load(&self) -> Result<OverrideMap> {
        if !self.path.exists() {
            return Ok(OverrideMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        toml::from_str::<OverrideFile>(&content)
            .map(|file| file.overrides)
            .map_err(|e| {
                Error::State(format!(
                    "corrupted override file {}: {e}",
                    self.path.display()
                ))
            })
    }

    fn save(&self, overrides: &OverrideMap) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::State(format!("failed to create state dir: {e}")))?;
        }
        let file = OverrideFile {
            overrides: overrides.clone(),
        };
        let content = toml::to_string_pretty(&file)
            .map_err(|e| Error::State(format!("failed to serialize overrides: {e}")))?;
        std::fs::write(&self.path, content)
            .map_err(|e| Error::State(format!("failed to write override file: {e}")))?;
        Ok(())
    }
}

/// Process-local storage.
#[derive(Default)]
pub struct MemoryOverrideStorage {
    overrides: Mutex<OverrideMap>,
}

impl OverrideStorage for MemoryOverrideStorage {
    fn load(&self) -> Result<OverrideMap> {
        self.overrides
            .lock()
            .map(|m| m.clone())
            .map_err(|_| Error::State("override storage lock poisoned".to_string()))
    }

    fn save(&self, overrides: &OverrideMap) -> Result<()> {
        let mut guard = self
            .overrides
            .lock()
            .map_err(|_| Error::State("override storage lock poisoned".to_string()))?;
        *guard = overrides.clone();
        Ok(())
    }
}

/// Manual acceptance decisions; the highest-priority source of truth.
pub struct ManualOverrideStore<S> {
    storage: S,
}

impl<S: OverrideStorage> ManualOverrideStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Stored overrides. Undecodable storage reads as empty.
    pub fn get(&self) -> Result<OverrideMap> {
        match self.storage.load() {
            Err(Error::State(msg)) => {
                warn!("{msg}, ignoring overrides");
                Ok(OverrideMap::new())
            }
            other => other,
        }
    }

    /// Toggle the override for `url`: record `accepted` if none exists,
    /// otherwise remove it so automatic detection applies again. Fails
    /// without writing when the stored overrides cannot be read.
    pub fn set(&self, url: &str, accepted: bool) -> Result<OverrideToggle> {
        let mut overrides = self.storage.load()?;
        let outcome = if overrides.remove(url).is_some() {
            OverrideToggle::Removed
        } else {
            overrides.insert(
                url.to_string(),
                OverrideRecord {
                    accepted,
                    timestamp: Utc::now(),
                },
            );
            OverrideToggle::Set { accepted }
        };
        self.storage.save(&overrides)?;
        debug!(url, ?outcome, "toggled manual override");
        Ok(outcome)
    }

    /// Decorate every issue with the stored overrides.
    pub fn apply(&self, pull_requests: &mut [PullRequest]) -> Result<()> {
        let overrides = self.get()?;
        apply_overrides(&overrides, pull_requests);
        Ok(())
    }
}

/// Issues with an override take its decision; all others revert to their
/// automatic determination. Applying twice is the same as applying once.
pub fn apply_overrides(overrides: &OverrideMap, pull_requests: &mut [PullRequest]) {
    for issue in pull_requests.iter_mut().flat_map(|pr| pr.issues.iter_mut()) {
        match overrides.get(&issue.source_comment_url) {
            Some(record) => issue.apply_manual(record.accepted),
            None => issue.restore_automatic(),
        }
    }
}
