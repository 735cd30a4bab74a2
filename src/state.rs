use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

pub const STATE_DIR_NAME: &str = ".review-lens";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastRepository {
    pub owner: String,
    pub repo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StateData {
    pub last_repository: Option<LastRepository>,
}

/// Manages local state persisted as TOML in `.review-lens/state.toml`.
pub struct StateManager {
    state_dir: PathBuf,
}

impl StateManager {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn state_file(&self) -> PathBuf {
        self.state_dir.join("state.toml")
    }

    /// Load state from disk. Returns default state if file is missing or corrupted.
    pub fn load(&self) -> StateData {
        let path = self.state_file();
        if !path.exists() {
            return StateData::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<StateData>(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!("corrupted state file {}: {e}, resetting", path.display());
                    StateData::default()
                }
            },
            Err(e) => {
                warn!(
                    "failed to read state file {}: {e}, resetting",
                    path.display()
                );
                StateData::default()
            }
        }
    }

    /// Save state to disk.
    pub fn save(&self, state: &StateData) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir)
            .map_err(|e| Error::State(format!("failed to create state dir: {e}")))?;

        let content = toml::to_string_pretty(state)
            .map_err(|e| Error::State(format!("failed to serialize state: {e}")))?;

        std::fs::write(self.state_file(), content)
            .map_err(|e| Error::State(format!("failed to write state file: {e}")))?;

        Ok(())
    }

    pub fn last_repository(&self) -> Option<LastRepository> {
        self.load().last_repository
    }

    /// Remember the repository of the latest successful analysis.
    pub fn set_last_repository(&self, owner: &str, repo: &str) -> Result<()> {
        let mut state = self.load();
        state.last_repository = Some(LastRepository {
            owner: owner.to_string(),
            repo: repo.to_string(),
        });
        self.save(&state)
    }
}
