//! Device state that survives a reboot.

use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};

use crate::state::DeviceState;
use crate::FIRMWARE_VERSION;

pub trait StateStore {
    /// Last saved state, `None` when nothing was saved yet.
    fn load(&mut self) -> Result<Option<DeviceState>, Error>;
    fn save(&mut self, state: &DeviceState) -> Result<(), Error>;
}

#[derive(Debug, Deserialize, Serialize)]
struct StatusFile {
    firmware: String,
    #[serde(flatten)]
    state: DeviceState,
}

/// JSON status file on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStore {
    fn load(&mut self) -> Result<Option<DeviceState>, Error> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let status: StatusFile = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(Some(status.state))
    }

    fn save(&mut self, state: &DeviceState) -> Result<(), Error> {
        let status = StatusFile {
            firmware: FIRMWARE_VERSION.to_string(),
            state: *state,
        };
        let text = serde_json::to_string_pretty(&status)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

/// Keeps the state in memory and counts saves.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    pub state: Option<DeviceState>,
    pub saves: usize,
}

impl MemoryStore {
    pub fn with_state(state: DeviceState) -> Self {
        MemoryStore {
            state: Some(state),
            saves: 0,
        }
    }
}

impl StateStore for MemoryStore {
    fn load(&mut self) -> Result<Option<DeviceState>, Error> {
        Ok(self.state)
    }

    fn save(&mut self, state: &DeviceState) -> Result<(), Error> {
        self.state = Some(*state);
        self.saves += 1;
        Ok(())
    }
}
