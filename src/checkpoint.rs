//! Step-keyed checkpoint storage
//!
//! Checkpoints are JSON files named `checkpoint-{key}.json` inside a single
//! directory, where the key is the step index the checkpoint was saved
//! under. Emergency snapshots taken during out-of-memory recovery use the
//! reserved sentinel key [`EMERGENCY_STEP`]; the payload keeps the real step
//! so a resumed run continues from the right place.
//!
//! Writes go through a temporary file and a rename, so a crash mid-save
//! never leaves a truncated checkpoint under a valid key.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::ModelState;
use crate::optim::OptimizerState;
use crate::risk::RiskEngineState;

/// Reserved step key for emergency snapshots, far beyond any real step index
pub const EMERGENCY_STEP: u64 = 100_000_000;

/// Everything needed to resume training from a step boundary
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The last completed step (the real one, even in emergency snapshots)
    pub step: u64,
    pub model: ModelState,
    pub optimizer: OptimizerState,
    pub risk_engine: RiskEngineState,
}

/// A directory of step-keyed checkpoints
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open (creating if needed) a checkpoint directory
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: u64) -> PathBuf {
        self.dir.join(format!("checkpoint-{key}.json"))
    }

    fn write(&self, key: u64, checkpoint: &Checkpoint) -> Result<()> {
        let json = serde_json::to_string(checkpoint)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".checkpoint-{key}.json.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!(key, path = %path.display(), "checkpoint written");
        Ok(())
    }

    fn read(&self, key: u64) -> Result<Checkpoint> {
        let path = self.path_for(key);
        let json = fs::read_to_string(&path)
            .map_err(|e| Error::Checkpoint(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Checkpoint(format!("corrupt checkpoint {}: {e}", path.display())))
    }

    /// Save a checkpoint under its own step index
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.write(checkpoint.step, checkpoint)
    }

    /// Save an emergency snapshot under the reserved sentinel key. The
    /// payload's `step` field keeps the real step.
    pub fn save_emergency(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.write(EMERGENCY_STEP, checkpoint)
    }

    /// Load a checkpoint saved under the given step index
    pub fn load(&self, step: u64) -> Result<Checkpoint> {
        self.read(step)
    }

    /// Load the emergency snapshot, if present
    pub fn load_emergency(&self) -> Result<Checkpoint> {
        self.read(EMERGENCY_STEP)
    }

    pub fn has_emergency(&self) -> bool {
        self.path_for(EMERGENCY_STEP).exists()
    }

    /// Remove the emergency snapshot after a successful recovery
    pub fn remove_emergency(&self) -> Result<()> {
        let path = self.path_for(EMERGENCY_STEP);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// The highest key present in the directory, emergency sentinel included
    pub fn latest_step(&self) -> Result<Option<u64>> {
        let mut latest = None;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(key) = parse_key(&name.to_string_lossy()) else { continue };
            if latest.map_or(true, |best| key > best) {
                latest = Some(key);
            }
        }
        Ok(latest)
    }

    /// Load the checkpoint with the highest key. An emergency snapshot, when
    /// present, always wins (its sentinel key outranks real steps).
    pub fn load_latest(&self) -> Result<Option<Checkpoint>> {
        match self.latest_step()? {
            Some(key) => Ok(Some(self.read(key)?)),
            None => Ok(None),
        }
    }
}

fn parse_key(name: &str) -> Option<u64> {
    name.strip_prefix("checkpoint-")?.strip_suffix(".json")?.parse().ok()
}
