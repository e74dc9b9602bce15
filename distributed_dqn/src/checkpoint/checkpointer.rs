//! Directory-based JSON checkpointing for learner and counter state.
//!
//! Each save writes `checkpoint_{seq:08}.json` through a temporary file and a
//! rename, so a crash mid-write never leaves a truncated latest checkpoint.
//! Only the newest `keep_last_n` files are retained.

use crate::core::SharedClock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const PREFIX: &str = "checkpoint_";
const SUFFIX: &str = ".json";

/// Configuration for the checkpointer.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    /// Directory to store checkpoints.
    pub checkpoint_dir: PathBuf,
    /// Number of recent checkpoints to keep (0 = keep all).
    pub keep_last_n: usize,
    /// Wall-clock time between periodic saves.
    pub time_delta: Duration,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("./checkpoints"),
            keep_last_n: 2,
            time_delta: Duration::from_secs(60),
        }
    }
}

impl CheckpointerConfig {
    /// Create a new config with specified checkpoint directory.
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    /// Set the number of checkpoints to keep.
    pub fn with_keep_last_n(mut self, n: usize) -> Self {
        self.keep_last_n = n;
        self
    }

    /// Set the interval between periodic saves.
    pub fn with_time_delta(mut self, time_delta: Duration) -> Self {
        self.time_delta = time_delta;
        self
    }
}

/// Error type for checkpointing operations.
#[derive(Debug)]
pub enum CheckpointError {
    /// IO error during save/load.
    Io(io::Error),
    /// Payload could not be encoded or decoded.
    Serde(serde_json::Error),
    /// No checkpoints found.
    NoCheckpoints,
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "IO error: {}", e),
            CheckpointError::Serde(e) => write!(f, "Serialization error: {}", e),
            CheckpointError::NoCheckpoints => write!(f, "No checkpoints found"),
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CheckpointError::Io(e) => Some(e),
            CheckpointError::Serde(e) => Some(e),
            CheckpointError::NoCheckpoints => None,
        }
    }
}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

impl From<serde_json::Error> for CheckpointError {
    fn from(e: serde_json::Error) -> Self {
        CheckpointError::Serde(e)
    }
}

/// Checkpoint metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// Path to the checkpoint file.
    pub path: PathBuf,
    /// Monotonic save sequence number.
    pub sequence: u64,
}

/// Writes and reads serde-serializable state snapshots.
pub struct Checkpointer {
    config: CheckpointerConfig,
    next_sequence: u64,
}

impl Checkpointer {
    /// Create a new checkpointer.
    ///
    /// Creates the checkpoint directory if it doesn't exist and continues the
    /// sequence numbering of any checkpoints already in it.
    pub fn new(config: CheckpointerConfig) -> Result<Self, CheckpointError> {
        fs::create_dir_all(&config.checkpoint_dir)?;

        let next_sequence = list_in(&config.checkpoint_dir)?
            .last()
            .map(|c| c.sequence + 1)
            .unwrap_or(0);

        Ok(Self {
            config,
            next_sequence,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    /// Save a state snapshot, then drop checkpoints beyond `keep_last_n`.
    pub fn save<S: Serialize>(&mut self, state: &S) -> Result<PathBuf, CheckpointError> {
        let sequence = self.next_sequence;
        let path = self.config.checkpoint_dir.join(file_name(sequence));
        let tmp = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec(state)?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;

        self.next_sequence += 1;
        self.cleanup_old_checkpoints()?;

        log::debug!("[Checkpointer] saved {}", path.display());
        Ok(path)
    }

    /// Load a state snapshot from a checkpoint file.
    pub fn load<S: DeserializeOwned>(&self, path: &Path) -> Result<S, CheckpointError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Load the latest checkpoint.
    pub fn load_latest<S: DeserializeOwned>(&self) -> Result<(S, CheckpointInfo), CheckpointError> {
        let latest = self.find_latest_checkpoint()?;
        let state = self.load(&latest.path)?;
        Ok((state, latest))
    }

    /// Find the latest checkpoint in the checkpoint directory.
    pub fn find_latest_checkpoint(&self) -> Result<CheckpointInfo, CheckpointError> {
        list_in(&self.config.checkpoint_dir)?
            .pop()
            .ok_or(CheckpointError::NoCheckpoints)
    }

    /// List all checkpoints in the directory, oldest first.
    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        list_in(&self.config.checkpoint_dir)
    }

    /// Cleanup old checkpoints, keeping only the last N.
    fn cleanup_old_checkpoints(&mut self) -> Result<(), CheckpointError> {
        if self.config.keep_last_n == 0 {
            return Ok(()); // Keep all
        }

        let checkpoints = list_in(&self.config.checkpoint_dir)?;
        let excess = checkpoints.len().saturating_sub(self.config.keep_last_n);
        for old in &checkpoints[..excess] {
            if let Err(e) = fs::remove_file(&old.path) {
                log::warn!("[Checkpointer] failed to remove {}: {}", old.path.display(), e);
            }
        }

        Ok(())
    }
}

fn file_name(sequence: u64) -> String {
    format!("{}{:08}{}", PREFIX, sequence, SUFFIX)
}

fn list_in(dir: &Path) -> Result<Vec<CheckpointInfo>, CheckpointError> {
    let mut checkpoints: Vec<CheckpointInfo> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let path = e.path();
            let sequence = path
                .file_name()?
                .to_str()?
                .strip_prefix(PREFIX)?
                .strip_suffix(SUFFIX)?
                .parse()
                .ok()?;
            Some(CheckpointInfo { path, sequence })
        })
        .collect();

    checkpoints.sort_by_key(|c| c.sequence);
    Ok(checkpoints)
}

/// Saves state on a wall-clock interval.
///
/// The owner calls [`maybe_save`](Self::maybe_save) from its own loop; the
/// runner never spawns threads, so a save blocks only its owner.
pub struct CheckpointingRunner {
    checkpointer: Checkpointer,
    clock: SharedClock,
    time_delta: Duration,
    last_save: Instant,
}

impl CheckpointingRunner {
    pub fn new(checkpointer: Checkpointer, clock: SharedClock) -> Self {
        let time_delta = checkpointer.config().time_delta;
        let last_save = clock.now();
        Self {
            checkpointer,
            clock,
            time_delta,
            last_save,
        }
    }

    /// Latest saved state, if any.
    ///
    /// A missing or unreadable checkpoint is not an error: the caller starts
    /// fresh.
    pub fn restore<S: DeserializeOwned>(&self) -> Option<S> {
        match self.checkpointer.load_latest() {
            Ok((state, info)) => {
                log::info!("[Checkpointer] restored {}", info.path.display());
                Some(state)
            }
            Err(CheckpointError::NoCheckpoints) => None,
            Err(e) => {
                log::warn!("[Checkpointer] ignoring unreadable checkpoint: {}", e);
                None
            }
        }
    }

    /// Whether `time_delta` has elapsed since the last save.
    pub fn is_due(&self) -> bool {
        self.clock.now().duration_since(self.last_save) >= self.time_delta
    }

    /// Save if the interval has elapsed. Returns the written path, if any.
    pub fn maybe_save<S: Serialize>(&mut self, state: &S) -> Result<Option<PathBuf>, CheckpointError> {
        if !self.is_due() {
            return Ok(None);
        }
        self.save(state).map(Some)
    }

    /// Save immediately and restart the interval.
    pub fn save<S: Serialize>(&mut self, state: &S) -> Result<PathBuf, CheckpointError> {
        let path = self.checkpointer.save(state)?;
        self.last_save = self.clock.now();
        Ok(path)
    }

    /// Underlying checkpointer.
    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }
}
