//! Score Ledger
//!
//! Durable per-participant statistics, kept as a single JSON file. The
//! ledger is the only state that survives restarts; it is read fully and
//! rewritten fully on every reduce batch, with an atomic replace so a
//! crashed write never leaves a half-written file behind.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Persistent statistics for one participant
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreEntry {
    /// Best-effort display name; left unset when lookup fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Total answers recorded for this user
    #[serde(default)]
    pub attempted: u64,
    /// Correct answers
    #[serde(default)]
    pub correct: u64,
    /// Wrong answers
    #[serde(default)]
    pub wrong: u64,
    /// Signed running score: +1 per correct, -negative per wrong
    #[serde(default)]
    pub score: f64,
}

/// File-backed ledger mapping user id → [`ScoreEntry`]
pub struct ScoreLedger {
    path: PathBuf,
    // Serializes every read-modify-write cycle; concurrent reduces for
    // different polls still touch the same per-user entries.
    write_lock: Mutex<()>,
}

impl ScoreLedger {
    /// Create a ledger backed by the given file. The file is not touched
    /// until the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full ledger. A missing file is an empty ledger; an
    /// unreadable or corrupt file is logged and also treated as empty.
    pub fn load(&self) -> HashMap<String, ScoreEntry> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "Failed to read score ledger, continuing with empty scores");
                return HashMap::new();
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "Score ledger is corrupt, continuing with empty scores");
                HashMap::new()
            }
        }
    }

    /// Run one read-modify-write cycle under the ledger lock: load the full
    /// store, let `mutate` update it, and rewrite the file atomically.
    pub fn apply(&self, mutate: impl FnOnce(&mut HashMap<String, ScoreEntry>)) {
        let _guard = self.write_lock.lock();
        let mut entries = self.load();
        mutate(&mut entries);
        if let Err(err) = self.save(&entries) {
            tracing::error!(path = %self.path.display(), error = %err, "Failed to persist score ledger");
        }
    }

    /// Write the full store: serialize to a sibling temp file, then rename
    /// over the real one so readers never observe a partial write.
    fn save(&self, entries: &HashMap<String, ScoreEntry>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }
}
