//! Local, non-authoritative mirror of in-progress answers and flags.
//!
//! Drafts are plain JSON documents keyed by `(set_id, attempt_id)`:
//!
//! ```json
//! {"answers": {"12": 48}, "flagged": {"13": true}, "updatedAt": 1700000000000}
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use quiz_core::model::{AttemptId, OptionId, QuestionId, SetId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DraftStoreError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("draft store lock poisoned")]
    Poisoned,
}

/// Snapshot of a student's local progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalDraft {
    #[serde(default)]
    pub answers: BTreeMap<QuestionId, OptionId>,
    #[serde(default)]
    pub flagged: BTreeMap<QuestionId, bool>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub updated_at: i64,
}

impl LocalDraft {
    /// Questions whose flag is set.
    pub fn flagged_questions(&self) -> impl Iterator<Item = QuestionId> + '_ {
        self.flagged
            .iter()
            .filter(|(_, flagged)| **flagged)
            .map(|(id, _)| *id)
    }
}

/// Storage key of a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DraftKey {
    pub set_id: SetId,
    pub attempt_id: AttemptId,
}

impl DraftKey {
    #[must_use]
    pub fn new(set_id: SetId, attempt_id: AttemptId) -> Self {
        Self { set_id, attempt_id }
    }

    fn file_name(&self) -> String {
        format!("quiz_draft_{}_{}.json", self.set_id, self.attempt_id)
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "quiz_draft:{}:{}", self.set_id, self.attempt_id)
    }
}

/// Synchronous local persistence for drafts.
///
/// Calls are expected to be quick (local disk or memory) and are made inline
/// on every answer/flag change.
pub trait DraftStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `DraftStoreError` when the stored draft cannot be read or parsed.
    fn load(&self, key: &DraftKey) -> Result<Option<LocalDraft>, DraftStoreError>;

    /// # Errors
    ///
    /// Returns `DraftStoreError` when the draft cannot be written.
    fn save(&self, key: &DraftKey, draft: &LocalDraft) -> Result<(), DraftStoreError>;

    /// Removing a missing draft is not an error.
    ///
    /// # Errors
    ///
    /// Returns `DraftStoreError` when the draft cannot be removed.
    fn remove(&self, key: &DraftKey) -> Result<(), DraftStoreError>;
}

/// Keeps serialized drafts in memory. Useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryDraftStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryDraftStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw text under `key`, bypassing serialization.
    ///
    /// # Errors
    ///
    /// Returns `DraftStoreError::Poisoned` if the lock is poisoned.
    pub fn put_raw(&self, key: &DraftKey, raw: impl Into<String>) -> Result<(), DraftStoreError> {
        let mut guard = self.entries.lock().map_err(|_| DraftStoreError::Poisoned)?;
        guard.insert(key.to_string(), raw.into());
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, key: &DraftKey) -> bool {
        self.entries
            .lock()
            .is_ok_and(|guard| guard.contains_key(&key.to_string()))
    }
}

impl DraftStore for InMemoryDraftStore {
    fn load(&self, key: &DraftKey) -> Result<Option<LocalDraft>, DraftStoreError> {
        let guard = self.entries.lock().map_err(|_| DraftStoreError::Poisoned)?;
        guard
            .get(&key.to_string())
            .map(|raw| serde_json::from_str(raw))
            .transpose()
            .map_err(DraftStoreError::from)
    }

    fn save(&self, key: &DraftKey, draft: &LocalDraft) -> Result<(), DraftStoreError> {
        let raw = serde_json::to_string(draft)?;
        let mut guard = self.entries.lock().map_err(|_| DraftStoreError::Poisoned)?;
        guard.insert(key.to_string(), raw);
        Ok(())
    }

    fn remove(&self, key: &DraftKey) -> Result<(), DraftStoreError> {
        let mut guard = self.entries.lock().map_err(|_| DraftStoreError::Poisoned)?;
        guard.remove(&key.to_string());
        Ok(())
    }
}

/// One JSON file per draft inside a directory.
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    dir: PathBuf,
}

impl FileDraftStore {
    /// Creates the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `DraftStoreError::Io` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, DraftStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &DraftKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl DraftStore for FileDraftStore {
    fn load(&self, key: &DraftKey) -> Result<Option<LocalDraft>, DraftStoreError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &DraftKey, draft: &LocalDraft) -> Result<(), DraftStoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(draft)?)?;
        // rename keeps readers from ever seeing a half-written draft
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &DraftKey) -> Result<(), DraftStoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
