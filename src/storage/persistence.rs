//! Snapshot persistence for conversation, user, chat and bot state.
//!
//! Every update is sanitized, compared with the last stored value, and only
//! then written. A value that still cannot be encoded is skipped with a
//! warning; callers never see an error from an update.

use super::sanitize::{sanitize_report, StateValue};
use super::StorageError;
use crate::utils::logging::{log_persist_skipped, log_persist_warning};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

/// Result of a single update call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Stored in memory and, unless flushing is deferred, written to disk.
    Written,
    /// Equal to what is already stored; nothing was done.
    Unchanged,
    /// Could not be encoded; the previous value is kept.
    Rejected,
}

/// Everything the engine keeps across restarts besides the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    /// flow name → conversation key → state
    pub conversations: BTreeMap<String, BTreeMap<String, StateValue>>,
    pub user_data: BTreeMap<u64, StateValue>,
    pub chat_data: BTreeMap<i64, StateValue>,
    pub bot_data: StateValue,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            conversations: BTreeMap::new(),
            user_data: BTreeMap::new(),
            chat_data: BTreeMap::new(),
            bot_data: StateValue::default(),
        }
    }
}

pub struct SnapshotPersistence {
    path: PathBuf,
    on_flush: bool,
    snapshot: Mutex<Snapshot>,
}

impl SnapshotPersistence {
    /// Opens the snapshot at `path`, starting empty if the file is missing.
    ///
    /// With `on_flush` set, updates stay in memory until [`flush`](Self::flush).
    pub fn open(path: impl Into<PathBuf>, on_flush: bool) -> Result<Self, StorageError> {
        let path = path.into();
        let snapshot = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            Snapshot::default()
        };
        Ok(Self {
            path,
            on_flush,
            snapshot: Mutex::new(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    pub fn conversations(&self, name: &str) -> BTreeMap<String, StateValue> {
        self.lock().conversations.get(name).cloned().unwrap_or_default()
    }

    pub fn user_data(&self, user_id: u64) -> Option<StateValue> {
        self.lock().user_data.get(&user_id).cloned()
    }

    pub fn chat_data(&self, chat_id: i64) -> Option<StateValue> {
        self.lock().chat_data.get(&chat_id).cloned()
    }

    pub fn bot_data(&self) -> StateValue {
        self.lock().bot_data.clone()
    }

    /// Records the state of one conversation; `None` ends it.
    pub fn update_conversation(&self, name: &str, key: &str, new_state: Option<&StateValue>) -> WriteOutcome {
        let Some(new_state) = new_state else {
            let mut snapshot = self.lock();
            let removed = snapshot
                .conversations
                .get_mut(name)
                .and_then(|states| states.remove(key))
                .is_some();
            if !removed {
                return WriteOutcome::Unchanged;
            }
            self.write_through(&snapshot);
            return WriteOutcome::Written;
        };

        self.apply(
            "conversation",
            new_state,
            |s| s.conversations.get(name).and_then(|states| states.get(key)),
            |s, value| {
                s.conversations
                    .entry(name.to_string())
                    .or_default()
                    .insert(key.to_string(), value);
            },
        )
    }

    pub fn update_user_data(&self, user_id: u64, data: &StateValue) -> WriteOutcome {
        self.apply(
            "user_data",
            data,
            |s| s.user_data.get(&user_id),
            |s, value| {
                s.user_data.insert(user_id, value);
            },
        )
    }

    pub fn update_chat_data(&self, chat_id: i64, data: &StateValue) -> WriteOutcome {
        self.apply(
            "chat_data",
            data,
            |s| s.chat_data.get(&chat_id),
            |s, value| {
                s.chat_data.insert(chat_id, value);
            },
        )
    }

    pub fn update_bot_data(&self, data: &StateValue) -> WriteOutcome {
        self.apply("bot_data", data, |s| Some(&s.bot_data), |s, value| s.bot_data = value)
    }

    /// Writes the whole snapshot to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        let snapshot = self.lock();
        self.dump(&snapshot)
    }

    fn apply(
        &self,
        kind: &'static str,
        data: &StateValue,
        current: impl FnOnce(&Snapshot) -> Option<&StateValue>,
        store: impl FnOnce(&mut Snapshot, StateValue),
    ) -> WriteOutcome {
        let (clean, dropped) = sanitize_report(data);
        if dropped > 0 {
            log_persist_warning(kind, &format!("dropped {dropped} unpersistable value(s) from {data:?}"));
        }
        let Some(clean) = clean else {
            log_persist_skipped(kind, "value has no persistable form");
            return WriteOutcome::Rejected;
        };

        let mut snapshot = self.lock();
        if current(&*snapshot) == Some(&clean) {
            return WriteOutcome::Unchanged;
        }
        if let Err(e) = serde_json::to_vec(&clean) {
            log_persist_skipped(kind, &format!("value could not be encoded: {e}"));
            return WriteOutcome::Rejected;
        }

        store(&mut *snapshot, clean);
        self.write_through(&snapshot);
        WriteOutcome::Written
    }

    fn write_through(&self, snapshot: &Snapshot) {
        if self.on_flush {
            return;
        }
        if let Err(e) = self.dump(snapshot) {
            error!("Failed to write snapshot {}: {}", self.path.display(), e);
        }
    }

    /// Checks that the snapshot still encodes and that nothing sits in the
    /// way of writing it. Does not touch the file.
    pub fn check(&self) -> Result<(), StorageError> {
        serde_json::to_vec(&*self.lock())?;
        let blocked = |what: String| StorageError::Io(std::io::Error::new(std::io::ErrorKind::PermissionDenied, what));
        if self.path.is_dir() {
            return Err(blocked(format!("{} is a directory", self.path.display())));
        }
        if let Some(parent) = self.path.parent().filter(|p| p.exists()) {
            let meta = std::fs::metadata(parent)?;
            if !meta.is_dir() || meta.permissions().readonly() {
                return Err(blocked(format!("{} is not a writable directory", parent.display())));
            }
        }
        Ok(())
    }

    fn dump(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let bytes = serde_json::to_vec(snapshot)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Snapshot written to {}", self.path.display());
        Ok(())
    }
}
