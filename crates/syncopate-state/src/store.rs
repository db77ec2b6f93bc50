// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

use syncopate_config::{GlobalConfig, SyncConfig};

use crate::{Result, RunRecord, RunStatus, StateError};

pub const STATE_VERSION: u64 = 1;
pub const RUN_HISTORY_LIMIT: usize = 20;

const KEY_VERSION: &str = "version";
const KEY_UPDATED_AT: &str = "updated_at";
const KEY_CURSOR: &str = "last_processed_track_id";
const KEY_CURSOR_AT: &str = "last_processed_at";
const KEY_HISTORY: &str = "run_history";

fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// On-disk state for a single sync.
///
/// The dirty flag is the sole trigger for disk writes; every mutation sets
/// it, and [`SyncState::save`] clears it after a successful rename.
#[derive(Debug)]
pub struct SyncState {
    path: PathBuf,
    data: Map<String, Value>,
    dirty: bool,
}

impl SyncState {
    /// Load state from `path`, or return a blank in-memory state when the
    /// file does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                data: Map::new(),
                dirty: false,
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| StateError::Io {
            path: path.clone(),
            source,
        })?;
        let mut data: Map<String, Value> =
            serde_json::from_str(&raw).map_err(|source| StateError::Corrupt {
                path: path.clone(),
                source,
            })?;
        // metadata keys are rewritten on every save
        data.remove(KEY_VERSION);
        data.remove(KEY_UPDATED_AT);

        Ok(Self {
            path,
            data,
            dirty: false,
        })
    }

    /// Persist the document if anything changed since the last load/save.
    /// The full payload is written to a sibling temp file and renamed over
    /// the final path.
    pub fn save(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }

        let mut payload = Map::with_capacity(self.data.len() + 2);
        payload.insert(KEY_VERSION.to_string(), json!(STATE_VERSION));
        payload.insert(KEY_UPDATED_AT.to_string(), json!(utc_now_iso()));
        for (key, value) in &self.data {
            payload.insert(key.clone(), value.clone());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StateError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state.json".to_string());
        let tmp = self
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!(".{file_name}.tmp"));

        let body = serde_json::to_vec_pretty(&Value::Object(payload)).map_err(|source| {
            StateError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&tmp, body).map_err(|source| StateError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!(target: "state", path = %self.path.display(), "state saved");
        self.dirty = false;
        Ok(true)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the document dirty after direct mutation through
    /// [`SyncState::scratch_mut`].
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
        self.dirty = true;
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.data.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Mutable access to a named scratch object, created on demand. The
    /// caller owns dirty tracking via [`SyncState::mark_dirty`].
    pub fn scratch_mut(&mut self, key: &str) -> &mut Map<String, Value> {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        entry.as_object_mut().unwrap_or_else(|| unreachable!())
    }

    // ------------------------------------------------------------------
    // Cursor
    // ------------------------------------------------------------------

    pub fn last_processed_track_id(&self) -> Option<&str> {
        self.data.get(KEY_CURSOR).and_then(Value::as_str)
    }

    /// `None` clears both cursor fields; a changed id also stamps
    /// `last_processed_at`. Unchanged ids are a no-op.
    pub fn set_last_processed_track_id(&mut self, track_id: Option<&str>) {
        match track_id {
            None => {
                if self.data.remove(KEY_CURSOR).is_some() {
                    self.data.remove(KEY_CURSOR_AT);
                    self.dirty = true;
                }
            }
            Some(id) => {
                if self.last_processed_track_id() == Some(id) {
                    return;
                }
                self.data.insert(KEY_CURSOR.to_string(), json!(id));
                self.data.insert(KEY_CURSOR_AT.to_string(), json!(utc_now_iso()));
                self.dirty = true;
            }
        }
    }

    // ------------------------------------------------------------------
    // Run history
    // ------------------------------------------------------------------

    /// Append a `running` record for a new fire.
    pub fn begin_run(&mut self, run_id: &str, started_at: Option<&str>) {
        let record = json!({
            "id": run_id,
            "status": RunStatus::Running.as_str(),
            "started_at": started_at.map(str::to_string).unwrap_or_else(utc_now_iso),
        });
        self.history_mut().push(record);
        self.trim_history();
        self.dirty = true;
    }

    /// Mutate the youngest record matching `run_id`, or append a synthetic
    /// one when the fire was never begun. Passing `None` for `error` or
    /// `details` removes those fields.
    pub fn complete_run(
        &mut self,
        run_id: &str,
        status: RunStatus,
        completed_at: Option<String>,
        error: Option<String>,
        details: Option<Value>,
    ) {
        let completed_at = completed_at.unwrap_or_else(utc_now_iso);
        let history = self.history_mut();

        let position = history
            .iter()
            .rposition(|entry| entry.get("id").and_then(Value::as_str) == Some(run_id));
        let index = match position {
            Some(index) => index,
            None => {
                history.push(json!({
                    "id": run_id,
                    "started_at": completed_at,
                }));
                history.len() - 1
            }
        };

        if let Some(record) = history[index].as_object_mut() {
            record.insert("status".to_string(), json!(status.as_str()));
            record.insert("completed_at".to_string(), json!(completed_at));
            match error {
                Some(message) => {
                    record.insert("error".to_string(), json!(message));
                }
                None => {
                    record.remove("error");
                }
            }
            match details {
                Some(value) => {
                    record.insert("details".to_string(), value);
                }
                None => {
                    record.remove("details");
                }
            }
        }

        self.trim_history();
        self.dirty = true;
    }

    /// Typed view of the run history, newest last. Malformed entries are
    /// skipped rather than failing the whole read.
    pub fn run_history(&self) -> Vec<RunRecord> {
        self.data
            .get(KEY_HISTORY)
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn history_mut(&mut self) -> &mut Vec<Value> {
        let entry = self
            .data
            .entry(KEY_HISTORY.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        entry.as_array_mut().unwrap_or_else(|| unreachable!())
    }

    fn trim_history(&mut self) {
        let history = self.history_mut();
        if history.len() > RUN_HISTORY_LIMIT {
            let excess = history.len() - RUN_HISTORY_LIMIT;
            history.drain(..excess);
        }
    }
}

/// Resolve the state file path for a sync: explicit `state_file` (absolute or
/// relative to the storage dir), else `<storage>/<id>.json`.
pub fn state_path_for_sync(config: &GlobalConfig, sync: &SyncConfig) -> PathBuf {
    let storage_root = expand_tilde(&config.runtime.storage_dir);
    match &sync.state_file {
        Some(state_file) => {
            let candidate = PathBuf::from(state_file);
            if candidate.is_absolute() {
                candidate
            } else {
                storage_root.join(candidate)
            }
        }
        None => storage_root.join(format!("{}.json", sync.id)),
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(stripped) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(stripped),
        None => path.to_path_buf(),
    }
}
