// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::schedule::parse_interval;
use crate::{ConfigError, Result};

const SYNC_FILE_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// Scheduling information for a sync: exactly one of `interval` or `cron`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSchedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
}

impl SyncSchedule {
    pub fn validate(&self) -> Result<()> {
        match (&self.interval, &self.cron) {
            (Some(interval), None) => parse_interval(interval).map(|_| ()),
            (None, Some(_)) => Ok(()),
            _ => Err(ConfigError::ScheduleInvalid),
        }
    }

    /// Total seconds for interval schedules; `None` for cron schedules.
    pub fn interval_seconds(&self) -> Option<u64> {
        self.interval
            .as_deref()
            .and_then(|expr| parse_interval(expr).ok())
    }
}

/// Definition of a single sync job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub schedule: SyncSchedule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "empty_options")]
    pub options: serde_json::Value,
}

fn empty_options() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Yield the YAML files representing sync definitions, sorted by name.
pub fn iter_sync_config_paths(syncs_dir: &Path) -> Result<Vec<PathBuf>> {
    if !syncs_dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(syncs_dir).map_err(|source| ConfigError::Io {
        path: syncs_dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| SYNC_FILE_EXTENSIONS.contains(&ext))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Load all sync configurations from the syncs directory. Ids must be unique
/// and every schedule must be well-formed.
pub fn load_sync_configs(syncs_dir: &Path) -> Result<Vec<SyncConfig>> {
    let mut configs = Vec::new();
    let mut seen = HashSet::new();

    for path in iter_sync_config_paths(syncs_dir)? {
        let config = load_sync_config_file(&path)?;
        if !seen.insert(config.id.clone()) {
            return Err(ConfigError::DuplicateSyncId(config.id));
        }
        configs.push(config);
    }
    Ok(configs)
}

/// Load and validate a single sync definition file.
pub fn load_sync_config_file(path: &Path) -> Result<SyncConfig> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: SyncConfig = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    normalise_identifier(&config.id)?;
    config.schedule.validate()?;
    Ok(config)
}

/// Identifiers become file names; reject separators and control characters.
fn normalise_identifier(identifier: &str) -> Result<&str> {
    let candidate = identifier.trim();
    if candidate.is_empty() {
        return Err(ConfigError::InvalidIdentifier(identifier.to_string()));
    }
    if candidate
        .chars()
        .any(|c| matches!(c, '/' | '\\' | '\0' | '\n' | '\r' | '\t'))
    {
        return Err(ConfigError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(candidate)
}
