// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-feature selection state (or per-group when features share a
/// `group_key`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureState {
    #[serde(default)]
    pub cursor: i64,
    #[serde(default = "default_direction")]
    pub direction: i64,
    #[serde(default)]
    pub run_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_value_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub round_robin_cycle: Vec<String>,
    #[serde(default)]
    pub round_robin_pointer: usize,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub round_robin_indices: HashMap<String, usize>,
}

fn default_direction() -> i64 {
    1
}

impl Default for FeatureState {
    fn default() -> Self {
        Self {
            cursor: 0,
            direction: 1,
            run_count: 0,
            last_value: None,
            last_value_at: None,
            history: Vec::new(),
            round_robin_cycle: Vec::new(),
            round_robin_pointer: 0,
            round_robin_indices: HashMap::new(),
        }
    }
}

/// Shared state for features bound by one `group_key`: a single selection
/// state plus the per-fire value cache keyed by `phase:run_count`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupState {
    #[serde(default)]
    pub state: FeatureState,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub cache: HashMap<String, String>,
}

/// Sunrise/sunset schedule cached for one local date.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseScheduleState {
    pub date: String,
    #[serde(default)]
    pub times: BTreeMap<String, String>,
}

/// Cached folder-scan results for one source id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceCacheEntry {
    pub timestamp: i64,
    #[serde(default)]
    pub items: Vec<String>,
}

/// Last applied title/description, used to skip no-op detail updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailsState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The `playlist_presentation` scratch document inside a sync's state file.
/// Unknown keys are preserved verbatim through the `extra` map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresentationState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_phase: Option<String>,
    #[serde(default)]
    pub global_run_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_schedule: Option<PhaseScheduleState>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, FeatureState>,
    #[serde(default, skip_serializing_if = "details_is_empty")]
    pub details: DetailsState,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, GroupState>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub source_cache: HashMap<String, SourceCacheEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn details_is_empty(details: &DetailsState) -> bool {
    details.title.is_none() && details.description.is_none()
}

impl PresentationState {
    pub fn from_value(value: Option<&Value>) -> Self {
        value
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }
}
