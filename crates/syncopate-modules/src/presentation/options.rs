// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::resolver::PlaylistResolver;
use crate::{ModuleError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    Sequential,
    Random,
    WeightedRandom,
    RoundRobin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    #[default]
    Loop,
    Bounce,
    RandomRestart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    #[default]
    Skip,
    ReuseLast,
    Stop,
}

/// Controls how assets are picked for a feature run.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureSelection {
    #[serde(default)]
    pub mode: SelectionMode,
    #[serde(default)]
    pub dedupe_window: usize,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub group_key: Option<String>,
}

impl Default for FeatureSelection {
    fn default() -> Self {
        Self {
            mode: SelectionMode::Sequential,
            dedupe_window: 0,
            restart_policy: RestartPolicy::Loop,
            group_key: None,
        }
    }
}

/// Cadence controls for feature execution frequency.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureCadence {
    #[serde(default = "default_multiplier")]
    pub multiplier: u64,
    #[serde(default)]
    pub phase_overrides: HashMap<String, i64>,
}

fn default_multiplier() -> u64 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    List,
    Folder,
    Fallback,
}

/// Where a feature pulls its asset candidates from.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetSource {
    #[serde(default, rename = "type")]
    pub kind: SourceType,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub shuffle_on_load: bool,
    #[serde(default)]
    pub max_items: Option<usize>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
}

fn default_weight() -> f64 {
    1.0
}

fn default_cache_ttl() -> u64 {
    300
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureOptions {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub selection: FeatureSelection,
    #[serde(default)]
    pub sources: BTreeMap<String, Vec<AssetSource>>,
    #[serde(default)]
    pub fallback_asset: Option<String>,
    #[serde(default)]
    pub failure_mode: FailureMode,
    #[serde(default)]
    pub cadence: FeatureCadence,
    /// Shorthand: a plain `phase -> [items]` map, converted into list
    /// sources when no structured `sources` are given.
    #[serde(default)]
    pub assets: BTreeMap<String, Vec<String>>,
}

impl FeatureOptions {
    /// Fold the `assets` shorthand into `sources` so the engine only ever
    /// sees one shape.
    pub fn normalise(&mut self) {
        if self.sources.is_empty() && !self.assets.is_empty() {
            for (phase, items) in std::mem::take(&mut self.assets) {
                self.sources.insert(
                    phase,
                    vec![AssetSource {
                        kind: SourceType::List,
                        items,
                        path: None,
                        pattern: None,
                        recursive: false,
                        shuffle_on_load: false,
                        max_items: None,
                        weight: default_weight(),
                        cache_ttl_seconds: default_cache_ttl(),
                    }],
                );
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DescriptionOptions {
    #[serde(flatten)]
    pub feature: FeatureOptions,
    #[serde(default)]
    pub use_dynamic: bool,
    #[serde(default)]
    pub dynamic_templates: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomPhase {
    pub name: String,
    /// `HH:MM` start time.
    pub start: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SunriseOptions {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_morning_hours")]
    pub morning_duration_hours: f64,
    #[serde(default = "default_evening_hours")]
    pub evening_duration_hours: f64,
    #[serde(default = "default_night_offset")]
    pub night_offset_hours: f64,
    /// Override for tests; defaults to the public sunrise-sunset service.
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_morning_hours() -> f64 {
    3.0
}

fn default_evening_hours() -> f64 {
    2.0
}

fn default_night_offset() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseMode {
    #[default]
    None,
    SunriseSunset,
    Custom,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhasesOptions {
    #[serde(default)]
    pub mode: PhaseMode,
    #[serde(default)]
    pub sunrise: Option<SunriseOptions>,
    #[serde(default)]
    pub custom: Vec<CustomPhase>,
}

impl PhasesOptions {
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            PhaseMode::SunriseSunset if self.sunrise.is_none() => Err(ModuleError::InvalidOptions(
                "sunrise options must be provided when mode is 'sunrise_sunset'".to_string(),
            )),
            PhaseMode::Custom if self.custom.is_empty() => Err(ModuleError::InvalidOptions(
                "custom phases must be provided when mode is 'custom'".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistPresentationOptions {
    pub playlist: PlaylistResolver,
    #[serde(default)]
    pub interval_seconds: Option<u64>,
    #[serde(default)]
    pub phases: Option<PhasesOptions>,
    #[serde(default)]
    pub cover: FeatureOptions,
    #[serde(default)]
    pub title: FeatureOptions,
    #[serde(default)]
    pub description: DescriptionOptions,
    #[serde(default)]
    pub random_seed: Option<String>,
}

impl PlaylistPresentationOptions {
    pub fn validate_and_normalise(mut self) -> Result<Self> {
        if let Some(phases) = &self.phases {
            phases.validate()?;
        }
        if self.interval_seconds == Some(0) {
            return Err(ModuleError::InvalidOptions(
                "interval_seconds must be at least 1".to_string(),
            ));
        }
        self.cover.normalise();
        self.title.normalise();
        self.description.feature.normalise();
        Ok(self)
    }
}
