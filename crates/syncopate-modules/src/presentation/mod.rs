// SPDX-License-Identifier: GPL-3.0-or-later

//! Rotate playlist cover art, titles, and descriptions.
//!
//! The engine is a per-sync state machine: a time phase picks the asset
//! bucket, cadence rules throttle individual features, selection strategies
//! walk the candidate pool, and a dedupe window keeps recent picks from
//! repeating. Features sharing a group key resolve to the same value within
//! one fire.

pub mod options;
pub mod phases;
pub mod selection;
pub mod sources;
pub mod state;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use syncopate_config::SyncConfig;
use syncopate_spotify::SpotifyError;
use syncopate_state::RunStatus;

use crate::context::SyncContext;
use crate::module::SyncModule;
use crate::outcome::RunOutcome;
use crate::resolver::parse_options;
use crate::{ModuleError, Result};

use options::{FailureMode, FeatureOptions, PhaseMode, PlaylistPresentationOptions};
use phases::DEFAULT_PHASE;
use sources::Candidate;
use state::{FeatureState, PhaseScheduleState, PresentationState};

const DEFAULT_INTERVAL_SECONDS: u64 = 300;

/// Selection result for one feature within a fire.
#[derive(Debug, Clone)]
struct FeatureDecision {
    apply: bool,
    value: Option<String>,
    reason: Option<&'static str>,
}

impl FeatureDecision {
    fn skip(reason: &'static str) -> Self {
        Self {
            apply: false,
            value: None,
            reason: Some(reason),
        }
    }

    fn apply(value: String) -> Self {
        Self {
            apply: true,
            value: Some(value),
            reason: None,
        }
    }

    fn fallback(value: String) -> Self {
        Self {
            apply: true,
            value: Some(value),
            reason: Some("fallback_asset"),
        }
    }
}

#[derive(Debug)]
pub struct PlaylistPresentationModule {
    options: PlaylistPresentationOptions,
    schedule_interval: Option<u64>,
    summary: Map<String, Value>,
}

impl PlaylistPresentationModule {
    pub fn new(sync: &SyncConfig) -> Result<Self> {
        let options: PlaylistPresentationOptions = parse_options(&sync.options)?;
        Ok(Self {
            options: options.validate_and_normalise()?,
            schedule_interval: sync.schedule.interval_seconds(),
            summary: Map::new(),
        })
    }

    fn note(&mut self, key: &str, value: impl Into<Value>) {
        self.summary.insert(key.to_string(), value.into());
    }

    fn any_feature_enabled(&self) -> bool {
        self.options.cover.enabled
            || self.options.title.enabled
            || self.options.description.feature.enabled
    }

    /// Explicit option first, then the job's own schedule, then five minutes.
    fn effective_interval(&self) -> u64 {
        self.options
            .interval_seconds
            .or(self.schedule_interval)
            .unwrap_or(DEFAULT_INTERVAL_SECONDS)
    }

    fn build_rng(&self, run_count: u64) -> StdRng {
        match &self.options.random_seed {
            Some(seed) => {
                let mut hasher = DefaultHasher::new();
                format!("{seed}:{run_count}").hash(&mut hasher);
                StdRng::seed_from_u64(hasher.finish())
            }
            None => StdRng::from_os_rng(),
        }
    }

    async fn determine_phase(
        &self,
        pres: &mut PresentationState,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> String {
        let Some(phase_options) = &self.options.phases else {
            return DEFAULT_PHASE.to_string();
        };

        match phase_options.mode {
            PhaseMode::None => DEFAULT_PHASE.to_string(),
            PhaseMode::Custom => {
                let schedule =
                    phases::build_custom_schedule(&phase_options.custom, now.with_timezone(&tz));
                phases::phase_from_schedule(&schedule, now)
            }
            PhaseMode::SunriseSunset => {
                let Some(sunrise) = &phase_options.sunrise else {
                    return DEFAULT_PHASE.to_string();
                };

                let today = now.with_timezone(&tz).date_naive().to_string();
                let cached = pres
                    .phase_schedule
                    .as_ref()
                    .is_some_and(|schedule| schedule.date == today);
                if !cached {
                    match phases::fetch_sunrise_schedule(sunrise, tz).await {
                        Some(schedule) => {
                            pres.phase_schedule = Some(PhaseScheduleState {
                                date: today,
                                times: schedule
                                    .into_iter()
                                    .map(|(phase, start)| (phase, start.to_rfc3339()))
                                    .collect(),
                            });
                        }
                        None => return DEFAULT_PHASE.to_string(),
                    }
                }

                let schedule: Vec<(String, DateTime<Utc>)> = pres
                    .phase_schedule
                    .as_ref()
                    .map(|cached| {
                        cached
                            .times
                            .iter()
                            .filter_map(|(phase, raw)| {
                                DateTime::parse_from_rfc3339(raw)
                                    .ok()
                                    .map(|dt| (phase.clone(), dt.with_timezone(&Utc)))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                if schedule.is_empty() {
                    return DEFAULT_PHASE.to_string();
                }
                phases::phase_from_schedule(&schedule, now)
            }
        }
    }

    /// Resolve whether a feature should update this fire and with which
    /// asset. Pure state-machine work: no remote calls happen here.
    #[allow(clippy::too_many_arguments)]
    fn evaluate_feature(
        &self,
        name: &str,
        feature: &FeatureOptions,
        dynamic_candidates: Vec<String>,
        pres: &mut PresentationState,
        phase: &str,
        now: DateTime<Utc>,
        base_dir: &Path,
        rng: &mut StdRng,
    ) -> FeatureDecision {
        if !feature.enabled {
            return FeatureDecision::skip("disabled");
        }

        let global_count = pres.global_run_count;
        let group_key = feature.selection.group_key.clone();

        // cadence gates before any candidate work
        {
            let feature_state = match &group_key {
                Some(key) => &mut pres.groups.entry(key.clone()).or_default().state,
                None => pres.features.entry(name.to_string()).or_default(),
            };
            feature_state.run_count += 1;
            if !within_cadence(&feature.cadence, feature_state, phase, now, global_count) {
                return FeatureDecision::skip("cadence_skip");
            }
        }

        let (mut candidates, buckets) = sources::collect_candidates(
            name,
            feature,
            phase,
            base_dir,
            &mut pres.source_cache,
            now.timestamp(),
            rng,
        );
        candidates.extend(dynamic_candidates.into_iter().map(|value| Candidate {
            value,
            weight: 1.0,
            source_id: "dynamic".to_string(),
        }));

        if candidates.is_empty() {
            return match &feature.fallback_asset {
                Some(asset) => FeatureDecision::fallback(asset.clone()),
                None => FeatureDecision::skip("no_assets"),
            };
        }

        let selected = match &group_key {
            Some(key) => {
                let group = pres.groups.entry(key.clone()).or_default();
                selection::select_value(
                    &candidates,
                    &buckets,
                    &feature.selection,
                    &mut group.state,
                    Some(&mut group.cache),
                    phase,
                    global_count,
                    rng,
                )
            }
            None => selection::select_value(
                &candidates,
                &buckets,
                &feature.selection,
                pres.features.entry(name.to_string()).or_default(),
                None,
                phase,
                global_count,
                rng,
            ),
        };

        let Some(value) = selected else {
            return match &feature.fallback_asset {
                Some(asset) => FeatureDecision::fallback(asset.clone()),
                None => FeatureDecision::skip("selection_failed"),
            };
        };

        let feature_state = match &group_key {
            Some(key) => &mut pres.groups.entry(key.clone()).or_default().state,
            None => pres.features.entry(name.to_string()).or_default(),
        };
        feature_state.history.push(value.clone());
        selection::trim_history(&mut feature_state.history, feature.selection.dedupe_window);
        feature_state.last_value = Some(value.clone());
        feature_state.last_value_at = Some(iso(now));

        FeatureDecision::apply(value)
    }

    fn feature_last_value(&self, pres: &PresentationState, name: &str) -> Option<String> {
        let feature = match name {
            "cover" => &self.options.cover,
            "title" => &self.options.title,
            _ => &self.options.description.feature,
        };
        let state = match &feature.selection.group_key {
            Some(key) => pres.groups.get(key).map(|group| &group.state),
            None => pres.features.get(name),
        };
        state.and_then(|state| state.last_value.clone())
    }

    /// Decide how to proceed after a remote update failure. `Ok(())` means
    /// the failure was absorbed; `Err` re-raises per the `stop` mode.
    fn handle_failure(
        &self,
        feature: &'static str,
        mode: FailureMode,
        last_value: Option<String>,
        phase: &str,
        error: ModuleError,
    ) -> Result<()> {
        match mode {
            FailureMode::ReuseLast if last_value.is_some() => {
                warn!(
                    target: "playlist_presentation",
                    feature,
                    phase,
                    error = %error,
                    "update failed, reusing last value"
                );
                Ok(())
            }
            FailureMode::Stop => Err(error),
            _ => {
                warn!(
                    target: "playlist_presentation",
                    feature,
                    phase,
                    error = %error,
                    "update failed, skipped"
                );
                Ok(())
            }
        }
    }

    fn encode_image(&self, raw_path: &str, base_dir: &Path) -> Result<String> {
        let path = {
            let candidate = PathBuf::from(raw_path);
            if candidate.is_absolute() {
                candidate
            } else {
                base_dir.join(candidate)
            }
        };
        let bytes = std::fs::read(&path).map_err(|source| ModuleError::AssetRead {
            path,
            source,
        })?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

fn within_cadence(
    cadence: &options::FeatureCadence,
    feature_state: &FeatureState,
    phase: &str,
    now: DateTime<Utc>,
    global_count: u64,
) -> bool {
    if cadence.multiplier > 1 && global_count % cadence.multiplier != 0 {
        return false;
    }

    if let Some(min_seconds) = cadence.phase_overrides.get(phase) {
        if let Some(last_iso) = &feature_state.last_value_at {
            if let Ok(last) = DateTime::parse_from_rfc3339(last_iso) {
                let elapsed = now.signed_duration_since(last.with_timezone(&Utc)).num_seconds();
                if elapsed < *min_seconds {
                    return false;
                }
            }
        }
    }
    true
}

fn iso(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, false)
}

fn resolve_timezone(name: &str) -> Tz {
    name.parse().unwrap_or(chrono_tz::UTC)
}

#[async_trait::async_trait]
impl SyncModule for PlaylistPresentationModule {
    async fn run(&mut self, ctx: &mut SyncContext<'_>) -> Result<RunOutcome> {
        self.summary = Map::new();
        let service = ctx.spotify;

        if !self.any_feature_enabled() {
            info!(target: "playlist_presentation", "no features enabled");
            self.note("reason", "no_features_enabled");
            return Ok(RunOutcome::new(RunStatus::Noop).with("reason", "no_features_enabled"));
        }

        let playlist_id = match self.options.playlist.resolve_existing(service).await {
            Ok(id) => id,
            Err(ModuleError::Spotify(SpotifyError::RateLimited { retry_after })) => {
                return Ok(RunOutcome::rate_limited("playlist_resolution", retry_after));
            }
            Err(other) => return Err(other),
        };

        let now = Utc::now();
        let tz = resolve_timezone(&ctx.global.runtime.timezone);
        let mut pres = PresentationState::from_value(ctx.state.get("playlist_presentation"));
        let loaded = serde_json::to_value(&pres)
            .map_err(|e| ModuleError::Failed(format!("presentation state: {e}")))?;

        let interval = self.effective_interval();
        if let Some(last_iso) = &pres.last_updated_at {
            if let Ok(last) = DateTime::parse_from_rfc3339(last_iso) {
                let elapsed = now.signed_duration_since(last.with_timezone(&Utc)).num_seconds();
                if elapsed >= 0 && (elapsed as u64) < interval {
                    let remaining = interval - elapsed as u64;
                    info!(
                        target: "playlist_presentation",
                        interval,
                        remaining,
                        "interval not elapsed, skipping"
                    );
                    let last_phase = pres.last_phase.clone().unwrap_or_default();
                    self.note("phase", last_phase.clone());
                    return Ok(RunOutcome::new(RunStatus::SkippedInterval)
                        .with("phase", last_phase)
                        .with("interval", interval)
                        .with("remaining", remaining));
                }
            }
        }

        let phase = self.determine_phase(&mut pres, now, tz).await;
        pres.last_phase = Some(phase.clone());
        pres.global_run_count += 1;
        let mut rng = self.build_rng(pres.global_run_count);

        let dynamic_candidates = if self.options.description.feature.enabled
            && self.options.description.use_dynamic
        {
            let templates = if self.options.description.dynamic_templates.is_empty() {
                sources::default_description_templates()
            } else {
                self.options.description.dynamic_templates.clone()
            };
            sources::render_dynamic_descriptions(&templates, now.with_timezone(&tz))
        } else {
            Vec::new()
        };

        let base_dir = ctx.paths.base_dir.clone();
        let cover = self.evaluate_feature(
            "cover",
            &self.options.cover,
            Vec::new(),
            &mut pres,
            &phase,
            now,
            &base_dir,
            &mut rng,
        );
        let title = self.evaluate_feature(
            "title",
            &self.options.title,
            Vec::new(),
            &mut pres,
            &phase,
            now,
            &base_dir,
            &mut rng,
        );
        let description = self.evaluate_feature(
            "description",
            &self.options.description.feature,
            dynamic_candidates,
            &mut pres,
            &phase,
            now,
            &base_dir,
            &mut rng,
        );

        let mut updates_applied = false;
        let mut fields: Vec<String> = Vec::new();

        if let (true, Some(asset)) = (cover.apply, cover.value.as_deref()) {
            let upload = async {
                let image = self.encode_image(asset, &base_dir)?;
                service.upload_playlist_cover(&playlist_id, image).await?;
                Ok::<(), ModuleError>(())
            };
            match upload.await {
                Ok(()) => {
                    updates_applied = true;
                    fields.push("cover".to_string());
                    info!(target: "playlist_presentation", path = asset, phase = %phase, "cover updated");
                }
                Err(error) => {
                    self.handle_failure(
                        "cover",
                        self.options.cover.failure_mode,
                        self.feature_last_value(&pres, "cover"),
                        &phase,
                        error,
                    )?;
                    self.note("cover_status", "failed");
                }
            }
        } else if let Some(reason) = cover.reason {
            self.note("cover_status", "skip");
            self.note("cover_reason", reason);
        }

        let mut name_update: Option<String> = None;
        let mut description_update: Option<String> = None;

        if let (true, Some(value)) = (title.apply, title.value.clone()) {
            if pres.details.title.as_ref() != Some(&value) {
                pres.details.title = Some(value.clone());
                name_update = Some(value);
            }
        } else if let Some(reason) = title.reason {
            self.note("title_status", "skip");
            self.note("title_reason", reason);
        }

        if let (true, Some(value)) = (description.apply, description.value.clone()) {
            if pres.details.description.as_ref() != Some(&value) {
                pres.details.description = Some(value.clone());
                description_update = Some(value);
            }
        } else if let Some(reason) = description.reason {
            self.note("description_status", "skip");
            self.note("description_reason", reason);
        }

        if name_update.is_some() || description_update.is_some() {
            match service
                .update_playlist_details(
                    &playlist_id,
                    name_update.as_deref(),
                    description_update.as_deref(),
                    None,
                )
                .await
            {
                Ok(()) => {
                    updates_applied = true;
                    if name_update.is_some() {
                        fields.push("name".to_string());
                    }
                    if description_update.is_some() {
                        fields.push("description".to_string());
                    }
                    info!(
                        target: "playlist_presentation",
                        fields = ?fields,
                        phase = %phase,
                        "details updated"
                    );
                }
                Err(error) => {
                    let (feature, mode): (&'static str, FailureMode) = if name_update.is_some() {
                        ("title", self.options.title.failure_mode)
                    } else {
                        ("description", self.options.description.feature.failure_mode)
                    };
                    self.handle_failure(
                        feature,
                        mode,
                        self.feature_last_value(&pres, feature),
                        &phase,
                        error.into(),
                    )?;
                    self.note("details_status", "failed");
                }
            }
        }

        let status = if updates_applied {
            pres.last_updated_at = Some(iso(now));
            RunStatus::Updated
        } else {
            RunStatus::Noop
        };

        let current = serde_json::to_value(&pres)
            .map_err(|e| ModuleError::Failed(format!("presentation state: {e}")))?;
        if current != loaded {
            ctx.state.set("playlist_presentation", current);
        }

        self.note("phase", phase.clone());
        let mut outcome = RunOutcome::new(status).with("phase", phase);
        if !fields.is_empty() {
            outcome = outcome.with("fields", json!(fields));
        }
        for (key, value) in &self.summary {
            outcome.details.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Ok(outcome)
    }

    fn last_run_summary(&self) -> Map<String, Value> {
        self.summary.clone()
    }
}

#[cfg(test)]
mod engine_tests;
