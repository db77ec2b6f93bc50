// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use chrono_tz::Tz;
use globset::GlobBuilder;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::warn;
use walkdir::WalkDir;

use super::options::{AssetSource, FeatureOptions, SourceType};
use super::state::SourceCacheEntry;

/// A single asset option with its weighting metadata and origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub value: String,
    pub weight: f64,
    pub source_id: String,
}

/// Ordered per-source buckets, used by the round-robin strategy.
pub type Buckets = Vec<(String, Vec<String>)>;

/// Build the candidate list for a feature and phase.
///
/// Sources declared for the phase come first, then the `default` bucket's
/// sources when the current phase is not `default`. Fallback sources are
/// held aside and only used when no regular source yielded anything.
pub fn collect_candidates(
    feature: &str,
    options: &FeatureOptions,
    phase: &str,
    base_dir: &Path,
    cache: &mut HashMap<String, SourceCacheEntry>,
    now_ts: i64,
    rng: &mut StdRng,
) -> (Vec<Candidate>, Buckets) {
    let mut phase_sources: Vec<&AssetSource> = options
        .sources
        .get(phase)
        .map(|sources| sources.iter().collect())
        .unwrap_or_default();
    if phase != super::phases::DEFAULT_PHASE {
        if let Some(default_sources) = options.sources.get(super::phases::DEFAULT_PHASE) {
            phase_sources.extend(default_sources.iter());
        }
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut buckets: Buckets = Vec::new();
    let mut fallbacks: Vec<Candidate> = Vec::new();

    for (index, source) in phase_sources.iter().enumerate() {
        let source_id = format!(
            "{feature}:{phase}:{index}:{}:{}",
            kind_label(source.kind),
            source.path.as_deref().unwrap_or("-")
        );

        let mut items = load_source_assets(&source_id, source, base_dir, cache, now_ts);
        if items.is_empty() {
            continue;
        }
        if source.shuffle_on_load && items.len() > 1 {
            items.shuffle(rng);
        }
        if let Some(max) = source.max_items {
            items.truncate(max);
        }

        if source.kind == SourceType::Fallback {
            fallbacks.extend(items.into_iter().map(|value| Candidate {
                value,
                weight: source.weight,
                source_id: source_id.clone(),
            }));
            continue;
        }

        buckets.push((source_id.clone(), items.clone()));
        candidates.extend(items.into_iter().map(|value| Candidate {
            value,
            weight: source.weight,
            source_id: source_id.clone(),
        }));
    }

    if candidates.is_empty() && !fallbacks.is_empty() {
        let mut fallback_buckets: Buckets = Vec::new();
        for candidate in &fallbacks {
            match fallback_buckets
                .iter_mut()
                .find(|(id, _)| id == &candidate.source_id)
            {
                Some((_, values)) => values.push(candidate.value.clone()),
                None => {
                    fallback_buckets
                        .push((candidate.source_id.clone(), vec![candidate.value.clone()]))
                }
            }
        }
        return (fallbacks, fallback_buckets);
    }

    (candidates, buckets)
}

fn kind_label(kind: SourceType) -> &'static str {
    match kind {
        SourceType::List => "list",
        SourceType::Folder => "folder",
        SourceType::Fallback => "fallback",
    }
}

fn load_source_assets(
    source_id: &str,
    source: &AssetSource,
    base_dir: &Path,
    cache: &mut HashMap<String, SourceCacheEntry>,
    now_ts: i64,
) -> Vec<String> {
    match source.kind {
        SourceType::List | SourceType::Fallback => source.items.clone(),
        SourceType::Folder => {
            if source.cache_ttl_seconds > 0 {
                if let Some(cached) = cache.get(source_id) {
                    if now_ts - cached.timestamp <= source.cache_ttl_seconds as i64 {
                        return cached.items.clone();
                    }
                }
            }

            let items = scan_folder(source, base_dir);
            cache.insert(
                source_id.to_string(),
                SourceCacheEntry {
                    timestamp: now_ts,
                    items: items.clone(),
                },
            );
            items
        }
    }
}

/// Scan a folder source, yielding paths relative to the base dir when the
/// folder lives under it.
fn scan_folder(source: &AssetSource, base_dir: &Path) -> Vec<String> {
    let Some(raw_path) = source.path.as_deref() else {
        return Vec::new();
    };
    let folder = {
        let candidate = PathBuf::from(raw_path);
        if candidate.is_absolute() {
            candidate
        } else {
            base_dir.join(candidate)
        }
    };
    if !folder.is_dir() {
        return Vec::new();
    }

    let pattern = source.pattern.as_deref().unwrap_or("*");
    let matcher = match GlobBuilder::new(pattern).literal_separator(true).build() {
        Ok(glob) => glob.compile_matcher(),
        Err(e) => {
            warn!(target: "playlist_presentation", pattern, error = %e, "invalid folder pattern");
            return Vec::new();
        }
    };

    let max_depth = if source.recursive { usize::MAX } else { 1 };
    let mut paths: Vec<String> = WalkDir::new(&folder)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| matcher.is_match(entry.file_name()))
        .map(|entry| {
            let path = entry.into_path();
            match path.strip_prefix(base_dir) {
                Ok(relative) => relative.to_string_lossy().into_owned(),
                Err(_) => path.to_string_lossy().into_owned(),
            }
        })
        .collect();
    paths.sort();
    paths
}

/// Render dynamic description templates with current datetime values.
pub fn render_dynamic_descriptions(templates: &[String], now_local: DateTime<Tz>) -> Vec<String> {
    let time = now_local.format("%H:%M").to_string();
    let date = now_local.format("%B %d, %Y").to_string();
    let weekday = now_local.format("%A").to_string();

    templates
        .iter()
        .map(|template| {
            template
                .replace("{time}", &time)
                .replace("{date}", &date)
                .replace("{weekday}", &weekday)
        })
        .collect()
}

pub fn default_description_templates() -> Vec<String> {
    vec![
        "Updated at {time} on {weekday}".to_string(),
        "Current vibe as of {date}".to_string(),
        "Live update - {time}".to_string(),
    ]
}
