// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::Rng;

use super::options::{FeatureSelection, RestartPolicy, SelectionMode};
use super::sources::{Buckets, Candidate};
use super::state::FeatureState;

const RANDOM_DEDUPE_ATTEMPTS: usize = 5;

/// Pick the winning asset, honouring the selection strategy, the dedupe
/// window, and group caching.
///
/// A value cached for `(group_key, phase, run)` wins outright, dedupe
/// included: group consistency outranks the dedupe window.
#[allow(clippy::too_many_arguments)]
pub fn select_value(
    candidates: &[Candidate],
    buckets: &Buckets,
    selection: &FeatureSelection,
    feature_state: &mut FeatureState,
    group_cache: Option<&mut HashMap<String, String>>,
    phase: &str,
    global_run_count: u64,
    rng: &mut StdRng,
) -> Option<String> {
    if candidates.is_empty() {
        return None;
    }

    let group_key = format!("{phase}:{global_run_count}");
    if let Some(cache) = &group_cache {
        if let Some(cached) = cache.get(&group_key) {
            return Some(cached.clone());
        }
    }

    let mut value = match selection.mode {
        SelectionMode::Sequential => {
            select_sequential(candidates, feature_state, selection, rng, false)
        }
        SelectionMode::Random => select_random(candidates, feature_state, selection, rng),
        SelectionMode::WeightedRandom => {
            select_weighted_random(candidates, feature_state, selection, rng)
        }
        SelectionMode::RoundRobin => select_round_robin(buckets, candidates, feature_state),
    }?;

    let window = selection.dedupe_window;
    if window > 0 && recent(&feature_state.history, window).contains(&value.as_str()) {
        match selection.mode {
            SelectionMode::Random | SelectionMode::WeightedRandom => {
                if let Some(alternative) =
                    select_random_alternative(candidates, &feature_state.history, window, rng)
                {
                    value = alternative;
                }
            }
            SelectionMode::Sequential => {
                value = select_sequential(candidates, feature_state, selection, rng, true)?;
            }
            SelectionMode::RoundRobin => {}
        }
    }

    if let Some(cache) = group_cache {
        // only the current fire's entries are worth keeping
        cache.retain(|key, _| key.ends_with(&format!(":{global_run_count}")));
        cache.insert(group_key, value.clone());
    }

    Some(value)
}

fn recent(history: &[String], window: usize) -> Vec<&str> {
    history[history.len().saturating_sub(window)..]
        .iter()
        .map(String::as_str)
        .collect()
}

/// Walk candidates in order, supporting bounce and restart behaviour.
fn select_sequential(
    candidates: &[Candidate],
    state: &mut FeatureState,
    selection: &FeatureSelection,
    rng: &mut StdRng,
    force_next: bool,
) -> Option<String> {
    let n = candidates.len() as i64;
    let mut cursor = state.cursor;
    let mut direction = if state.direction < 0 { -1 } else { 1 };

    match selection.restart_policy {
        RestartPolicy::RandomRestart => {
            if cursor >= n {
                cursor = rng.random_range(0..n);
            } else {
                cursor = cursor.rem_euclid(n);
            }
        }
        RestartPolicy::Bounce => {
            if cursor >= n || cursor < 0 {
                direction = -direction;
                cursor = (cursor + direction).clamp(0, n - 1);
            }
        }
        RestartPolicy::Loop => {
            cursor = cursor.rem_euclid(n);
        }
    }

    if force_next {
        cursor = (cursor + 1).rem_euclid(n);
    }

    state.cursor = cursor + direction;
    state.direction = direction;
    candidates.get(cursor as usize).map(|c| c.value.clone())
}

/// Uniform choice with a bounded number of re-rolls to dodge recent picks.
fn select_random(
    candidates: &[Candidate],
    state: &FeatureState,
    selection: &FeatureSelection,
    rng: &mut StdRng,
) -> Option<String> {
    let mut choice = candidates[rng.random_range(0..candidates.len())].value.clone();
    if selection.dedupe_window > 0 {
        let window = recent(&state.history, selection.dedupe_window);
        let mut attempts = 0;
        while window.contains(&choice.as_str()) && attempts < RANDOM_DEDUPE_ATTEMPTS {
            choice = candidates[rng.random_range(0..candidates.len())].value.clone();
            attempts += 1;
        }
    }
    Some(choice)
}

fn select_random_alternative(
    candidates: &[Candidate],
    history: &[String],
    window: usize,
    rng: &mut StdRng,
) -> Option<String> {
    let blocked = recent(history, window);
    let pool: Vec<&Candidate> = candidates
        .iter()
        .filter(|candidate| !blocked.contains(&candidate.value.as_str()))
        .collect();
    if pool.is_empty() {
        return None;
    }
    Some(pool[rng.random_range(0..pool.len())].value.clone())
}

/// Choose proportionally to weight; degrades to uniform when the total
/// weight is not positive.
fn select_weighted_random(
    candidates: &[Candidate],
    state: &FeatureState,
    selection: &FeatureSelection,
    rng: &mut StdRng,
) -> Option<String> {
    let total: f64 = candidates.iter().map(|c| c.weight).sum();
    if total <= 0.0 {
        return select_random(candidates, state, selection, rng);
    }

    let pick = rng.random::<f64>() * total;
    let mut upto = 0.0;
    for candidate in candidates {
        upto += candidate.weight;
        if pick <= upto {
            return Some(candidate.value.clone());
        }
    }
    candidates.last().map(|c| c.value.clone())
}

/// Cycle across source buckets in declaration order, with a per-bucket
/// cursor. The round-robin state resets whenever the bucket set changes.
fn select_round_robin(
    buckets: &Buckets,
    candidates: &[Candidate],
    state: &mut FeatureState,
) -> Option<String> {
    if buckets.is_empty() {
        let index = state.cursor.rem_euclid(candidates.len() as i64) as usize;
        return candidates.get(index).map(|c| c.value.clone());
    }

    let new_cycle: Vec<String> = buckets.iter().map(|(id, _)| id.clone()).collect();
    if state.round_robin_cycle != new_cycle {
        state.round_robin_cycle = new_cycle;
        state.round_robin_pointer = 0;
        state.round_robin_indices.clear();
    }

    let cycle = state.round_robin_cycle.clone();
    let mut pointer = state.round_robin_pointer;
    for _ in 0..cycle.len() {
        let source_id = &cycle[pointer % cycle.len()];
        let entries = buckets
            .iter()
            .find(|(id, _)| id == source_id)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[]);
        if !entries.is_empty() {
            let index = state.round_robin_indices.get(source_id).copied().unwrap_or(0);
            let value = entries[index % entries.len()].clone();
            state.round_robin_indices.insert(source_id.clone(), index + 1);
            state.round_robin_pointer = pointer + 1;
            return Some(value);
        }
        pointer += 1;
    }
    candidates.first().map(|c| c.value.clone())
}

/// Keep history bounded: at most twice the dedupe window (minimum one).
pub fn trim_history(history: &mut Vec<String>, window: usize) {
    let cap = 2 * window.max(1);
    if history.len() > cap {
        let excess = history.len() - cap;
        history.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn candidates(values: &[&str]) -> Vec<Candidate> {
        values
            .iter()
            .map(|value| Candidate {
                value: value.to_string(),
                weight: 1.0,
                source_id: "s".to_string(),
            })
            .collect()
    }

    fn selection(mode: SelectionMode, window: usize, policy: RestartPolicy) -> FeatureSelection {
        FeatureSelection {
            mode,
            dedupe_window: window,
            restart_policy: policy,
            group_key: None,
        }
    }

    fn pick(
        pool: &[Candidate],
        sel: &FeatureSelection,
        state: &mut FeatureState,
        rng: &mut StdRng,
    ) -> String {
        let value = select_value(pool, &Vec::new(), sel, state, None, "default", 1, rng).unwrap();
        state.history.push(value.clone());
        trim_history(&mut state.history, sel.dedupe_window);
        value
    }

    #[test]
    fn sequential_loops_in_order() {
        let pool = candidates(&["a", "b", "c"]);
        let sel = selection(SelectionMode::Sequential, 0, RestartPolicy::Loop);
        let mut state = FeatureState::default();
        let mut rng = rng();

        let picks: Vec<String> = (0..5).map(|_| pick(&pool, &sel, &mut state, &mut rng)).collect();
        assert_eq!(picks, vec!["a", "b", "c", "a", "b"]);
    }

    #[test]
    fn sequential_bounce_inverts_at_the_ends() {
        let pool = candidates(&["a", "b", "c"]);
        let sel = selection(SelectionMode::Sequential, 0, RestartPolicy::Bounce);
        let mut state = FeatureState::default();
        let mut rng = rng();

        // the endpoint repeats once as the direction flips
        let picks: Vec<String> = (0..8).map(|_| pick(&pool, &sel, &mut state, &mut rng)).collect();
        assert_eq!(picks, vec!["a", "b", "c", "c", "b", "a", "a", "b"]);
    }

    #[test]
    fn sequential_random_restart_reseeds_after_the_end() {
        let pool = candidates(&["a", "b", "c", "d"]);
        let sel = selection(SelectionMode::Sequential, 0, RestartPolicy::RandomRestart);
        let mut state = FeatureState::default();
        let mut rng = rng();

        for expected in ["a", "b", "c", "d"] {
            assert_eq!(pick(&pool, &sel, &mut state, &mut rng), expected);
        }
        // cursor is now past the end; the next pick restarts somewhere valid
        let restarted = pick(&pool, &sel, &mut state, &mut rng);
        assert!(pool.iter().any(|c| c.value == restarted));
    }

    #[test]
    fn random_avoids_the_dedupe_window_when_possible() {
        let pool = candidates(&["a", "b", "c"]);
        let sel = selection(SelectionMode::Random, 1, RestartPolicy::Loop);
        let mut state = FeatureState::default();
        let mut rng = rng();

        let mut previous = pick(&pool, &sel, &mut state, &mut rng);
        for _ in 0..50 {
            let current = pick(&pool, &sel, &mut state, &mut rng);
            assert_ne!(current, previous, "consecutive repeat within window");
            previous = current;
        }
    }

    #[test]
    fn weighted_random_degrades_to_uniform_on_zero_weight() {
        let mut pool = candidates(&["a", "b"]);
        for candidate in &mut pool {
            candidate.weight = 0.0;
        }
        let sel = selection(SelectionMode::WeightedRandom, 0, RestartPolicy::Loop);
        let mut state = FeatureState::default();
        let mut rng = rng();
        let value = pick(&pool, &sel, &mut state, &mut rng);
        assert!(["a", "b"].contains(&value.as_str()));
    }

    #[test]
    fn weighted_random_prefers_heavy_candidates() {
        let mut pool = candidates(&["light", "heavy"]);
        pool[1].weight = 99.0;
        let sel = selection(SelectionMode::WeightedRandom, 0, RestartPolicy::Loop);
        let mut state = FeatureState::default();
        let mut rng = rng();

        let heavy_picks = (0..100)
            .filter(|_| pick(&pool, &sel, &mut state, &mut rng) == "heavy")
            .count();
        assert!(heavy_picks > 80, "heavy picked only {heavy_picks}/100");
    }

    #[test]
    fn round_robin_cycles_buckets_in_declaration_order() {
        let buckets: Buckets = vec![
            ("s1".to_string(), vec!["a1".to_string(), "a2".to_string()]),
            ("s2".to_string(), vec!["b1".to_string()]),
        ];
        let pool = candidates(&["a1", "a2", "b1"]);
        let sel = selection(SelectionMode::RoundRobin, 0, RestartPolicy::Loop);
        let mut state = FeatureState::default();
        let mut rng = rng();

        let picks: Vec<String> = (0..4)
            .map(|_| {
                select_value(&pool, &buckets, &sel, &mut state, None, "default", 1, &mut rng)
                    .unwrap()
            })
            .collect();
        assert_eq!(picks, vec!["a1", "b1", "a2", "b1"]);
    }

    #[test]
    fn round_robin_resets_when_the_bucket_set_changes() {
        let buckets: Buckets = vec![("s1".to_string(), vec!["a1".to_string()])];
        let pool = candidates(&["a1"]);
        let sel = selection(SelectionMode::RoundRobin, 0, RestartPolicy::Loop);
        let mut state = FeatureState::default();
        let mut rng = rng();

        select_value(&pool, &buckets, &sel, &mut state, None, "default", 1, &mut rng).unwrap();
        assert_eq!(state.round_robin_pointer, 1);

        let changed: Buckets = vec![
            ("s1".to_string(), vec!["a1".to_string()]),
            ("s2".to_string(), vec!["b1".to_string()]),
        ];
        select_value(&pool, &changed, &sel, &mut state, None, "default", 1, &mut rng).unwrap();
        assert_eq!(state.round_robin_cycle.len(), 2);
        assert_eq!(state.round_robin_pointer, 1);
    }

    #[test]
    fn group_cache_wins_even_against_the_dedupe_window() {
        let pool = candidates(&["a", "b", "c"]);
        let sel = selection(SelectionMode::Sequential, 2, RestartPolicy::Loop);
        let mut state = FeatureState {
            history: vec!["cached".to_string()],
            ..Default::default()
        };
        let mut cache = HashMap::from([("night:7".to_string(), "cached".to_string())]);
        let mut rng = rng();

        let value = select_value(
            &pool,
            &Vec::new(),
            &sel,
            &mut state,
            Some(&mut cache),
            "night",
            7,
            &mut rng,
        )
        .unwrap();
        assert_eq!(value, "cached");
        // the cursor did not move: selection was skipped entirely
        assert_eq!(state.cursor, 0);
    }

    #[test]
    fn group_cache_stores_and_prunes_by_run() {
        let pool = candidates(&["a", "b"]);
        let sel = selection(SelectionMode::Sequential, 0, RestartPolicy::Loop);
        let mut state = FeatureState::default();
        let mut cache = HashMap::from([("day:6".to_string(), "stale".to_string())]);
        let mut rng = rng();

        let value = select_value(
            &pool,
            &Vec::new(),
            &sel,
            &mut state,
            Some(&mut cache),
            "day",
            7,
            &mut rng,
        )
        .unwrap();
        assert_eq!(value, "a");
        assert_eq!(cache.get("day:7"), Some(&"a".to_string()));
        assert!(!cache.contains_key("day:6"));
    }

    #[test]
    fn history_trims_to_twice_the_window() {
        let mut history: Vec<String> = (0..10).map(|i| format!("v{i}")).collect();
        trim_history(&mut history, 3);
        assert_eq!(history.len(), 6);
        assert_eq!(history.first().unwrap(), "v4");

        let mut short: Vec<String> = (0..10).map(|i| format!("v{i}")).collect();
        trim_history(&mut short, 0);
        assert_eq!(short.len(), 2);
    }
}
