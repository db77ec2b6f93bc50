// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::warn;

use super::options::{CustomPhase, SunriseOptions};

pub const DEFAULT_PHASE: &str = "default";

const SUNRISE_ENDPOINT: &str = "https://api.sunrise-sunset.org/json";
const DAY_SECONDS: i64 = 86_400;

/// Pick the phase whose window `[start_i, start_{i+1})` contains `now`,
/// treating the last window as wrapping around 24 hours.
pub fn phase_from_schedule(schedule: &[(String, DateTime<Utc>)], now: DateTime<Utc>) -> String {
    if schedule.is_empty() {
        return DEFAULT_PHASE.to_string();
    }

    let mut sorted: Vec<&(String, DateTime<Utc>)> = schedule.iter().collect();
    sorted.sort_by_key(|(_, start)| *start);

    for (index, (name, start)) in sorted.iter().enumerate() {
        let (_, next_start) = sorted[(index + 1) % sorted.len()];
        let mut window = next_start.signed_duration_since(*start).num_seconds();
        if window <= 0 {
            window += DAY_SECONDS;
        }

        let mut delta = now.signed_duration_since(*start).num_seconds();
        if delta < 0 {
            delta += DAY_SECONDS;
        }

        if (0..window).contains(&delta) {
            return name.clone();
        }
    }
    sorted[sorted.len() - 1].0.clone()
}

/// Translate custom phase definitions into concrete start times for the
/// current local date. Entries with unparseable `HH:MM` values are skipped.
pub fn build_custom_schedule(
    phases: &[CustomPhase],
    now_local: DateTime<Tz>,
) -> Vec<(String, DateTime<Utc>)> {
    let date = now_local.date_naive();
    let tz = now_local.timezone();
    let mut schedule = Vec::with_capacity(phases.len());

    for phase in phases {
        let Some((hour, minute)) = parse_hhmm(&phase.start) else {
            warn!(target: "playlist_presentation", phase = %phase.name, start = %phase.start, "unparseable phase start");
            continue;
        };
        let Some(start) = tz
            .with_ymd_and_hms(date.year(), date.month(), date.day(), hour, minute, 0)
            .earliest()
        else {
            continue;
        };
        schedule.push((phase.name.clone(), start.with_timezone(&Utc)));
    }
    schedule
}

fn parse_hhmm(value: &str) -> Option<(u32, u32)> {
    let (hours, minutes) = value.split_once(':')?;
    let hour: u32 = hours.trim().parse().ok()?;
    let minute: u32 = minutes.trim().parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

/// Fetch sunrise/sunset for the configured coordinates and derive the
/// morning/day/evening/night start times. Returns `None` on any fetch or
/// parse failure; the caller then falls back to the default phase.
pub async fn fetch_sunrise_schedule(
    options: &SunriseOptions,
    tz: Tz,
) -> Option<BTreeMap<String, DateTime<Utc>>> {
    let endpoint = options.endpoint.as_deref().unwrap_or(SUNRISE_ENDPOINT);
    let response = reqwest::Client::new()
        .get(endpoint)
        .timeout(std::time::Duration::from_secs(10))
        .query(&[
            ("lat", options.latitude.to_string()),
            ("lng", options.longitude.to_string()),
            ("formatted", "0".to_string()),
        ])
        .send()
        .await;

    let payload: Value = match response {
        Ok(response) => match response.error_for_status() {
            Ok(response) => response.json().await.ok()?,
            Err(e) => {
                warn!(target: "playlist_presentation", error = %e, "sunrise API failed");
                return None;
            }
        },
        Err(e) => {
            warn!(target: "playlist_presentation", error = %e, "sunrise API unreachable");
            return None;
        }
    };

    if payload.get("status").and_then(Value::as_str) != Some("OK") {
        return None;
    }

    let sunrise = parse_result_time(&payload, "sunrise")?.with_timezone(&tz);
    let sunset = parse_result_time(&payload, "sunset")?.with_timezone(&tz);

    let mut schedule = BTreeMap::new();
    schedule.insert("morning".to_string(), sunrise.with_timezone(&Utc));
    schedule.insert(
        "day".to_string(),
        (sunrise + hours(options.morning_duration_hours)).with_timezone(&Utc),
    );
    schedule.insert(
        "evening".to_string(),
        (sunset - hours(options.evening_duration_hours)).with_timezone(&Utc),
    );
    schedule.insert(
        "night".to_string(),
        (sunset + hours(options.night_offset_hours)).with_timezone(&Utc),
    );
    Some(schedule)
}

fn parse_result_time(payload: &Value, key: &str) -> Option<DateTime<Utc>> {
    let raw = payload.pointer(&format!("/results/{key}"))?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn hours(value: f64) -> Duration {
    Duration::seconds((value * 3_600.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(entries: &[(&str, &str)]) -> Vec<CustomPhase> {
        entries
            .iter()
            .map(|(name, start)| CustomPhase {
                name: name.to_string(),
                start: start.to_string(),
            })
            .collect()
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, hour, minute, 0).unwrap()
    }

    fn schedule_for(now: DateTime<Utc>) -> Vec<(String, DateTime<Utc>)> {
        let phases = custom(&[
            ("morning", "06:00"),
            ("day", "09:00"),
            ("evening", "18:00"),
            ("night", "22:00"),
        ]);
        build_custom_schedule(&phases, now.with_timezone(&chrono_tz::UTC))
    }

    #[test]
    fn every_instant_maps_to_exactly_one_phase() {
        let schedule = schedule_for(at(12, 0));
        for hour in 0..24 {
            for minute in [0, 15, 30, 45] {
                let phase = phase_from_schedule(&schedule, at(hour, minute));
                assert!(
                    ["morning", "day", "evening", "night"].contains(&phase.as_str()),
                    "no phase for {hour:02}:{minute:02}"
                );
            }
        }
    }

    #[test]
    fn phase_windows_match_the_expected_labels() {
        let schedule = schedule_for(at(12, 0));
        assert_eq!(phase_from_schedule(&schedule, at(7, 15)), "morning");
        assert_eq!(phase_from_schedule(&schedule, at(23, 30)), "night");
        // before the first start the last window wraps around midnight
        assert_eq!(phase_from_schedule(&schedule, at(5, 30)), "night");
        assert_eq!(phase_from_schedule(&schedule, at(9, 0)), "day");
        assert_eq!(phase_from_schedule(&schedule, at(21, 59)), "evening");
    }

    #[test]
    fn empty_schedule_is_default() {
        assert_eq!(phase_from_schedule(&[], at(12, 0)), DEFAULT_PHASE);
    }

    #[test]
    fn unparseable_starts_are_skipped() {
        let phases = custom(&[("ok", "06:00"), ("bad", "six"), ("worse", "25:99")]);
        let schedule = build_custom_schedule(&phases, at(12, 0).with_timezone(&chrono_tz::UTC));
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule[0].0, "ok");
    }
}
