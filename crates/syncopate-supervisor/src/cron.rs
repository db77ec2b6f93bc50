// SPDX-License-Identifier: GPL-3.0-or-later

//! Five-field POSIX crontab expressions, evaluated in the supervisor's
//! timezone.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use chrono_tz::Tz;

use crate::{Result, SupervisorError};

/// Upper bound for the next-fire scan: a little over a year of minutes,
/// enough for any satisfiable expression (e.g. Feb 29 is the pathological
/// case and is deliberately not chased further).
const MAX_SEARCH_MINUTES: i64 = 366 * 24 * 60 + 60;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl FieldKind {
    fn bounds(self) -> (u32, u32) {
        match self {
            Self::Minute => (0, 59),
            Self::Hour => (0, 23),
            Self::DayOfMonth => (1, 31),
            Self::Month => (1, 12),
            Self::DayOfWeek => (0, 7),
        }
    }

    fn alias(self, name: &str) -> Option<u32> {
        let name = name.to_ascii_lowercase();
        match self {
            Self::Month => MONTH_NAMES
                .iter()
                .position(|&m| m == name)
                .map(|index| index as u32 + 1),
            Self::DayOfWeek => WEEKDAY_NAMES
                .iter()
                .position(|&d| d == name)
                .map(|index| index as u32),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct CronField {
    any: bool,
    values: BTreeSet<u32>,
}

impl CronField {
    fn matches(&self, value: u32) -> bool {
        self.any || self.values.contains(&value)
    }
}

/// A parsed `minute hour day-of-month month day-of-week` expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl CronSchedule {
    pub fn parse(raw: &str) -> Result<Self> {
        let fields: Vec<&str> = raw.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(SupervisorError::CronInvalid(format!(
                "expected 5 fields (minute hour day-of-month month day-of-week), got {}",
                fields.len()
            )));
        }

        Ok(Self {
            minute: parse_field(fields[0], FieldKind::Minute)?,
            hour: parse_field(fields[1], FieldKind::Hour)?,
            day_of_month: parse_field(fields[2], FieldKind::DayOfMonth)?,
            month: parse_field(fields[3], FieldKind::Month)?,
            day_of_week: parse_field(fields[4], FieldKind::DayOfWeek)?,
        })
    }

    /// Whether the expression matches the given instant, interpreted in
    /// `tz`. Day-of-month and day-of-week combine per vixie cron: when both
    /// are restricted, either may match.
    pub fn matches(&self, instant: DateTime<Utc>, tz: Tz) -> bool {
        let local = instant.with_timezone(&tz);

        if !self.minute.matches(local.minute())
            || !self.hour.matches(local.hour())
            || !self.month.matches(local.month())
        {
            return false;
        }

        let dom = self.day_of_month.matches(local.day());
        let dow = self
            .day_of_week
            .matches(local.weekday().num_days_from_sunday());

        if self.day_of_month.any || self.day_of_week.any {
            dom && dow
        } else {
            dom || dow
        }
    }

    /// The first matching instant strictly after `now`, on a whole minute.
    pub fn next_after(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let mut candidate = truncate_to_minute(now) + Duration::minutes(1);
        for _ in 0..MAX_SEARCH_MINUTES {
            if self.matches(candidate, tz) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

fn truncate_to_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant - Duration::seconds(i64::from(instant.second()))
        - Duration::nanoseconds(i64::from(instant.nanosecond()))
}

fn parse_field(raw: &str, kind: FieldKind) -> Result<CronField> {
    if raw == "*" {
        return Ok(CronField {
            any: true,
            values: BTreeSet::new(),
        });
    }

    let mut values = BTreeSet::new();
    for segment in raw.split(',') {
        parse_segment(segment, kind, &mut values)?;
    }
    if values.is_empty() {
        return Err(SupervisorError::CronInvalid(format!("empty field `{raw}`")));
    }
    Ok(CronField { any: false, values })
}

fn parse_segment(segment: &str, kind: FieldKind, values: &mut BTreeSet<u32>) -> Result<()> {
    let invalid = || SupervisorError::CronInvalid(format!("invalid segment `{segment}`"));
    let (min, max) = kind.bounds();

    let (range_part, step) = match segment.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step.parse().map_err(|_| invalid())?;
            if step == 0 {
                return Err(invalid());
            }
            (range, step)
        }
        None => (segment, 1),
    };

    let (start, end) = if range_part == "*" {
        (min, max)
    } else if let Some((low, high)) = range_part.split_once('-') {
        (parse_value(low, kind)?, parse_value(high, kind)?)
    } else {
        let value = parse_value(range_part, kind)?;
        // a bare value with a step means "from value to max"
        if step > 1 {
            (value, max)
        } else {
            (value, value)
        }
    };

    if start < min || end > max || start > end {
        return Err(invalid());
    }

    let mut value = start;
    while value <= end {
        // cron allows 7 for Sunday
        let normalised = if kind == FieldKind::DayOfWeek && value == 7 {
            0
        } else {
            value
        };
        values.insert(normalised);
        value += step;
    }
    Ok(())
}

fn parse_value(raw: &str, kind: FieldKind) -> Result<u32> {
    if let Some(alias) = kind.alias(raw) {
        return Ok(alias);
    }
    raw.parse()
        .map_err(|_| SupervisorError::CronInvalid(format!("invalid value `{raw}`")))
}
