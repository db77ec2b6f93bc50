// SPDX-License-Identifier: GPL-3.0-or-later

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::warn;

use syncopate_config::{parse_interval, SyncConfig};

use crate::cron::CronSchedule;
use crate::{Result, SupervisorError};

/// When a sync fires: every N seconds, or on a crontab schedule evaluated
/// in the supervisor's timezone.
#[derive(Debug, Clone)]
pub enum Trigger {
    Interval { seconds: u64 },
    Cron { schedule: CronSchedule, raw: String },
}

impl Trigger {
    /// Build the trigger for a sync, rejecting invalid schedules.
    pub fn for_sync(sync: &SyncConfig) -> Result<Self> {
        let invalid = |reason: String| SupervisorError::ScheduleInvalid {
            id: sync.id.clone(),
            reason,
        };

        match (&sync.schedule.interval, &sync.schedule.cron) {
            (Some(expression), None) => {
                let seconds =
                    parse_interval(expression).map_err(|e| invalid(e.to_string()))?;
                Ok(Self::Interval { seconds })
            }
            (None, Some(expression)) => {
                let schedule =
                    CronSchedule::parse(expression).map_err(|e| invalid(e.to_string()))?;
                Ok(Self::Cron {
                    schedule,
                    raw: expression.clone(),
                })
            }
            _ => Err(invalid(
                "schedule must define exactly one of 'interval' or 'cron'".to_string(),
            )),
        }
    }

    /// The first fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        match self {
            Self::Interval { seconds } => Some(now + Duration::seconds(*seconds as i64)),
            Self::Cron { schedule, .. } => schedule.next_after(now, tz),
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interval { seconds } => write!(f, "every {seconds}s"),
            Self::Cron { raw, .. } => write!(f, "cron[{raw}]"),
        }
    }
}

/// Resolve the configured IANA zone name, falling back to UTC. Returns the
/// zone and the label actually in effect so observers can report it.
pub fn resolve_timezone(name: &str) -> (Tz, String) {
    match name.parse::<Tz>() {
        Ok(tz) => (tz, tz.name().to_string()),
        Err(_) => {
            warn!(target: "supervisor", configured = name, using = "UTC", "timezone fallback");
            (chrono_tz::UTC, "UTC".to_string())
        }
    }
}
