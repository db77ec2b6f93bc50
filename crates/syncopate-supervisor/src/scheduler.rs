// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tracing::{info, warn};

use syncopate_config::SyncConfig;
use syncopate_ipc::JobStatus;

use crate::trigger::Trigger;
use crate::Result;

const TICK: Duration = Duration::from_millis(250);

/// Executes one fire of a sync. The scheduler awaits the handler, which is
/// what serializes execution: one worker, one fire at a time.
#[async_trait]
pub trait FireHandler: Send + Sync + 'static {
    async fn fire(&self, sync: SyncConfig);
}

#[derive(Debug)]
struct JobEntry {
    config: SyncConfig,
    trigger: Trigger,
    next_run: Option<DateTime<Utc>>,
    paused: bool,
    running: bool,
}

/// Per-job trigger bookkeeping and the single worker that drains due fires.
///
/// Per-job concurrency is 1 with coalescing: claiming a fire advances
/// `next_run` from the current instant, so however many periods elapse
/// while the job is busy, at most one follow-up fire results.
pub struct Scheduler {
    tz: Tz,
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl Scheduler {
    pub fn new(tz: Tz) -> Arc<Self> {
        Arc::new(Self {
            tz,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JobEntry>> {
        self.jobs.lock().unwrap_or_else(|poisoned| {
            warn!(target: "scheduler", "jobs mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Register (or replace) the trigger for a sync. With `immediate` the
    /// next fire is scheduled for right now.
    pub fn register(&self, config: SyncConfig, immediate: bool) -> Result<()> {
        let trigger = Trigger::for_sync(&config)?;
        let now = Utc::now();
        let next_run = if immediate {
            Some(now)
        } else {
            trigger.next_after(now, self.tz)
        };

        info!(
            target: "scheduler",
            sync_id = %config.id,
            sync_type = %config.kind,
            schedule = %trigger,
            immediate,
            "sync scheduled"
        );

        let mut jobs = self.lock();
        let id = config.id.clone();
        // replacing keeps the running flag so an in-flight fire still
        // blocks a concurrent one
        let running = jobs.get(&id).is_some_and(|entry| entry.running);
        jobs.insert(
            id,
            JobEntry {
                config,
                trigger,
                next_run,
                paused: false,
                running,
            },
        );
        Ok(())
    }

    pub fn remove(&self, sync_id: &str) -> bool {
        self.lock().remove(sync_id).is_some()
    }

    pub fn contains(&self, sync_id: &str) -> bool {
        self.lock().contains_key(sync_id)
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn pause(&self, sync_id: &str) -> bool {
        let mut jobs = self.lock();
        match jobs.get_mut(sync_id) {
            Some(entry) => {
                entry.paused = true;
                true
            }
            None => false,
        }
    }

    pub fn resume(&self, sync_id: &str) -> bool {
        let now = Utc::now();
        let mut jobs = self.lock();
        match jobs.get_mut(sync_id) {
            Some(entry) => {
                entry.paused = false;
                entry.next_run = entry.trigger.next_after(now, self.tz);
                true
            }
            None => false,
        }
    }

    /// Force the next fire to happen immediately.
    pub fn trigger_now(&self, sync_id: &str) -> bool {
        let mut jobs = self.lock();
        match jobs.get_mut(sync_id) {
            Some(entry) => {
                entry.paused = false;
                entry.next_run = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Control-plane view of every job.
    pub fn snapshot(&self) -> Vec<JobStatus> {
        let now = Utc::now();
        let mut statuses: Vec<JobStatus> = self
            .lock()
            .values()
            .map(|entry| {
                let next_run = if entry.paused { None } else { entry.next_run };
                JobStatus {
                    id: entry.config.id.clone(),
                    next_run: next_run.map(|at| {
                        at.with_timezone(&self.tz)
                            .to_rfc3339_opts(SecondsFormat::Secs, false)
                    }),
                    missed: next_run.is_some_and(|at| at < now),
                    paused: entry.paused,
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// Claim one due job: mark it running and advance its next fire time.
    fn claim_due(&self, now: DateTime<Utc>) -> Option<SyncConfig> {
        let mut jobs = self.lock();
        let entry = jobs.values_mut().find(|entry| {
            !entry.paused && !entry.running && entry.next_run.is_some_and(|at| at <= now)
        })?;
        entry.running = true;
        entry.next_run = entry.trigger.next_after(now, self.tz);
        Some(entry.config.clone())
    }

    fn release(&self, sync_id: &str) {
        if let Some(entry) = self.lock().get_mut(sync_id) {
            entry.running = false;
        }
    }

    /// Drain due fires until the stop flag flips. Runs fires strictly one
    /// at a time.
    pub async fn run_worker<H: FireHandler>(
        self: Arc<Self>,
        handler: Arc<H>,
        mut stop: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.changed() => {}
            }
            if *stop.borrow() {
                break;
            }

            while let Some(config) = self.claim_due(Utc::now()) {
                handler.fire(config.clone()).await;
                self.release(&config.id);
                if *stop.borrow() {
                    return;
                }
            }
        }
    }
}
