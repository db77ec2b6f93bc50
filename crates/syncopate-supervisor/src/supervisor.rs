// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use syncopate_config::{
    load_global_config, load_sync_configs, ConfigPaths, GlobalConfig, SyncConfig,
};
use syncopate_ipc::{Command, Request, Response};
use syncopate_modules::ModuleRegistry;

use crate::executor::execute_fire;
use crate::scheduler::{FireHandler, Scheduler};
use crate::shared_cache::SharedCacheManager;
use crate::trigger::resolve_timezone;
use crate::{Result, SupervisorError};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

struct Inner {
    config: GlobalConfig,
    sync_index: HashMap<String, SyncConfig>,
    cache: SharedCacheManager,
}

/// Counts of scheduling changes produced by one reload pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl ReloadSummary {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

/// The supervisor process: owns the job index, the scheduler, the shared
/// playlist cache, and the control socket.
pub struct Supervisor {
    paths: ConfigPaths,
    registry: ModuleRegistry,
    tz_label: String,
    scheduler: Arc<Scheduler>,
    inner: Mutex<Inner>,
    stop_tx: watch::Sender<bool>,
}

impl Supervisor {
    pub fn new(
        config: GlobalConfig,
        paths: ConfigPaths,
        syncs: Vec<SyncConfig>,
        registry: ModuleRegistry,
    ) -> Arc<Self> {
        let (tz, tz_label) = resolve_timezone(&config.runtime.timezone);
        if tz_label != config.runtime.timezone {
            warn!(
                target: "supervisor",
                configured = %config.runtime.timezone,
                using = %tz_label,
                "timezone fallback"
            );
        }

        let sync_index: HashMap<String, SyncConfig> = syncs
            .iter()
            .map(|sync| (sync.id.clone(), sync.clone()))
            .collect();
        let cache = SharedCacheManager::new(&syncs);
        let (stop_tx, _) = watch::channel(false);

        Arc::new(Self {
            paths,
            registry,
            tz_label,
            scheduler: Scheduler::new(tz),
            inner: Mutex::new(Inner {
                config,
                sync_index,
                cache,
            }),
            stop_tx,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!(target: "supervisor", "state mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    /// Ask the supervisor to stop; `run` observes this and shuts down.
    pub fn request_stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    fn register_all(&self) {
        let syncs: Vec<SyncConfig> = self.lock().sync_index.values().cloned().collect();
        for sync in syncs {
            if let Err(e) = self.scheduler.register(sync, false) {
                error!(target: "supervisor", error = %e, "schedule invalid");
            }
        }
    }

    /// Run until SIGINT/SIGTERM (or [`Supervisor::request_stop`]).
    pub async fn run(self: Arc<Self>, hot_reload: bool) -> Result<()> {
        let (sync_count, hot_reload_enabled, socket_path) = {
            let inner = self.lock();
            (
                inner.sync_index.len(),
                hot_reload && inner.config.supervisor.hot_reload,
                inner.config.supervisor.ipc_socket.clone(),
            )
        };

        info!(
            target: "supervisor",
            sync_count,
            hot_reload = hot_reload_enabled,
            timezone = %self.tz_label,
            "supervisor starting"
        );
        if sync_count == 0 {
            warn!(target: "supervisor", "no syncs defined; supervisor will idle until exit");
        }

        self.register_all();

        let listener = bind_socket(&socket_path)?;
        let stop_rx = self.stop_tx.subscribe();

        let handler = Arc::new(SupervisorFireHandler {
            supervisor: Arc::clone(&self),
        });
        let worker = tokio::spawn(
            Arc::clone(&self.scheduler).run_worker(handler, self.stop_tx.subscribe()),
        );
        let ipc = tokio::spawn(crate::ipc_server::serve(
            Arc::clone(&self),
            listener,
            self.stop_tx.subscribe(),
        ));
        let watcher = if hot_reload_enabled {
            info!(
                target: "supervisor",
                syncs_dir = %self.paths.syncs_dir.display(),
                config = %self.paths.global_config.display(),
                "hot reload enabled"
            );
            Some(crate::reload::spawn_watcher(
                Arc::clone(&self),
                self.stop_tx.subscribe(),
            )?)
        } else {
            None
        };

        wait_for_shutdown(stop_rx).await;
        info!(target: "supervisor", "stopping");
        let _ = self.stop_tx.send(true);

        join_with_grace(worker, "worker").await;
        join_with_grace(ipc, "ipc").await;
        if let Some(watcher) = watcher {
            join_with_grace(watcher, "watcher").await;
        }

        if socket_path.exists() {
            let _ = std::fs::remove_file(&socket_path);
        }
        info!(target: "supervisor", "shutdown complete");
        Ok(())
    }

    /// Reload configuration from disk and diff the job index. Failures
    /// leave the previous index untouched.
    pub fn reload_now(&self) -> Option<ReloadSummary> {
        let mut inner = self.lock();

        let new_config = match load_global_config(&self.paths) {
            Ok(config) => config,
            Err(e) => {
                error!(target: "supervisor", error = %e, "reload failed");
                return None;
            }
        };
        let new_syncs = match load_sync_configs(&self.paths.syncs_dir) {
            Ok(syncs) => syncs,
            Err(e) => {
                error!(target: "supervisor", error = %e, "reload failed");
                return None;
            }
        };

        inner.config = new_config;
        let new_index: HashMap<String, SyncConfig> = new_syncs
            .iter()
            .map(|sync| (sync.id.clone(), sync.clone()))
            .collect();

        let mut summary = ReloadSummary::default();

        let removed: Vec<String> = inner
            .sync_index
            .keys()
            .filter(|id| !new_index.contains_key(*id))
            .cloned()
            .collect();
        for sync_id in removed {
            self.scheduler.remove(&sync_id);
            info!(target: "supervisor", sync_id = %sync_id, "sync removed");
            summary.removed += 1;
        }

        for (sync_id, sync) in &new_index {
            match inner.sync_index.get(sync_id) {
                Some(previous) if previous == sync => {}
                Some(_) => {
                    if let Err(e) = self.scheduler.register(sync.clone(), true) {
                        error!(target: "supervisor", sync_id = %sync_id, error = %e, "schedule invalid");
                        continue;
                    }
                    info!(target: "supervisor", sync_id = %sync_id, "sync updated");
                    summary.updated += 1;
                }
                None => {
                    if let Err(e) = self.scheduler.register(sync.clone(), true) {
                        error!(target: "supervisor", sync_id = %sync_id, error = %e, "schedule invalid");
                        continue;
                    }
                    info!(target: "supervisor", sync_id = %sync_id, "sync added");
                    summary.added += 1;
                }
            }
        }

        inner.sync_index = new_index;
        inner.cache.set_syncs(&new_syncs);
        Some(summary)
    }

    /// Serve one control-plane request. Never panics; unknown ids and
    /// commands come back as error responses.
    pub fn handle_request(&self, request: &Request) -> Response {
        if request.command == Command::Status {
            return Response::jobs(self.scheduler.snapshot());
        }

        let Some(sync_id) = request.sync_id.as_deref() else {
            return Response::error(format!("Command '{}' requires sync_id", request.command));
        };
        if !self.lock().sync_index.contains_key(sync_id) {
            return Response::error(format!("Unknown sync: {sync_id}"));
        }

        match request.command {
            Command::Start => {
                if self.scheduler.trigger_now(sync_id) {
                    Response::ok(format!("Triggered {sync_id}"))
                } else {
                    // deleted earlier: re-register from the index
                    let config = self.lock().sync_index.get(sync_id).cloned();
                    match config {
                        Some(config) => match self.scheduler.register(config, true) {
                            Ok(()) => Response::ok(format!("Triggered {sync_id}")),
                            Err(e) => Response::error(e.to_string()),
                        },
                        None => Response::error(format!("Unknown sync: {sync_id}")),
                    }
                }
            }
            Command::Pause => {
                if self.scheduler.pause(sync_id) {
                    Response::ok(format!("Paused {sync_id}"))
                } else {
                    Response::error(format!("Unknown sync: {sync_id}"))
                }
            }
            Command::Resume => {
                if self.scheduler.resume(sync_id) {
                    Response::ok(format!("Resumed {sync_id}"))
                } else {
                    Response::error(format!("Unknown sync: {sync_id}"))
                }
            }
            Command::Delete => {
                if self.scheduler.remove(sync_id) {
                    Response::ok(format!("Removed {sync_id}"))
                } else {
                    Response::error(format!("Unknown sync: {sync_id}"))
                }
            }
            Command::Status => unreachable!("handled above"),
        }
    }
}

struct SupervisorFireHandler {
    supervisor: Arc<Supervisor>,
}

#[async_trait]
impl FireHandler for SupervisorFireHandler {
    async fn fire(&self, sync: SyncConfig) {
        let supervisor = &self.supervisor;

        // snapshot config and cache up front so the fire sees one
        // consistent view
        let (global, shared) = {
            let mut inner = supervisor.lock();
            let config = inner.config.clone();
            let shared = inner.cache.refresh(&config, false);
            (config, shared)
        };

        let report = execute_fire(
            &sync,
            &global,
            &supervisor.paths,
            &supervisor.registry,
            shared,
        )
        .await;

        match report {
            Ok(_) if sync.kind == "playlist_cache" => {
                let mut inner = supervisor.lock();
                let config = inner.config.clone();
                inner.cache.refresh(&config, true);
            }
            Ok(_) => {}
            Err(e) => {
                error!(target: "supervisor", sync_id = %sync.id, error = %e, "fire failed");
            }
        }
    }
}

fn bind_socket(path: &std::path::Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SupervisorError::IpcBind {
            path: path.to_path_buf(),
            source,
        })?;
    }
    if path.exists() {
        std::fs::remove_file(path).map_err(|source| SupervisorError::IpcBind {
            path: path.to_path_buf(),
            source,
        })?;
    }
    UnixListener::bind(path).map_err(|source| SupervisorError::IpcBind {
        path: path.to_path_buf(),
        source,
    })
}

async fn wait_for_shutdown(mut stop: watch::Receiver<bool>) {
    let mut interrupt = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
    {
        Ok(signal) => signal,
        Err(e) => {
            error!(target: "supervisor", error = %e, "failed to install SIGINT handler");
            let _ = stop.changed().await;
            return;
        }
    };
    let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(signal) => signal,
        Err(e) => {
            error!(target: "supervisor", error = %e, "failed to install SIGTERM handler");
            let _ = stop.changed().await;
            return;
        }
    };

    tokio::select! {
        _ = interrupt.recv() => info!(target: "supervisor", signal = "SIGINT", "signal received"),
        _ = terminate.recv() => info!(target: "supervisor", signal = "SIGTERM", "signal received"),
        _ = stop.changed() => {}
    }
}

async fn join_with_grace(handle: JoinHandle<()>, name: &str) {
    if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
        warn!(target: "supervisor", task = name, "did not stop within grace period");
    }
}

#[cfg(test)]
mod supervisor_tests;
