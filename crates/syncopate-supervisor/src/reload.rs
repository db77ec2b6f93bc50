// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::supervisor::Supervisor;
use crate::Result;

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Watch the syncs directory and the global config file, reloading the
/// supervisor's configuration on every (debounced) change.
pub(crate) fn spawn_watcher(
    supervisor: Arc<Supervisor>,
    mut stop: watch::Receiver<bool>,
) -> Result<JoinHandle<()>> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let mut debouncer = new_debouncer(DEBOUNCE, move |result| {
        let _ = tx.send(result);
    })?;
    debouncer
        .watcher()
        .watch(&supervisor.paths().syncs_dir, RecursiveMode::Recursive)?;
    debouncer
        .watcher()
        .watch(&supervisor.paths().global_config, RecursiveMode::NonRecursive)?;

    Ok(tokio::spawn(async move {
        // the debouncer stops watching when dropped, so it lives here
        let _debouncer = debouncer;
        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(Ok(events)) => {
                            info!(
                                target: "supervisor",
                                changes = events.len(),
                                "config change detected"
                            );
                            supervisor.reload_now();
                        }
                        Some(Err(e)) => {
                            warn!(target: "supervisor", error = %e, "watch error");
                        }
                        None => break,
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
            }
        }
    }))
}
