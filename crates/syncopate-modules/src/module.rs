// SPDX-License-Identifier: GPL-3.0-or-later

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::context::SyncContext;
use crate::outcome::RunOutcome;
use crate::Result;

/// Behaviour required of every sync module.
///
/// Construction validates options; `run` performs exactly one execution and
/// must not spawn background work. The summary is read by the supervisor
/// after `run` returns (or fails) and merged into the RunRecord details.
#[async_trait]
pub trait SyncModule: Send + std::fmt::Debug {
    async fn run(&mut self, ctx: &mut SyncContext<'_>) -> Result<RunOutcome>;

    /// Free-form key/value view of the last execution.
    fn last_run_summary(&self) -> Map<String, Value> {
        Map::new()
    }
}
