// SPDX-License-Identifier: GPL-3.0-or-later

use serde_json::{Map, Value};

use syncopate_state::RunStatus;

/// Typed result of one module execution.
///
/// The status lands in the RunRecord; the detail fields become the record's
/// `details` object (merged with the supervisor's own bookkeeping).
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub details: Map<String, Value>,
}

impl RunOutcome {
    pub fn new(status: RunStatus) -> Self {
        Self {
            status,
            details: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Outcome for a 429 from the remote service: not an error, a status.
    pub fn rate_limited(reason: &str, retry_after: Option<u64>) -> Self {
        let mut outcome = Self::new(RunStatus::RateLimited).with("reason", reason);
        if let Some(seconds) = retry_after {
            outcome = outcome.with("retry_after", seconds);
        }
        outcome
    }
}
