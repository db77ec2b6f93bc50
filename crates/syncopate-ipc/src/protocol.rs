// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Status,
    Start,
    Pause,
    Resume,
    Delete,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Status => "status",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Delete => "delete",
        };
        f.write_str(label)
    }
}

/// A single control-plane request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub command: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
}

impl Request {
    pub fn status() -> Self {
        Self {
            command: Command::Status,
            sync_id: None,
        }
    }

    pub fn for_sync(command: Command, sync_id: impl Into<String>) -> Self {
        Self {
            command,
            sync_id: Some(sync_id.into()),
        }
    }
}

/// One scheduled job as reported by `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: String,
    /// ISO-8601 time of the next fire; `null` while paused.
    pub next_run: Option<String>,
    /// True when the next fire time is already in the past.
    pub missed: bool,
    pub paused: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jobs: Option<Vec<JobStatus>>,
    },
    Error {
        message: String,
    },
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Self::Ok {
            message: Some(message.into()),
            jobs: None,
        }
    }

    pub fn jobs(jobs: Vec<JobStatus>) -> Self {
        Self::Ok {
            message: None,
            jobs: Some(jobs),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_serialize_to_the_documented_shape() {
        let raw = serde_json::to_value(Request::for_sync(Command::Pause, "mirror")).unwrap();
        assert_eq!(raw, serde_json::json!({"command": "pause", "sync_id": "mirror"}));

        let status = serde_json::to_value(Request::status()).unwrap();
        assert_eq!(status, serde_json::json!({"command": "status"}));
    }

    #[test]
    fn responses_tag_with_a_status_field() {
        let ok = serde_json::to_value(Response::ok("Paused mirror")).unwrap();
        assert_eq!(ok, serde_json::json!({"status": "ok", "message": "Paused mirror"}));

        let error = serde_json::to_value(Response::error("Unknown sync: x")).unwrap();
        assert_eq!(error["status"], "error");

        let jobs = serde_json::to_value(Response::jobs(vec![JobStatus {
            id: "a".to_string(),
            next_run: None,
            missed: false,
            paused: true,
        }]))
        .unwrap();
        assert_eq!(jobs["jobs"][0]["paused"], true);
        assert_eq!(jobs["jobs"][0]["next_run"], serde_json::Value::Null);
    }

    #[test]
    fn unknown_commands_fail_to_parse() {
        let err = serde_json::from_value::<Request>(serde_json::json!({"command": "explode"}));
        assert!(err.is_err());
    }
}
