// SPDX-License-Identifier: GPL-3.0-or-later

//! Wire schema and client for the supervisor control socket.
//!
//! One request per connection: the client writes a single UTF-8 JSON object
//! and half-closes, the server answers with a single JSON object and closes.
//! Requests are capped at 64 KiB.

mod protocol;
mod wire;

use std::path::PathBuf;

use thiserror::Error;

pub use protocol::{Command, JobStatus, Request, Response};
pub use wire::{read_request, send_command, write_response, MAX_MESSAGE_SIZE};

pub type Result<T> = std::result::Result<T, IpcError>;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("supervisor socket not found at {0}; is 'syncopate serve' running?")]
    SocketMissing(PathBuf),

    #[error("unable to communicate with supervisor: {0}")]
    Io(#[from] std::io::Error),

    #[error("request exceeds {MAX_MESSAGE_SIZE} bytes")]
    MessageTooLarge,

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}
