// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::protocol::{Request, Response};
use crate::{IpcError, Result};

/// Maximum size of a single request or response payload.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Send one command to the supervisor socket and await the response.
pub async fn send_command(socket_path: &Path, request: &Request) -> Result<Response> {
    let exchange = async {
        let mut stream = UnixStream::connect(socket_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound
                || e.kind() == std::io::ErrorKind::ConnectionRefused
            {
                IpcError::SocketMissing(socket_path.to_path_buf())
            } else {
                IpcError::Io(e)
            }
        })?;

        let payload = serde_json::to_vec(request)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(IpcError::MessageTooLarge);
        }
        stream.write_all(&payload).await?;
        // half-close so the server sees the end of the request
        stream.shutdown().await?;

        let mut buffer = Vec::with_capacity(1024);
        stream
            .take(MAX_MESSAGE_SIZE as u64)
            .read_to_end(&mut buffer)
            .await?;
        Ok(serde_json::from_slice(&buffer)?)
    };

    tokio::time::timeout(CLIENT_TIMEOUT, exchange)
        .await
        .map_err(|_| {
            IpcError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "supervisor did not answer in time",
            ))
        })?
}

/// Server side: read one request from an accepted connection. The client
/// half-closes after writing, so read-to-end terminates.
pub async fn read_request(stream: &mut UnixStream) -> Result<Request> {
    let mut buffer = Vec::with_capacity(1024);
    let mut limited = stream.take(MAX_MESSAGE_SIZE as u64 + 1);
    limited.read_to_end(&mut buffer).await?;
    if buffer.len() > MAX_MESSAGE_SIZE {
        return Err(IpcError::MessageTooLarge);
    }
    Ok(serde_json::from_slice(&buffer)?)
}

/// Server side: write the single response and flush.
pub async fn write_response(stream: &mut UnixStream, response: &Response) -> Result<()> {
    let payload = serde_json::to_vec(response)?;
    stream.write_all(&payload).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn round_trips_a_request_over_the_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("ipc.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await.unwrap();
            assert_eq!(request.command, Command::Pause);
            assert_eq!(request.sync_id.as_deref(), Some("mirror"));
            write_response(&mut stream, &Response::ok("Paused mirror"))
                .await
                .unwrap();
        });

        let response = send_command(&socket_path, &Request::for_sync(Command::Pause, "mirror"))
            .await
            .unwrap();
        assert!(response.is_ok());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn missing_socket_is_a_dedicated_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.sock");
        let err = send_command(&missing, &Request::status()).await.unwrap_err();
        assert!(matches!(err, IpcError::SocketMissing(_)));
    }

    #[tokio::test]
    async fn oversized_requests_are_rejected_server_side() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("ipc.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_request(&mut stream).await
        });

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        let huge = vec![b' '; MAX_MESSAGE_SIZE + 10];
        stream.write_all(&huge).await.unwrap();
        stream.shutdown().await.unwrap();

        assert!(matches!(
            server.await.unwrap().unwrap_err(),
            IpcError::MessageTooLarge
        ));
    }
}
