// SPDX-License-Identifier: GPL-3.0-or-later

use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{debug, error};

use syncopate_ipc::{read_request, write_response, Response};

use crate::supervisor::Supervisor;

/// Accept loop for the control socket.
///
/// One request per connection; handlers run inline since they only touch
/// in-memory scheduler state. Bad requests answer with an error response,
/// never by dropping the server.
pub(crate) async fn serve(
    supervisor: Arc<Supervisor>,
    listener: UnixListener,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((mut stream, _)) => {
                        let response = match read_request(&mut stream).await {
                            Ok(request) => supervisor.handle_request(&request),
                            Err(e) => Response::error(e.to_string()),
                        };
                        if let Err(e) = write_response(&mut stream, &response).await {
                            debug!(target: "ipc", error = %e, "client went away before the response");
                        }
                    }
                    Err(e) => {
                        error!(target: "ipc", error = %e, "accept failed");
                    }
                }
            }
            _ = stop.changed() => {
                if *stop.borrow() {
                    break;
                }
            }
        }
    }
    debug!(target: "ipc", "control socket closed");
}
