//! Attach-time protocol negotiation.
//!
//! The backend never answers on the control socket. An attach at a revision
//! it understands makes it open the tty named in the message and send SIGCONT
//! to the pid named in the message; an attach at a revision it does not
//! understand is discarded (or answered on the tty, never the socket). So
//! negotiation is: send the attach at the highest revision we speak, wait
//! briefly for SIGCONT, and step down until one lands.

use crate::protocol::{self, AttachRequest, Layout, MessageType, Os, Payload};
use crate::socket::{self, SocketError};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Default virtual display size reported to the backend.
pub const DEFAULT_LINES: u32 = 50;
pub const DEFAULT_COLUMNS: u32 = 132;

/// How long to wait for the backend's SIGCONT before stepping down a
/// revision. This window is the whole negotiation protocol.
pub const REPLY_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("could not negotiate a protocol version with the screen backend")]
    Exhausted,

    #[error("signal listener went away before negotiation finished")]
    SignalLost,

    #[error(transparent)]
    Protocol(#[from] protocol::ProtocolError),

    #[error(transparent)]
    Socket(#[from] SocketError),
}

/// Build an attach request describing this process.
pub fn current_request(tty_path: &Path, lines: u32, columns: u32) -> AttachRequest {
    AttachRequest::new(
        tty_path,
        &login_name(),
        std::process::id() as i32,
        lines,
        columns,
    )
}

fn login_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Drive the negotiation loop: `send(version)` for each revision from
/// [`protocol::MAX_VERSION`] down to 0, returning the revision whose send was
/// answered by SIGCONT on `cont_rx`.
///
/// `cont_rx` must come from a buffered channel so a signal that lands between
/// the send and the await is kept, not dropped.
pub async fn negotiate<F>(mut send: F, cont_rx: &mut mpsc::Receiver<()>) -> Result<u32, AttachError>
where
    F: FnMut(u32) -> Result<(), AttachError>,
{
    for version in (0..=protocol::MAX_VERSION).rev() {
        tracing::info!(version, "trying protocol version");
        send(version)?;
        match tokio::time::timeout(REPLY_TIMEOUT, cont_rx.recv()).await {
            Ok(Some(())) => return Ok(version),
            Ok(None) => return Err(AttachError::SignalLost),
            Err(_) => {} // no answer at this revision, step down
        }
    }
    Err(AttachError::Exhausted)
}

/// Attach to the backend behind `socket_path`, binding it to the PTY follower
/// at `tty_path`. Returns the negotiated revision.
pub async fn attach(
    socket_path: &Path,
    tty_path: &Path,
    lines: u32,
    columns: u32,
    cont_rx: &mut mpsc::Receiver<()>,
) -> Result<u32, AttachError> {
    let os = Os::current()?;
    negotiate(
        |version| {
            let layout = Layout::new(os, version)?;
            let request = current_request(tty_path, lines, columns);
            let message =
                protocol::encode(&layout, MessageType::Attach, &Payload::Attach(request))?;
            socket::write_message(socket_path, &message)?;
            Ok(())
        },
        cont_rx,
    )
    .await
}
