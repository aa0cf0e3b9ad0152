//! PTY-to-WebSocket forwarding.
//!
//! Every chunk read from the PTY controller is shipped as one binary frame:
//! a 12-byte timecode header (seconds and sub-second words of the delta since
//! the previous chunk, then the chunk length, all little-endian i32) followed
//! by the raw bytes. The first frame's delta is measured from process start.
//!
//! Reads happen on a blocking thread; frames cross an mpsc channel to an
//! async task that owns the WebSocket sink, so frames go out in read order.

use bytes::{BufMut, Bytes, BytesMut};
use futures::{Sink, SinkExt};
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};

/// Timecode header length in bytes.
pub const HEADER_LEN: usize = 12;

const READ_BUF_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("pty read failed: {0}")]
    PtyRead(#[source] std::io::Error),

    #[error("websocket write failed: {0}")]
    WsWrite(#[source] tungstenite::Error),
}

/// Split a nanosecond delta into the header's seconds and sub-second words.
/// The sub-second word is `delta / 100 mod 1e6`, wrapped into range if the
/// delta ever comes out negative.
fn split_delta(delta_nanos: i64) -> (i32, i32) {
    let seconds = (delta_nanos / 1_000_000_000) as i32;
    let mut micros = ((delta_nanos / 100) % 1_000_000) as i32;
    if micros < 0 {
        micros += 1_000_000;
    }
    (seconds, micros)
}

/// Build one wire frame: timecode header plus chunk.
pub fn frame(delta_nanos: i64, chunk: &[u8]) -> Bytes {
    let (seconds, micros) = split_delta(delta_nanos);
    let mut buf = BytesMut::with_capacity(HEADER_LEN + chunk.len());
    buf.put_i32_le(seconds);
    buf.put_i32_le(micros);
    buf.put_i32_le(chunk.len() as i32);
    buf.put_slice(chunk);
    buf.freeze()
}

/// Read the PTY controller on a blocking thread, framing each chunk into
/// `frame_tx`. `started` anchors the first frame's delta.
///
/// The controller may be closed out from under us by the signal demux; a
/// read failing with EBADF or EIO is the normal exit, not an error.
pub fn spawn_reader(
    controller_fd: RawFd,
    started: Instant,
    frame_tx: mpsc::Sender<Bytes>,
) -> JoinHandle<Result<(), ForwardError>> {
    tokio::task::spawn_blocking(move || {
        let mut last = started;
        let mut buf = [0u8; READ_BUF_LEN];
        loop {
            let n = unsafe { libc::read(controller_fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n < 0 {
                let err = std::io::Error::last_os_error();
                return match err.raw_os_error() {
                    Some(libc::EBADF) | Some(libc::EIO) => {
                        tracing::debug!("pty closed, forwarder exiting");
                        Ok(())
                    }
                    _ => Err(ForwardError::PtyRead(err)),
                };
            }
            if n == 0 {
                // Nothing to ship; don't spin hot.
                std::thread::sleep(Duration::from_millis(1));
                continue;
            }

            let now = Instant::now();
            let delta = now.duration_since(last).as_nanos() as i64;
            last = now;

            let framed = frame(delta, &buf[..n as usize]);
            if frame_tx.blocking_send(framed).is_err() {
                // The websocket side is gone; shutdown is underway.
                return Ok(());
            }
        }
    })
}

/// Drain `frame_rx` into the WebSocket sink as binary messages.
pub fn spawn_writer<S>(
    mut sink: S,
    mut frame_rx: mpsc::Receiver<Bytes>,
) -> JoinHandle<Result<(), ForwardError>>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(framed) = frame_rx.recv().await {
            sink.send(Message::binary(framed))
                .await
                .map_err(ForwardError::WsWrite)?;
        }
        Ok(())
    })
}
