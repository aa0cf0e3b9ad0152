//! OS signal routing.
//!
//! One task owns every signal this process cares about. SIGCONT is the
//! backend's attach acknowledgement and goes to the negotiator; SIGINT starts
//! a graceful close; SIGHUP (the backend's goodbye) exits immediately.
//! Everything else screen-related is received and dropped with a log line.

use std::os::unix::io::RawFd;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Register the signal set and spawn the routing task.
///
/// `controller_fd` is the PTY controller; it gets closed on SIGINT so the
/// forwarder's blocked read turns into its exit path. `cont_tx` must be a
/// buffered channel: a SIGCONT that lands while the negotiator is between
/// send and await has to be kept.
pub fn spawn(
    controller_fd: RawFd,
    cont_tx: mpsc::Sender<()>,
    closed_tx: mpsc::Sender<()>,
) -> std::io::Result<JoinHandle<()>> {
    let mut sigcont = signal(SignalKind::from_raw(libc::SIGCONT))?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;
    let mut sigwinch = signal(SignalKind::window_change())?;
    let mut sigalrm = signal(SignalKind::alarm())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigcont.recv() => {
                    // Hand SIGCONT back to its default disposition so that
                    // job control behaves normally once attached.
                    unsafe {
                        libc::signal(libc::SIGCONT, libc::SIG_DFL);
                    }
                    let _ = cont_tx.try_send(());
                }
                _ = sigint.recv() => {
                    tracing::info!("caught SIGINT, shutting down");
                    unsafe {
                        libc::close(controller_fd);
                    }
                    let _ = closed_tx.try_send(());
                }
                _ = sighup.recv() => {
                    std::process::exit(0);
                }
                _ = sigusr1.recv() => {
                    tracing::debug!("ignoring SIGUSR1 (power detach)");
                }
                _ = sigusr2.recv() => {
                    tracing::debug!("ignoring SIGUSR2 (lock)");
                }
                _ = sigwinch.recv() => {
                    tracing::debug!("ignoring SIGWINCH");
                }
                _ = sigalrm.recv() => {
                    tracing::debug!("ignoring SIGALRM");
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use std::os::unix::io::IntoRawFd;
    use std::time::Duration;

    #[tokio::test]
    async fn sigcont_reaches_the_negotiator_channel() {
        let (cont_tx, mut cont_rx) = mpsc::channel(1);
        let (closed_tx, _closed_rx) = mpsc::channel(1);
        let _demux = spawn(-1, cont_tx, closed_tx).unwrap();

        kill(Pid::this(), Signal::SIGCONT).unwrap();

        tokio::time::timeout(Duration::from_secs(2), cont_rx.recv())
            .await
            .expect("SIGCONT was not routed")
            .expect("channel closed");
    }

    #[tokio::test]
    async fn sigint_closes_the_controller_and_notifies() {
        let (read_end, _write_end) = nix::unistd::pipe().unwrap();
        // The demux owns closing this descriptor from here on.
        let raw = read_end.into_raw_fd();

        let (cont_tx, _cont_rx) = mpsc::channel(1);
        let (closed_tx, mut closed_rx) = mpsc::channel(1);
        let _demux = spawn(raw, cont_tx, closed_tx).unwrap();

        kill(Pid::this(), Signal::SIGINT).unwrap();

        tokio::time::timeout(Duration::from_secs(2), closed_rx.recv())
            .await
            .expect("SIGINT was not routed")
            .expect("channel closed");
    }
}
