//! screenrun — play a running GNU `screen` session in a remote web viewer.
//!
//! Startup sequence: open a PTY pair, start the signal demux, negotiate an
//! attach revision against the control socket (success arrives as SIGCONT),
//! dial the viewer WebSocket, then forward PTY output until either side
//! closes or a signal asks us to stop.

use clap::Parser as ClapParser;
use futures::StreamExt;
use screenrun::{attach, config, forward, pty, signals, viewer};
use std::os::unix::io::IntoRawFd;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Play a running GNU screen session in a remote web viewer.
///
/// Attaches to the screen backend behind the given control socket and
/// streams the session to the viewer service, read-only.
#[derive(ClapParser, Debug)]
#[command(name = "screenrun", version, about)]
struct Args {
    /// Path of the screen control socket or pipe,
    /// e.g. $HOME/.screen/1234.pts-0.host
    socket: PathBuf,
}

#[derive(Error, Debug)]
enum RunError {
    #[error("pty error: {0}")]
    Pty(#[from] pty::PtyError),

    #[error("signal setup failed: {0}")]
    Signals(#[source] std::io::Error),

    #[error("attach failed: {0}")]
    Attach(#[from] attach::AttachError),

    #[error("viewer error: {0}")]
    Viewer(#[from] viewer::ViewerError),

    #[error("forwarder error: {0}")]
    Forward(#[from] forward::ForwardError),

    #[error("task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // Help and version are not argument errors.
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "screenrun=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<i32, RunError> {
    let started = Instant::now();

    let pair = pty::PtyPair::open(attach::DEFAULT_LINES as u16, attach::DEFAULT_COLUMNS as u16)?;
    let tty_path = pair.follower_path().to_path_buf();
    let (controller, follower, _) = pair.into_parts();

    // The signal demux owns closing the controller (on SIGINT); keep only
    // the raw descriptor here. The follower must stay open for the life of
    // the process so the backend's tty does not hang up.
    let controller_fd = controller.into_raw_fd();
    let _follower = follower;

    let (cont_tx, mut cont_rx) = mpsc::channel(1);
    let (closed_tx, mut closed_rx) = mpsc::channel(4);
    signals::spawn(controller_fd, cont_tx, closed_tx.clone()).map_err(RunError::Signals)?;

    tracing::info!(
        socket = %args.socket.display(),
        tty = %tty_path.display(),
        "attaching to screen"
    );
    let version = attach::attach(
        &args.socket,
        &tty_path,
        attach::DEFAULT_LINES,
        attach::DEFAULT_COLUMNS,
        &mut cont_rx,
    )
    .await?;
    tracing::info!(version, "attached");

    let id = config::new_session_id();
    let mut ws = viewer::connect(&format!("{}{}", config::stream_url(), id)).await?;
    viewer::wait_ready(&mut ws).await?;

    let (sink, stream) = ws.split();
    let (frame_tx, frame_rx) = mpsc::channel(64);
    let reader = forward::spawn_reader(controller_fd, started, frame_tx);
    let writer = forward::spawn_writer(sink, frame_rx);
    viewer::spawn_drain(stream, closed_tx.clone());

    println!("View at {}{}", config::view_url(), id);

    tokio::select! {
        _ = closed_rx.recv() => {
            tracing::info!("connection closed, exiting");
            Ok(0)
        }
        result = reader => {
            result??;
            Ok(0)
        }
        result = writer => {
            result??;
            Ok(0)
        }
    }
}
