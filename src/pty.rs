//! PTY pair allocation.
//!
//! The backend attaches to the *follower* side by path, so unlike an ordinary
//! terminal wrapper we never spawn a child on the pair: the follower stays
//! open in this process (dropping it would make controller reads fail early)
//! and its path goes into the attach message.

use nix::pty::{openpty, OpenptyResult, Winsize};
use std::os::unix::io::OwnedFd;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PtyError {
    #[error("failed to open pty: {0}")]
    OpenPty(#[source] nix::Error),

    #[error("failed to resolve pty follower path: {0}")]
    FollowerPath(#[source] nix::Error),
}

/// An open PTY pair plus the follower's filesystem path.
pub struct PtyPair {
    controller: OwnedFd,
    follower: OwnedFd,
    follower_path: PathBuf,
}

impl PtyPair {
    /// Open a fresh pair sized to the virtual display.
    pub fn open(lines: u16, columns: u16) -> Result<Self, PtyError> {
        let winsize = Winsize {
            ws_row: lines,
            ws_col: columns,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let OpenptyResult { master, slave } = openpty(&winsize, None).map_err(PtyError::OpenPty)?;
        let follower_path = nix::unistd::ttyname(&slave).map_err(PtyError::FollowerPath)?;

        Ok(Self {
            controller: master,
            follower: slave,
            follower_path,
        })
    }

    /// Path of the follower side; this is what goes into the attach message.
    pub fn follower_path(&self) -> &Path {
        &self.follower_path
    }

    /// Give up ownership of both descriptors.
    ///
    /// The caller becomes responsible for closing the controller (the signal
    /// demux closes it on SIGINT) and for keeping the follower open for the
    /// life of the process.
    pub fn into_parts(self) -> (OwnedFd, OwnedFd, PathBuf) {
        (self.controller, self.follower, self.follower_path)
    }
}
