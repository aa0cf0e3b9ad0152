//! screenrun — play a running GNU `screen` session in a remote web viewer.
//!
//! screenrun impersonates a `screen` frontend process: it writes an attach
//! message to the backend's control socket, negotiates a protocol revision by
//! waiting for the backend's SIGCONT, and then streams everything the session
//! writes to the attached PTY over a WebSocket, framed with a timecode header.
//!
//! The session is observed, never typed into.

pub mod attach;
pub mod config;
pub mod forward;
pub mod protocol;
pub mod pty;
pub mod signals;
pub mod socket;
pub mod viewer;
