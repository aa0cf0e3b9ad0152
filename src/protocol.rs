//! Wire protocol for the GNU `screen` control socket.
//!
//! A frontend talks to the backend by writing a single C `struct Message` to
//! the control socket. There is no length prefix: the backend reads exactly
//! `sizeof(struct Message)` as fixed by its own compile-time constants, so the
//! encoded buffer must match that size byte for byte. The size depends on the
//! target operating system (`MAXPATHLEN`) and on the protocol revision
//! (`MAXTERMLEN`, plus a `detachfirst` field added in revision 1).
//!
//! Wire layout: `[revision: u32][type: u32][tty path: MAXPATHLEN, padded]`
//! followed by a union of request payloads, zero-filled up to the size of its
//! largest arm. Every integer is little-endian; every variable-width field is
//! zero-padded to the next 4-byte boundary.

use bytes::{BufMut, Bytes, BytesMut};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Request type codes. Only `Attach` is ever emitted; the rest participate in
/// the union size arithmetic and are kept for completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    Create = 0,
    Error = 1,
    Attach = 2,
    Cont = 3,
    Detach = 4,
    PowDetach = 5,
    Winch = 6,
    Hangup = 7,
    Command = 8,
    Query = 9,
}

/// Highest protocol revision this frontend knows how to speak.
pub const MAX_VERSION: u32 = 5;

/// `MAXLOGINLEN`, constant across every supported platform.
pub const MAX_LOGIN_LEN: usize = 256;

/// The `$TERM` value a screen frontend always reports.
pub const ENV_TERM: &str = "screen";

/// The magic-tagged revision word: `'m' 's' 'g'` over the version byte.
pub fn revision(version: u32) -> u32 {
    (u32::from(b'm') << 24) | (u32::from(b's') << 16) | (u32::from(b'g') << 8) | version
}

/// Round up to the next multiple of 4. Field padding within the message is
/// always relative to a 4-byte boundary from the start of the struct.
pub const fn pad(n: usize) -> usize {
    (n + 3) & !3
}

/// Errors in layout selection or message construction.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("no screen message layout for operating system {0:?}")]
    UnknownOs(String),

    #[error("unknown screen protocol version {0}")]
    UnknownVersion(u32),

    #[error("payload does not match message type {0:?}")]
    PayloadMismatch(MessageType),
}

/// Operating systems with a known `MAXPATHLEN`.
///
/// The value cannot be probed at runtime (PATH_MAX is a lie on several
/// platforms), so the table is hardcoded. An OS outside the table is an
/// error, never a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Darwin,
    Linux,
    Windows,
    Freebsd,
    Openbsd,
    Netbsd,
    Plan9,
    Solaris,
    Nacl,
    Dragonfly,
    Android,
}

impl Os {
    /// Resolve the build target's OS.
    pub fn current() -> Result<Self, ProtocolError> {
        Self::from_name(std::env::consts::OS)
    }

    pub fn from_name(name: &str) -> Result<Self, ProtocolError> {
        match name {
            "darwin" | "macos" => Ok(Self::Darwin),
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            "freebsd" => Ok(Self::Freebsd),
            "openbsd" => Ok(Self::Openbsd),
            "netbsd" => Ok(Self::Netbsd),
            "plan9" => Ok(Self::Plan9),
            "solaris" => Ok(Self::Solaris),
            "nacl" => Ok(Self::Nacl),
            "dragonfly" => Ok(Self::Dragonfly),
            "android" => Ok(Self::Android),
            other => Err(ProtocolError::UnknownOs(other.to_string())),
        }
    }

    /// `MAXPATHLEN` for this OS.
    pub fn max_path_len(self) -> usize {
        match self {
            Self::Linux => 4096,
            Self::Windows => 260,
            Self::Darwin
            | Self::Freebsd
            | Self::Openbsd
            | Self::Netbsd
            | Self::Plan9
            | Self::Solaris
            | Self::Nacl
            | Self::Dragonfly
            | Self::Android => 1024,
        }
    }
}

/// The sizes that drive the wire format for one `(os, version)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub version: u32,
    pub max_path_len: usize,
    pub max_login_len: usize,
    pub max_term_len: usize,
    /// Revision 1 added a `detachfirst` word to the attach arm.
    pub has_detachfirst: bool,
}

impl Layout {
    pub fn new(os: Os, version: u32) -> Result<Self, ProtocolError> {
        if version > MAX_VERSION {
            return Err(ProtocolError::UnknownVersion(version));
        }
        Ok(Self {
            version,
            max_path_len: os.max_path_len(),
            max_login_len: MAX_LOGIN_LEN,
            max_term_len: if version <= 2 { 20 } else { 32 },
            has_detachfirst: version >= 1,
        })
    }

    /// Bytes before the union payload: revision, type, padded tty path.
    pub fn header_size(&self) -> usize {
        8 + pad(self.max_path_len)
    }

    /// Total wire length of one message: header plus the largest union arm.
    ///
    /// Revision 5 pads the create arm's terminal field to `MAXTERMLEN + 1`
    /// instead of `MAXTERMLEN`; the attach arm always carries the trailing
    /// NUL slot.
    pub fn message_size(&self) -> usize {
        let p = pad(self.max_path_len);
        let l = pad(self.max_login_len + 1);
        let t = pad(self.max_term_len);
        let t1 = pad(self.max_term_len + 1);

        let create = if self.version == 5 {
            20 + 2 * p + t1
        } else {
            20 + 2 * p + t
        };
        let attach = l + 16 + 20 + 8 + t1 + if self.has_detachfirst { 8 } else { 4 };
        let detach = l + 4;
        let command = l + 4 + pad(self.max_path_len + 1) + 4 + 20 + p;
        let message = pad(self.max_path_len * 2);

        self.header_size() + create.max(attach).max(detach).max(command).max(message)
    }
}

// ── Request payloads ───────────────────────────────────────────────

/// The attach arm of the message union.
///
/// String fields are truncated to their slot width; a terminating NUL is
/// written only when the slot has room for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachRequest {
    /// Filesystem path of the PTY follower the backend should open.
    pub tty_path: PathBuf,
    /// Login name of the attaching user.
    pub username: String,
    /// PID the backend signals with SIGCONT on success.
    pub pid: i32,
    pub lines: u32,
    pub columns: u32,
    /// Escape characters; -1 leaves the session's setting unchanged.
    pub esc: i32,
    pub meta_esc: i32,
    pub env_term: String,
    pub adapt_flag: u32,
    pub encoding: u32,
    pub preselect: [u8; 20],
}

impl AttachRequest {
    pub fn new(tty_path: &Path, username: &str, pid: i32, lines: u32, columns: u32) -> Self {
        Self {
            tty_path: tty_path.to_path_buf(),
            username: username.to_string(),
            pid,
            lines,
            columns,
            esc: -1,
            meta_esc: -1,
            env_term: ENV_TERM.to_string(),
            adapt_flag: 0,
            encoding: 0,
            preselect: [0; 20],
        }
    }

    fn write_union(&self, buf: &mut BytesMut, layout: &Layout) {
        put_text_field(
            buf,
            self.username.as_bytes(),
            layout.max_login_len,
            pad(layout.max_login_len + 1),
        );
        buf.put_i32_le(self.pid);
        buf.put_u32_le(self.adapt_flag);
        buf.put_u32_le(self.lines);
        buf.put_u32_le(self.columns);
        buf.put_slice(&self.preselect);
        buf.put_i32_le(self.esc);
        buf.put_i32_le(self.meta_esc);
        put_text_field(
            buf,
            self.env_term.as_bytes(),
            layout.max_term_len,
            pad(layout.max_term_len + 1),
        );
        buf.put_u32_le(self.encoding);
        if layout.has_detachfirst {
            // The backend expects the ATTACH code here, not a boolean.
            buf.put_u32_le(MessageType::Attach as u32);
        }
    }
}

/// A typed union arm. Only attach is ever sent.
#[derive(Debug, Clone)]
pub enum Payload {
    Attach(AttachRequest),
}

/// Encode one message for the control socket.
///
/// The result is exactly `layout.message_size()` bytes; everything past the
/// written arm is zero.
pub fn encode(
    layout: &Layout,
    msg_type: MessageType,
    payload: &Payload,
) -> Result<Bytes, ProtocolError> {
    match (msg_type, payload) {
        (MessageType::Attach, Payload::Attach(_)) => {}
        (other, _) => return Err(ProtocolError::PayloadMismatch(other)),
    }

    let total = layout.message_size();
    let mut buf = BytesMut::with_capacity(total);

    buf.put_u32_le(revision(layout.version));
    buf.put_u32_le(msg_type as u32);

    match payload {
        Payload::Attach(req) => {
            put_text_field(
                &mut buf,
                req.tty_path.as_os_str().as_bytes(),
                layout.max_path_len,
                pad(layout.max_path_len),
            );
            req.write_union(&mut buf, layout);
        }
    }

    buf.put_bytes(0, total - buf.len());
    Ok(buf.freeze())
}

/// Copy `value` (truncated to `max_copy`) into a slot of `width` bytes,
/// zero-filling the remainder.
fn put_text_field(buf: &mut BytesMut, value: &[u8], max_copy: usize, width: usize) {
    let n = value.len().min(max_copy);
    buf.put_slice(&value[..n]);
    buf.put_bytes(0, width - n);
}
