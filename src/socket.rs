//! Transport to the `screen` control endpoint.
//!
//! Depending on platform and screen version the control endpoint is either a
//! UNIX-domain socket or a FIFO; the file mode decides which. Each message is
//! delivered in a single open/write/close cycle, and nothing is ever read
//! back — the backend answers out of band via SIGCONT.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("screen socket not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is neither a FIFO nor a unix socket")]
    UnsupportedFileType(PathBuf),

    #[error("failed to open pipe {path}: {source}")]
    OpenPipe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Write one message to the control endpoint at `path`.
///
/// Blocking is fine here: messages are a few KiB and the backend drains its
/// socket promptly.
pub fn write_message(path: &Path, data: &[u8]) -> Result<(), SocketError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SocketError::NotFound(path.to_path_buf()))
        }
        Err(e) => {
            return Err(SocketError::Stat {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let file_type = metadata.file_type();
    if file_type.is_fifo() {
        // Read+write keeps the open from blocking when no reader is present.
        let mut pipe = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| SocketError::OpenPipe {
                path: path.to_path_buf(),
                source: e,
            })?;
        pipe.write_all(data).map_err(|e| SocketError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    } else if file_type.is_socket() {
        let mut stream = UnixStream::connect(path).map_err(|e| SocketError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        stream.write_all(data).map_err(|e| SocketError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    } else {
        return Err(SocketError::UnsupportedFileType(path.to_path_buf()));
    }

    Ok(())
}
