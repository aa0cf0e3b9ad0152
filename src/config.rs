//! Viewer service endpoints and session identity.
//!
//! `ENV=dev` points everything at a local viewer; anything else uses the
//! hosted service. The session id is what ties the upload stream to the view
//! page URL handed to the user.

use data_encoding::BASE32;
use rand::RngCore;

pub const STREAM_DEV_URL: &str = "ws://localhost:8080/tty?id=";
pub const STREAM_PROD_URL: &str = "wss://screen.run/tty?id=";
pub const VIEW_DEV_URL: &str = "http://localhost:8080/view?id=";
pub const VIEW_PROD_URL: &str = "https://screen.run/view?id=";

/// WebSocket endpoint the PTY stream is uploaded to.
pub fn stream_url() -> &'static str {
    stream_url_for(std::env::var("ENV").ok().as_deref())
}

pub fn stream_url_for(env: Option<&str>) -> &'static str {
    if env == Some("dev") {
        STREAM_DEV_URL
    } else {
        STREAM_PROD_URL
    }
}

/// Browser URL at which the session can be watched.
pub fn view_url() -> &'static str {
    view_url_for(std::env::var("ENV").ok().as_deref())
}

pub fn view_url_for(env: Option<&str>) -> &'static str {
    if env == Some("dev") {
        VIEW_DEV_URL
    } else {
        VIEW_PROD_URL
    }
}

/// A fresh viewer session id: base32 over 15 random bytes, 24 characters.
pub fn new_session_id() -> String {
    let mut raw = [0u8; 15];
    rand::thread_rng().fill_bytes(&mut raw);
    BASE32.encode(&raw)
}

/// This host's name, for the WebSocket `Origin` header.
pub fn resolve_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_env_selects_local_endpoints() {
        assert_eq!(stream_url_for(Some("dev")), STREAM_DEV_URL);
        assert_eq!(view_url_for(Some("dev")), VIEW_DEV_URL);
    }

    #[test]
    fn anything_else_selects_production() {
        assert_eq!(stream_url_for(None), STREAM_PROD_URL);
        assert_eq!(stream_url_for(Some("prod")), STREAM_PROD_URL);
        assert_eq!(view_url_for(Some("staging")), VIEW_PROD_URL);
    }

    #[test]
    fn session_id_is_24_base32_characters() {
        let id = new_session_id();
        assert_eq!(id.len(), 24);
        // 15 bytes is a multiple of the 5-byte quantum, so no '=' appears.
        assert!(id
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
    }

    #[test]
    fn hostname_is_nonempty() {
        assert!(!resolve_hostname().is_empty());
    }
}
