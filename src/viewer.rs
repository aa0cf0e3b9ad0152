//! WebSocket client for the viewer service.
//!
//! Dials the upload endpoint with the `uploadtty` subprotocol, waits for the
//! service's setup message, and afterwards only writes: inbound traffic is
//! drained and dropped until the service closes the connection.

use crate::config;
use futures::stream::SplitStream;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::MaybeTlsStream;

pub type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Subprotocol the viewer service expects on the upload socket.
pub const SUBPROTOCOL: &str = "uploadtty";

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("failed to build websocket request: {0}")]
    BuildRequest(#[from] tungstenite::http::Error),

    #[error("websocket connect failed: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("websocket closed before the viewer was ready")]
    ClosedDuringSetup,

    #[error("websocket error while waiting for the viewer: {0}")]
    Setup(#[source] tungstenite::Error),
}

/// Dial the upload endpoint.
pub async fn connect(url: &str) -> Result<WsStream, ViewerError> {
    let request = Request::builder()
        .uri(url)
        .header("Host", host_authority(url))
        .header("Origin", config::resolve_hostname())
        .header("Sec-WebSocket-Protocol", SUBPROTOCOL)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", generate_key())
        .body(())?;

    let (ws, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(ViewerError::Connect)?;
    Ok(ws)
}

/// Block until the service's first message arrives; the service sends one
/// message once it has set the session up, and its content does not matter.
pub async fn wait_ready(ws: &mut WsStream) -> Result<(), ViewerError> {
    match ws.next().await {
        Some(Ok(_)) => Ok(()),
        Some(Err(e)) => Err(ViewerError::Setup(e)),
        None => Err(ViewerError::ClosedDuringSetup),
    }
}

/// Read-and-discard inbound frames until the connection ends, then notify
/// `closed_tx`.
pub fn spawn_drain(mut stream: SplitStream<WsStream>, closed_tx: mpsc::Sender<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match stream.next().await {
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "websocket read ended");
                    break;
                }
                None => break,
            }
        }
        let _ = closed_tx.try_send(());
    })
}

/// The authority component for the `Host` header.
fn host_authority(url: &str) -> &str {
    url.strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"))
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use std::net::SocketAddr;
    use tokio_tungstenite::tungstenite::handshake::server::{
        Request as ServerRequest, Response as ServerResponse,
    };
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn host_authority_strips_scheme_and_path() {
        assert_eq!(host_authority("ws://localhost:8080/tty?id=x"), "localhost:8080");
        assert_eq!(host_authority("wss://screen.run/tty?id=x"), "screen.run");
    }

    /// One-connection server that records the handshake headers, sends a
    /// ready message, and then closes.
    async fn spawn_ready_server() -> (
        SocketAddr,
        tokio::sync::oneshot::Receiver<(Option<String>, Option<String>)>,
    ) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (header_tx, header_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut captured = None;
            let ws = tokio_tungstenite::accept_hdr_async(
                stream,
                |req: &ServerRequest, mut resp: ServerResponse| {
                    let header = |name: &str| {
                        req.headers()
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .map(String::from)
                    };
                    captured = Some((header("sec-websocket-protocol"), header("origin")));
                    if let Some(protocol) = req.headers().get("sec-websocket-protocol") {
                        resp.headers_mut()
                            .insert("sec-websocket-protocol", protocol.clone());
                    }
                    Ok(resp)
                },
            )
            .await
            .unwrap();
            let _ = header_tx.send(captured.unwrap());

            let (mut sink, mut rx) = ws.split();
            sink.send(Message::text("ready")).await.unwrap();
            sink.send(Message::Close(None)).await.ok();
            while let Some(Ok(_)) = rx.next().await {}
        });

        (addr, header_rx)
    }

    #[tokio::test]
    async fn connect_sends_identifying_headers() {
        let (addr, header_rx) = spawn_ready_server().await;
        let url = format!("ws://{addr}/tty?id=TESTSESSION");

        let mut ws = connect(&url).await.unwrap();
        let (protocol, origin) = header_rx.await.unwrap();

        assert_eq!(protocol.as_deref(), Some(SUBPROTOCOL));
        assert_eq!(origin, Some(config::resolve_hostname()));

        wait_ready(&mut ws).await.unwrap();
    }

    #[tokio::test]
    async fn drain_notifies_when_the_server_closes() {
        let (addr, _header_rx) = spawn_ready_server().await;
        let url = format!("ws://{addr}/tty?id=TESTSESSION");

        let mut ws = connect(&url).await.unwrap();
        wait_ready(&mut ws).await.unwrap();

        let (_sink, stream) = ws.split();
        let (closed_tx, mut closed_rx) = mpsc::channel(1);
        spawn_drain(stream, closed_tx);

        tokio::time::timeout(std::time::Duration::from_secs(5), closed_rx.recv())
            .await
            .expect("drain never noticed the close")
            .expect("channel closed");
    }
}
