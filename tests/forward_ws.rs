//! End-to-end forwarding: PTY output through the framing pipeline into a
//! WebSocket server, the way the viewer service receives it.
//!
//! The server here is plain `ws://`, i.e. the dev-mode path. The production
//! `wss://` endpoint needs the rustls backend compiled into
//! tokio-tungstenite and is only covered manually.

use futures::{SinkExt, StreamExt};
use screenrun::pty::PtyPair;
use screenrun::{forward, viewer};
use std::io::Write;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

fn i32_at(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

/// One-connection viewer stand-in: sends the ready message, then relays
/// every binary frame it receives into `frame_tx`.
async fn spawn_viewer_server(frame_tx: mpsc::Sender<Vec<u8>>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &tokio_tungstenite::tungstenite::handshake::server::Request,
             mut resp: tokio_tungstenite::tungstenite::handshake::server::Response| {
                if let Some(protocol) = req.headers().get("sec-websocket-protocol") {
                    resp.headers_mut()
                        .insert("sec-websocket-protocol", protocol.clone());
                }
                Ok(resp)
            },
        )
        .await
        .unwrap();
        let (mut sink, mut rx) = ws.split();
        sink.send(Message::text("ready")).await.unwrap();

        while let Some(Ok(message)) = rx.next().await {
            if let Message::Binary(data) = message {
                if frame_tx.send(data.to_vec()).await.is_err() {
                    break;
                }
            }
        }
    });

    addr
}

#[tokio::test]
async fn pty_output_arrives_as_framed_binary_messages() {
    let (server_frame_tx, mut server_frame_rx) = mpsc::channel(16);
    let addr = spawn_viewer_server(server_frame_tx).await;

    let mut ws = viewer::connect(&format!("ws://{addr}/tty?id=TEST"))
        .await
        .unwrap();
    viewer::wait_ready(&mut ws).await.unwrap();
    let (sink, _stream) = ws.split();

    let pair = PtyPair::open(50, 132).unwrap();
    let (controller, follower, _path) = pair.into_parts();

    let (frame_tx, frame_rx) = mpsc::channel(64);
    let _reader = forward::spawn_reader(controller.as_raw_fd(), Instant::now(), frame_tx);
    let _writer = forward::spawn_writer(sink, frame_rx);

    // No newline in the payload: the pty's output processing would expand it.
    let mut follower_file = std::fs::File::from(follower);
    follower_file.write_all(b"hello!!").unwrap();
    follower_file.flush().unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), server_frame_rx.recv())
        .await
        .expect("no frame arrived")
        .expect("server went away");

    assert_eq!(frame.len(), forward::HEADER_LEN + 7);
    assert_eq!(i32_at(&frame, 8), 7);
    assert_eq!(&frame[12..], b"hello!!");
    // The first chunk arrived quickly, so the seconds word is still zero.
    assert_eq!(i32_at(&frame, 0), 0);

    // A second chunk is delivered in order, in its own frame.
    follower_file.write_all(b"again").unwrap();
    follower_file.flush().unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), server_frame_rx.recv())
        .await
        .expect("no second frame")
        .expect("server went away");
    assert_eq!(i32_at(&frame, 8), 5);
    assert_eq!(&frame[12..], b"again");

    drop(controller);
}
