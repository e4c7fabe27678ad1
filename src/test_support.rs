use futures_util::{SinkExt, Stream, StreamExt};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex},
    net::TcpListener,
    time::timeout,
};
use tokio_tungstenite::{
    WebSocketStream, accept_async,
    tungstenite::{Error as WsError, Message, protocol::Role},
};

use crate::config::{DEFAULT_WS_PATH, LocalConfig, RemoteConfig};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);
pub const PIPE_CAPACITY: usize = 64 * 1024;

/// Returns a connected (client, server) WebSocket pair over an in-memory pipe.
pub async fn websocket_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
    let (client_io, server_io) = duplex(PIPE_CAPACITY);
    let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
    let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
    (client, server)
}

pub async fn next_message<St>(stream: &mut St) -> Message
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    timeout(TEST_TIMEOUT, stream.next())
        .await
        .expect("timed out waiting for a WebSocket message")
        .expect("WebSocket stream ended")
        .expect("WebSocket error")
}

/// An address nothing is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// TCP server echoing every byte back on each accepted connection.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buffer = [0; 4096];
                loop {
                    match stream.read(&mut buffer).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) if stream.write_all(&buffer[..n]).await.is_err() => break,
                        Ok(_) => {}
                    }
                }
            });
        }
    });

    addr
}

/// WebSocket server on `listener` echoing every binary message back.
pub fn serve_websocket_echo(listener: TcpListener) {
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut websocket) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = websocket.next().await {
                    if message.is_binary() && websocket.send(message).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
}

pub async fn start_websocket_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    serve_websocket_echo(listener);
    addr
}

pub async fn start_local_bridge(server_ws_url: String) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = LocalConfig {
        local_listen_address: addr.to_string(),
        server_ws_url,
        log_path: "local-bridge-test.log".into(),
        dial_timeout_secs: Some(1),
    };
    tokio::spawn(crate::local::serve(listener, Arc::new(config)));
    addr
}

pub async fn start_remote_bridge(target: SocketAddr) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = RemoteConfig {
        listen_address: addr.to_string(),
        mysql_server_address: target.to_string(),
        log_path: "remote-bridge-test.log".into(),
        ws_path: DEFAULT_WS_PATH.to_string(),
        dial_timeout_secs: Some(1),
        tls: None,
    };
    tokio::spawn(crate::remote::serve(listener, Arc::new(config), None));
    addr
}
