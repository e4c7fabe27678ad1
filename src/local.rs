//! Local bridge: accepts plain TCP and carries each connection over its own
//! outbound WebSocket.

use anyhow::{Context, Result};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};

use crate::config::LocalConfig;
use crate::dial::dial;
use crate::relay::{Relay, Termination};

pub async fn run(config: LocalConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.local_listen_address)
        .await
        .with_context(|| format!("Failed to bind to address {}", config.local_listen_address))?;

    info!(
        listen_addr = %config.local_listen_address,
        server_ws_url = %config.server_ws_url,
        "Local bridge listening"
    );

    serve(listener, Arc::new(config)).await;
    Ok(())
}

/// Accepts TCP connections forever, running each tunnel session in its own task.
pub async fn serve(listener: TcpListener, config: Arc<LocalConfig>) {
    let mut sessions: u64 = 0;

    loop {
        match listener.accept().await {
            Ok((stream, client_addr)) => {
                sessions += 1;
                let session = sessions;
                let config = Arc::clone(&config);

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, client_addr, session, &config).await
                    {
                        error!(
                            session,
                            client_addr = %client_addr,
                            error = %format!("{e:#}"),
                            "Session failed"
                        );
                    }
                });
            }
            Err(e) => warn!(error = %e, "Failed to accept TCP connection"),
        }
    }
}

#[tracing::instrument(name = "session", skip_all, fields(id = session, client_addr = %client_addr))]
async fn handle_connection(
    tcp: TcpStream,
    client_addr: SocketAddr,
    session: u64,
    config: &LocalConfig,
) -> Result<Termination> {
    info!("Accepted local connection");

    // On failure `tcp` is dropped here, which closes the client's connection.
    let (websocket, response) = dial(
        config.dial_timeout(),
        connect_async(config.server_ws_url.as_str()),
    )
    .await
    .with_context(|| format!("Failed to connect to WebSocket server {}", config.server_ws_url))?;

    info!(status = %response.status(), "Connected to WebSocket server");

    Ok(Relay::new(tcp, websocket).run().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        TEST_TIMEOUT, serve_websocket_echo, start_local_bridge, start_websocket_echo_server,
        unused_addr,
    };
    use futures_util::StreamExt;
    use std::time::Duration;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        sync::oneshot,
        time::{sleep, timeout},
    };
    use tokio_tungstenite::accept_async;

    async fn echo_round_trip(client: &mut TcpStream, data: &[u8]) -> Vec<u8> {
        client.write_all(data).await.unwrap();
        let mut buf = vec![0u8; data.len()];
        timeout(TEST_TIMEOUT, client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn relays_tcp_through_websocket() {
        let ws_addr = start_websocket_echo_server().await;
        let bridge = start_local_bridge(format!("ws://{ws_addr}/mysql")).await;

        let mut client = TcpStream::connect(bridge).await.unwrap();

        assert_eq!(echo_round_trip(&mut client, b"SELECT 1").await, b"SELECT 1");
        assert_eq!(echo_round_trip(&mut client, &[0u8; 20_000]).await, vec![0u8; 20_000]);
    }

    #[tokio::test]
    async fn failed_dial_closes_client_and_keeps_accepting() {
        let ws_addr = unused_addr().await;
        let bridge = start_local_bridge(format!("ws://{ws_addr}/mysql")).await;

        let mut first = TcpStream::connect(bridge).await.unwrap();
        let mut buf = [0u8; 1];
        let read = timeout(TEST_TIMEOUT, first.read(&mut buf)).await.unwrap();
        assert!(matches!(read, Ok(0) | Err(_)));

        // Bring the WebSocket server up on the address that just refused us.
        let listener = TcpListener::bind(ws_addr).await.unwrap();
        serve_websocket_echo(listener);

        let mut second = TcpStream::connect(bridge).await.unwrap();
        assert_eq!(echo_round_trip(&mut second, b"retry").await, b"retry");
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let ws_addr = start_websocket_echo_server().await;
        let bridge = start_local_bridge(format!("ws://{ws_addr}/mysql")).await;

        let mut a = TcpStream::connect(bridge).await.unwrap();
        let mut b = TcpStream::connect(bridge).await.unwrap();
        assert_eq!(echo_round_trip(&mut a, b"from a").await, b"from a");
        assert_eq!(echo_round_trip(&mut b, b"from b").await, b"from b");

        drop(a);

        for i in 0..3 {
            let data = format!("b again {i}");
            assert_eq!(echo_round_trip(&mut b, data.as_bytes()).await, data.as_bytes());
        }
    }

    #[tokio::test]
    async fn client_close_ends_websocket_session() {
        let (closed_tx, closed_rx) = oneshot::channel();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut websocket = accept_async(stream).await.unwrap();
            let mut saw_close = false;
            while let Some(Ok(message)) = websocket.next().await {
                if message.is_close() {
                    saw_close = true;
                    break;
                }
            }
            let _ = closed_tx.send(saw_close);
        });
        let bridge = start_local_bridge(format!("ws://{ws_addr}/mysql")).await;

        let client = TcpStream::connect(bridge).await.unwrap();
        // Wait for the WebSocket leg to be established before hanging up.
        sleep(Duration::from_millis(200)).await;
        drop(client);

        let saw_close = timeout(TEST_TIMEOUT, closed_rx).await.unwrap().unwrap();
        assert!(saw_close);
    }
}
