//! Remote bridge: accepts WebSocket upgrades on a single path and carries each
//! one to its own TCP connection with the target server.

use anyhow::{Context, Result};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tracing::{debug, error, info, warn};

use crate::client_ip::parse_original_client_ip;
use crate::config::RemoteConfig;
use crate::dial::dial;
use crate::relay::{Relay, Termination};
use crate::stream::InboundStream;
use crate::tls::build_acceptor;

pub async fn run(config: RemoteConfig) -> Result<()> {
    let tls = config.tls.as_ref().map(build_acceptor).transpose()?;

    let listener = TcpListener::bind(&config.listen_address)
        .await
        .with_context(|| format!("Failed to bind to address {}", config.listen_address))?;

    info!(
        listen_addr = %config.listen_address,
        ws_path = %config.ws_path,
        target_addr = %config.mysql_server_address,
        tls = tls.is_some(),
        "Remote bridge listening"
    );

    serve(listener, Arc::new(config), tls).await;
    Ok(())
}

/// Accepts connections forever, upgrading and relaying each one in its own task.
pub async fn serve(listener: TcpListener, config: Arc<RemoteConfig>, tls: Option<TlsAcceptor>) {
    let mut sessions: u64 = 0;

    loop {
        match listener.accept().await {
            Ok((stream, client_addr)) => {
                sessions += 1;
                let session = sessions;
                let config = Arc::clone(&config);
                let tls = tls.clone();

                tokio::spawn(async move {
                    let result = match InboundStream::accept(stream, tls.as_ref()).await {
                        Ok(stream) => {
                            handle_connection(stream, client_addr, session, &config).await
                        }
                        Err(e) => Err(e),
                    };
                    if let Err(e) = result {
                        error!(
                            session,
                            client_addr = %client_addr,
                            error = %format!("{e:#}"),
                            "Session failed"
                        );
                    }
                });
            }
            Err(e) => warn!(error = %e, "Failed to accept connection"),
        }
    }
}

fn not_found(path: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(format!("No WebSocket endpoint at {path}")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

#[tracing::instrument(name = "session", skip_all, fields(id = session, client_addr = %client_addr))]
async fn handle_connection(
    stream: InboundStream,
    client_addr: SocketAddr,
    session: u64,
    config: &RemoteConfig,
) -> Result<Termination> {
    let tls = stream.is_tls();
    let expected_path = config.ws_path.as_str();
    let mut forwarded_for = None;

    // Any origin is accepted; only the request path is checked.
    let mut websocket = accept_hdr_async(stream, |request: &Request, response: Response| {
        let path = request.uri().path();
        if path != expected_path {
            return Err(not_found(path));
        }
        forwarded_for = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_original_client_ip);
        Ok(response)
    })
    .await
    .context("Failed to perform WebSocket handshake")?;

    match forwarded_for {
        Some(ip) => info!(client_ip = %ip, tls, "WebSocket client connected"),
        None => info!(tls, "WebSocket client connected"),
    }

    let target_addr = config.mysql_server_address.as_str();
    debug!(target_addr = %target_addr, "Attempting to connect to target server");

    let tcp = match dial(config.dial_timeout(), TcpStream::connect(target_addr)).await {
        Ok(tcp) => tcp,
        Err(e) => {
            let frame = CloseFrame {
                code: CloseCode::Error,
                reason: "target unavailable".to_string().into(),
            };
            if let Err(close_err) = websocket.close(Some(frame)).await {
                debug!(error = %close_err, "Failed to close WebSocket after dial failure");
            }
            return Err(e.context(format!("Failed to connect to target {target_addr}")));
        }
    };

    info!(target_addr = %target_addr, "Connected to target server");

    Ok(Relay::new(tcp, websocket).run().await)
}
