use anyhow::{Context, Result, bail};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, private_key};
use std::{fs::File, io::BufReader, path::Path, sync::Arc};
use tokio_rustls::{TlsAcceptor, rustls::ServerConfig};

use crate::config::TlsConfig;

/// Builds the acceptor used to terminate TLS in front of the WebSocket upgrade.
pub fn build_acceptor(tls_config: &TlsConfig) -> Result<TlsAcceptor> {
    let cert_chain = load_certificates(&tls_config.cert_file)?;
    let private_key = load_private_key(&tls_config.key_file)?;

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .context("Failed to create TLS server config")?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open certificate file: {}", path.display()))?;
    let chain = certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse certificate file: {}", path.display()))?;

    if chain.is_empty() {
        bail!("No certificates found in {}", path.display());
    }
    Ok(chain)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open private key file: {}", path.display()))?;
    private_key(&mut BufReader::new(file))
        .with_context(|| format!("Failed to parse private key file: {}", path.display()))?
        .with_context(|| format!("No private key found in {}", path.display()))
}
