use anyhow::Result;
use mysql_ws_tunnel::{RemoteConfig, config::DEFAULT_REMOTE_CONFIG, logging, remote};
use std::{env, path::PathBuf};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_REMOTE_CONFIG), PathBuf::from);

    let config = RemoteConfig::load(&config_path)?;
    logging::init(&config.log_path)?;

    info!(
        config_file = %config_path.display(),
        listen_addr = %config.listen_address,
        target_addr = %config.mysql_server_address,
        ws_path = %config.ws_path,
        tls = config.tls.is_some(),
        log_path = %config.log_path.display(),
        "Configuration loaded"
    );

    if let Err(e) = remote::run(config).await {
        error!(error = %format!("{e:#}"), "Remote bridge stopped");
        return Err(e);
    }
    Ok(())
}
