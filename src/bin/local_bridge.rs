use anyhow::Result;
use mysql_ws_tunnel::{LocalConfig, config::DEFAULT_LOCAL_CONFIG, local, logging};
use std::{env, path::PathBuf};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_LOCAL_CONFIG), PathBuf::from);

    let config = LocalConfig::load(&config_path)?;
    logging::init(&config.log_path)?;

    info!(
        config_file = %config_path.display(),
        listen_addr = %config.local_listen_address,
        server_ws_url = %config.server_ws_url,
        log_path = %config.log_path.display(),
        "Configuration loaded"
    );

    if let Err(e) = local::run(config).await {
        error!(error = %format!("{e:#}"), "Local bridge stopped");
        return Err(e);
    }
    Ok(())
}
