use anyhow::{Result, anyhow};
use std::{error::Error as StdError, future::Future, time::Duration};
use tokio::time::timeout;

/// Awaits an outbound connection attempt, bounded by `limit` when one is configured.
pub async fn dial<F, T, E>(limit: Option<Duration>, connect: F) -> Result<T>
where
    F: Future<Output = Result<T, E>>,
    E: StdError + Send + Sync + 'static,
{
    let connected = match limit {
        Some(limit) => timeout(limit, connect)
            .await
            .map_err(|_| anyhow!("Dial timed out after {limit:?}"))?,
        None => connect.await,
    };
    Ok(connected?)
}
