//! Runs the bridge server until interrupted.

use std::sync::Arc;
use std::time::Duration;

use relaychat_bridge::{BridgeServer, StatsSnapshot};

use crate::config::Config;

/// Runs the bridge until Ctrl+C or a fatal server error.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let server = BridgeServer::new(config.server_config());
    let server_run = Arc::clone(&server);
    let mut server_task = tokio::spawn(async move { server_run.run().await });

    let mut ticker = (config.stats_interval_secs > 0).then(|| {
        let period = Duration::from_secs(config.stats_interval_secs);
        tokio::time::interval_at(tokio::time::Instant::now() + period, period)
    });

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl+C, shutting down");
                break;
            }

            result = &mut server_task => {
                log_stats("final", server.stats());
                return match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.into()),
                    Err(e) => Err(e.into()),
                };
            }

            _ = async {
                match ticker.as_mut() {
                    Some(t) => {
                        t.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => {
                log_stats("periodic", server.stats());
            }
        }
    }

    server.shutdown();
    if let Ok(Err(e)) = server_task.await {
        tracing::error!("server error during shutdown: {e}");
    }
    log_stats("final", server.stats());
    Ok(())
}

fn log_stats(kind: &str, stats: StatsSnapshot) {
    tracing::info!(
        pairs_opened = stats.pairs_opened,
        pairs_active = stats.pairs_active,
        frames_to_backend = stats.frames_to_backend,
        frames_to_client = stats.frames_to_client,
        backend_connect_failures = stats.backend_connect_failures,
        "{kind} bridge stats"
    );
}
