use anyhow::{Context, Result};
use std::time::Duration;
use tokio::signal;

mod stock_logic;
use lib_feed::StockFeedClient;
use stock_logic::{config, logger};

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();
    dotenvy::dotenv().ok();

    let config = config::load_config();
    logger::setup_logging(&config.log_dir(), config.log_level())?;

    let client = StockFeedClient::with_websocket(config.feed_config()).context("cannot start stock feed client")?;

    client.on_update(|quote| {
        log::info!(
            "{} {} {:+} ({:+.2}%)",
            quote.stock_code,
            quote.current_price,
            quote.change_price,
            quote.change_rate
        );
    });

    if config.codes.is_empty() {
        log::warn!("No stock codes given; connecting without subscriptions.");
    }
    client.subscribe(config.codes.iter().cloned()).await;
    client.connect().await;

    let mut status_ticker = tokio::time::interval(Duration::from_secs(config.status_interval_seconds()));
    status_ticker.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = status_ticker.tick() => {
                let status = client.status();
                log::info!(
                    "Status: {:?}, producing={}, topics {}/{} acknowledged, {} cached, {} pings{}",
                    status.connection,
                    status.producing,
                    status.acknowledged,
                    status.desired,
                    status.cached,
                    status.pings_sent,
                    status.last_error.as_ref().map(|e| format!(", last error: {}", e)).unwrap_or_default()
                );
            }
        }
    }

    client.disconnect().await;
    log::info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut term_signal = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(term_signal) => term_signal,
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {}", e);
                let _ = signal::ctrl_c().await;
                log::info!("Ctrl-C received, initiating shutdown.");
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => log::info!("Ctrl-C received, initiating shutdown."),
            _ = term_signal.recv() => log::info!("SIGTERM received, initiating shutdown."),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        log::info!("Ctrl-C received, initiating shutdown.");
    }
}
