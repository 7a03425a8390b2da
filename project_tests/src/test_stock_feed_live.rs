//! # Live Stock Feed Runner
//!
//! Connects `StockFeedClient` to a real feed server, subscribes to the given
//! codes and prints update throughput and client status every report
//! interval. Useful for checking a deployment by eye; it is not part of the
//! automated suite.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use clap::Parser;
use lib_feed::{FeedConfig, StockFeedClient};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Origin of the feed server
    #[clap(short, long, default_value = "http://localhost:8080")]
    base_url: String,

    /// Report interval in seconds
    #[clap(short, long, default_value_t = 30)]
    report_interval_seconds: u64,

    /// Stock codes to subscribe to
    #[clap(default_values_t = ["005930".to_string(), "000660".to_string(), "035420".to_string()])]
    codes: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}] {}",
                chrono::Local::now().format("[%H:%M:%S%.3f]"),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stdout())
        .apply()?;

    let config = FeedConfig { base_url: args.base_url.clone(), ..FeedConfig::default() };
    let client = StockFeedClient::with_websocket(config)?;

    let counts: Arc<Mutex<HashMap<String, u64>>> = Arc::new(Mutex::new(HashMap::new()));
    let sink = Arc::clone(&counts);
    client.on_update(move |quote| {
        *sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(quote.stock_code.clone())
            .or_default() += 1;
    });

    client.subscribe(args.codes.iter().cloned()).await;
    client.connect().await;

    let mut ticker = tokio::time::interval(Duration::from_secs(args.report_interval_seconds.max(1)));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let snapshot = std::mem::take(&mut *counts.lock().unwrap_or_else(PoisonError::into_inner));
                let total: u64 = snapshot.values().sum();
                println!("--- {:?} ---", client.status());
                println!("{} changed quotes in the last {}s", total, args.report_interval_seconds);
                let mut rows: Vec<_> = snapshot.into_iter().collect();
                rows.sort();
                for (code, count) in rows {
                    let price = client
                        .get_topic_data(&code)
                        .map(|cached| cached.quote.current_price.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("  {:<10} {:>6} updates, last {}", code, count, price);
                }
            }
        }
    }

    client.disconnect().await;
    Ok(())
}
