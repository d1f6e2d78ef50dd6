use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use masa_client::{MasaClient, TracingObserver};
use xposts_relay::scheduler::AccountLoops;
use xposts_relay::{notify, AccountWatcher, Config, CycleScheduler, JobSource, MasaSource};

const DEFAULT_LOG_FILTER: &str = "relay=info,xposts_relay=info,masa_client=info";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("X posts relay starting...");

    // Load config; anything missing is fatal before a single cycle runs
    let config = Config::from_env()?;
    config.log_redacted();

    let client = MasaClient::new(
        &config.search.base_url,
        &config.api_key,
        config.timing.request_timeout,
    )?
    .with_search_path(&config.search.search_path)
    .with_observer(Arc::new(TracingObserver));
    let source: Arc<dyn JobSource> =
        Arc::new(MasaSource::new(client, config.search.shape.clone()));

    let notifier = notify::connect(&config.sink, config.timing.request_timeout).await?;

    // One independent loop per account
    let mut loops = AccountLoops::new();
    for account in &config.accounts {
        let watcher = AccountWatcher::new(
            account.clone(),
            config.search.max_results,
            config.timing.poll.clone(),
            config.log_format,
            source.clone(),
            notifier.clone(),
        );
        loops.spawn(CycleScheduler::new(
            watcher,
            config.timing.retry.clone(),
            config.timing.cycle_delay,
        ));
    }
    info!(accounts = loops.len(), "Account loops started");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            exit = loops.next_exit() => {
                if exit.is_none() {
                    error!("No account loops left running");
                    break;
                }
            }
        }
    }
    loops.shutdown().await;

    Ok(())
}
