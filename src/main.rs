//! `imgcache-proxy`: an HTTP forward proxy that caches images on disk with a
//! fixed time-to-live.
//!
//! Point clients at it as their HTTP proxy. Image `GET`s are answered from
//! the cache while fresh; everything else is forwarded untouched. Post
//! `{"type":"CLEANUP_CACHE"}` to `/__imgcache/message` to sweep on demand.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use imgcache::cache::{DiskStorage, Engine};
use imgcache::config::{LogFormat, ProxyConfig};
use imgcache::fetch::{Fetcher, HttpFetcher};
use imgcache::host::Host;
use imgcache::http::Request;
use imgcache::proxy::Proxy;
use imgcache::server::Server;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

async fn run(config: ProxyConfig) -> Result<()> {
    let mut http = HttpFetcher::new().max_response_bytes(config.max_response_bytes);
    if let Some(timeout) = config.fetch_timeout() {
        http = http.timeout(timeout);
    }
    let fetcher: Arc<dyn Fetcher> = Arc::new(http);

    let engine = Engine::new(
        config.engine(),
        Arc::new(DiskStorage::new(&config.storage_dir)),
        Arc::clone(&fetcher),
    );
    let host = Arc::new(
        Host::start(Arc::new(engine), config.host())
            .await
            .context("failed to start cache engine")?,
    );

    let server = Server::bind(&config.listen_addr)
        .await
        .context("failed to start proxy listener")?;

    let proxy = Arc::new(Proxy::new(Arc::clone(&host), fetcher));
    let serve = server.run(move |request: Request| {
        let proxy = Arc::clone(&proxy);
        async move { proxy.handle(request).await }
    });

    tokio::select! {
        result = serve => result.context("proxy listener failed")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            tracing::info!("shutdown requested");
        }
    }

    host.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ProxyConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("imgcache-proxy: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_format);

    tracing::info!(
        listen = %config.listen_addr,
        storage = %config.storage_dir.display(),
        store = %config.store_name,
        "starting imgcache-proxy"
    );

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "imgcache-proxy failed");
            ExitCode::FAILURE
        }
    }
}
