use clap::Parser;
use imgrelay::cache::MemoryCache;
use imgrelay::config::Config;
use imgrelay::origin::S3Store;
use imgrelay::server::{self, AppContext};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(config).await {
        error!(%err, "fatal error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let listen_addr: SocketAddr = config.listen_addr.parse()?;

    let cache = Arc::new(if config.cache_filename.is_empty() {
        MemoryCache::new(config.max_cached_images_count, config.max_cache_size_mb)
    } else {
        MemoryCache::open(
            config.max_cached_images_count,
            config.max_cache_size_mb,
            &config.cache_filename,
        )?
    });
    let store = Arc::new(S3Store::new(&config));

    let context = Arc::new(AppContext::new(&config, cache.clone(), store));
    let app = server::router(context).into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(%listen_addr, bucket = %config.s3_bucket, "imgrelay listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if !config.cache_filename.is_empty() {
        cache.save_snapshot(&config.cache_filename)?;
    }
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
}
