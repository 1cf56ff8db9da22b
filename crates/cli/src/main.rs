//! reqcache command-line entry point.
//!
//! Runs one cached JSON request against a SQLite-backed cache and prints each
//! delivered value on stdout. Logging goes to stderr so output stays pipeable.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use reqcache_client::{
    CacheOptions, Delivery, FetchConfig, HttpFetcher, JsonQuery, RequestCache, RequestOptions, RetryOptions,
    canonical_request, initialize_cache, retry,
};
use reqcache_core::{AppConfig, CacheDb};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod args;

use args::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let mut config = AppConfig::load().context("loading configuration")?;
    cli.apply(&mut config);
    config.validate().context("validating command-line flags")?;

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache database {}", config.db_path.display()))?;
    let handles = initialize_cache(Arc::new(db), CacheOptions::from(&config)).await?;
    let cache = RequestCache::new(handles);

    let fetcher = HttpFetcher::new(FetchConfig::from(&config))?;
    let method = cli.method.clone();
    let body = cli.body.clone();
    let query = JsonQuery::<String, Value>::new(fetcher, move |url: &String| {
        let request = canonical_request(&method, url)?;
        Ok(match &body {
            Some(body) => request.with_body(body.clone()),
            None => request,
        })
    });
    let cached = cache.cache(Arc::new(query), RequestOptions::new().with_cache_method(config.cache_method));

    let signal = CancellationToken::new();
    let on_interrupt = signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    tracing::info!(url = %cli.url, cache_method = %config.cache_method, "running cached request");

    let options = RequestOptions::new().with_signal(signal);
    let result = retry(
        || cached.call(cli.url.clone(), options.clone()).subscribe(print_delivery),
        RetryOptions::max_retries(cli.retries.max(1)),
    )
    .await;

    // Let background cache writes land before the runtime shuts down.
    cache.settle().await;

    result?;
    Ok(())
}

fn print_delivery(delivery: Delivery<Value>) {
    let label = if delivery.stale { "stale" } else { "fresh" };
    let value = serde_json::to_string_pretty(&delivery.value).unwrap_or_else(|_| delivery.value.to_string());
    println!("[{label}] {value}");
}
