//! CLI entry point for the idfetch tool.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use idfetch_core::{
    Backlog, ClientSettings, Classifier, DownloadEngine, EngineOptions, HttpClient,
    HttpMetadataResolver, ResumableTransfer, RetryPolicy, RunConfig, TagDump, ThrottleMonitor,
    TransferOptions,
};
use idfetch_core::download::filename::prefilter_stored;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > --log-level > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.log_level.as_filter()));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let config = RunConfig::from_input(args.into_config_input()).context("invalid configuration")?;
    config.log_notes();

    let ids = if config.continue_mode {
        config.ids.clone()
    } else {
        let (remaining, removed) = prefilter_stored(
            &config.ids,
            &config.base,
            &config.global.quality,
            config.naming,
            &config.prefix,
        )
        .context("cannot build stored-file pattern")?;
        if remaining.is_empty() {
            bail!("all {removed} items already exist, aborted");
        }
        if removed > 0 {
            info!(removed, "skipping items already stored");
        }
        remaining
    };
    info!(
        items = ids.len(),
        filtered_out = config.ids.len() - ids.len(),
        path = %config.base.display(),
        "idfetch starting"
    );

    let settings = ClientSettings {
        proxy: config.proxy.clone(),
        timeout: config.timeout,
        ..ClientSettings::default()
    };
    let client = HttpClient::new(&settings).context("cannot build HTTP client")?;
    let resolver = HttpMetadataResolver::new(config.endpoint.clone(), &settings)
        .context("cannot build metadata resolver")?;

    let transfer = ResumableTransfer::new(
        client,
        RetryPolicy::default(),
        ThrottleMonitor::new(config.throttle_floor),
        TransferOptions {
            base: config.base.clone(),
            mode: config.mode,
            continue_mode: config.continue_mode,
            keep_unfinished: config.keep_unfinished,
            naming: config.naming,
            prefix: config.prefix.clone(),
        },
    );
    let classifier = Classifier::new(config.global.clone(), config.scenario.clone());
    let engine = DownloadEngine::new(
        EngineOptions {
            concurrency: config.concurrency,
            queue_capacity: config.queue_capacity,
            ..EngineOptions::default()
        },
        Arc::new(resolver),
        classifier,
        transfer,
    )?;

    let interrupt = engine.interrupt_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            interrupt.cancel();
        }
    });

    let backlog = Backlog::from_ids(ids, &config.global.quality);
    let report = engine.run(backlog).await;
    report.log_summary();

    if config.dump_tags {
        let mut dump = TagDump::new(config.prefix.as_str());
        dump.extend(&report.items);
        if let Err(e) = dump.save(&config.base) {
            warn!(error = %e, "unable to save tags");
        }
    }

    Ok(())
}
