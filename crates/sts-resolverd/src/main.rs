//! MTA-STS policy resolution daemon.
//!
//! CLI surface and top-level wiring follow `tsa-daemon::main`: a `clap`
//! derive `Opt`, logging initialized first thing, then a multi-threaded
//! Tokio runtime driving the accept loop to completion.

mod config;
mod connection;
mod logging;
mod server;
mod shutdown;
mod zones;

use clap::Parser;
use config::{Config, LogFormat};
use connection::AppState;
use dns_resolver::HickoryResolver;
use logging::LoggingConfig;
use mta_sts::ReqwestGetter;
use shutdown::LifeCycle;
use std::path::PathBuf;
use std::sync::Arc;
use zones::ZoneRegistry;

/// MTA-STS policy resolution daemon.
#[derive(Debug, Parser)]
#[command(about, version)]
struct Opt {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "/opt/sts-resolverd/etc/sts-resolverd.yaml")]
    config: PathBuf,

    /// Directory where diagnostic log files will be placed.
    ///
    /// If omitted, diagnostics print to stderr.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// How diagnostic logs render.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

fn main() -> anyhow::Result<()> {
    let opts = Opt::parse();

    // Config parse failure is fatal at startup; let it propagate through
    // `?` to a non-zero exit, same as the `config::load_config` call in
    // `tsa-daemon::main`.
    let config = Config::load(&opts.config)?;

    LoggingConfig {
        log_dir: opts.log_dir.clone().or_else(|| config.log.dir.clone()),
        format: opts.log_format.unwrap_or(config.log.format),
        filter: config.log.filter.clone(),
    }
    .init()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let resolver = HickoryResolver::new()
        .map_err(|err| anyhow::anyhow!("failed to construct DNS resolver: {err}"))?;
    let getter = ReqwestGetter::new()?;

    let state = Arc::new(AppState {
        cache: sts_cache::Cache::new(config.cache.options.cache_size),
        zones: ZoneRegistry::from_config(&config),
        resolver: Arc::new(resolver),
        getter: Arc::new(getter),
    });

    // Bind before spawning anything: a bind failure must abort the
    // process with a non-zero exit code, not merely log.
    let listener = server::bind(&config.host, config.port).await?;

    let mut life_cycle = LifeCycle::new();

    let accept_loop = tokio::spawn(async move {
        if let Err(err) = server::serve(listener, state).await {
            tracing::error!(%err, "listener exited with an error");
        }
    });

    life_cycle.wait_for_shutdown().await;
    accept_loop.await.ok();

    Ok(())
}
