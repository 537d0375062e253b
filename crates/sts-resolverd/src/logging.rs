//! Structured logging setup, trimmed from
//! `kumo-server-common::diagnostic_logging`: the reloadable-filter handle
//! and the metrics/console-subscriber layers are dropped (this daemon
//! carries no metrics pipeline), but the format selection, env-filter, and
//! optional rolling file writer are kept as-is.

use crate::config::LogFormat;
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const FILTER_ENV_VAR: &str = "STS_RESOLVERD_LOG";
const DEFAULT_FILTER: &str = "sts_resolverd=info,mta_sts=info,sts_cache=info";

pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
    pub format: LogFormat,
    pub filter: Option<String>,
}

impl LoggingConfig {
    /// Must be called exactly once, before any other part of the daemon
    /// logs anything.
    pub fn init(&self) -> anyhow::Result<()> {
        let (non_blocking, _guard);
        let log_writer = if let Some(log_dir) = &self.log_dir {
            let file_appender = tracing_appender::rolling::hourly(log_dir, "sts-resolverd.log");
            (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
            // Leaking the guard keeps the background flush worker alive for
            // the lifetime of the process.
            Box::leak(Box::new(_guard));
            BoxMakeWriter::new(non_blocking)
        } else {
            BoxMakeWriter::new(std::io::stderr)
        };

        let layer = fmt::layer().with_thread_names(true).with_writer(log_writer);
        let layer = match self.format {
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Full => layer.boxed(),
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Json => layer.json().boxed(),
        };

        let filter_source = self
            .filter
            .clone()
            .or_else(|| std::env::var(FILTER_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let env_filter = EnvFilter::try_new(filter_source)?;

        tracing_subscriber::registry()
            .with(layer.with_filter(env_filter))
            .init();
        Ok(())
    }
}
