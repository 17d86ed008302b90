//! Log output setup.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, reload};

/// Switches the log level at runtime.
#[derive(Clone)]
pub struct LogControl {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogControl {
    pub fn set_debug(&self, on: bool) {
        let level = if on { "debug" } else { "info" };
        if let Err(e) = self.handle.reload(EnvFilter::new(level)) {
            tracing::warn!("log level {}: {}", level, e);
            return;
        }
        tracing::info!("log level {}", level);
    }
}

/// Installs the global subscriber. Logs go to stdout or are appended to
/// `log_file`. `RUST_LOG` overrides the initial level.
pub fn init(debug: bool, stdout: bool, log_file: &Path) -> anyhow::Result<LogControl> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));
    let (filter, handle) = reload::Layer::new(filter);

    let writer = if stdout {
        BoxMakeWriter::new(std::io::stdout)
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .with_context(|| format!("open log file {}", log_file.display()))?;
        BoxMakeWriter::new(Mutex::new(file))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(stdout)
                .with_target(false),
        )
        .try_init()
        .context("install log subscriber")?;

    Ok(LogControl { handle })
}
