//! Tracing setup with a live-adjustable filter.
//!
//! The `log_level` setting (0 off, 1 basic, 2 debug) swaps the `EnvFilter`
//! through a reload layer, so a command from the control channel changes
//! verbosity without a restart.

use std::path::Path;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use crate::engine::{EngineEvent, EngineHandle};
use crate::model::LogLevel;

/// Keeps the filter handle and the file writer alive.
pub struct LogControl {
    filter: reload::Handle<EnvFilter, Registry>,
    /// Whether `RUST_LOG` was set at startup.
    env_override: bool,
    _file_guard: Option<WorkerGuard>,
}

impl LogControl {
    /// Install the global subscriber: stderr always, plus a daily rolling
    /// file under `log_dir` when given.
    pub fn init(log_dir: Option<&Path>) -> Self {
        let env_override = std::env::var("RUST_LOG").is_ok();
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let (filter, handle) = reload::Layer::new(filter);

        let (file_layer, guard) = match log_dir {
            Some(dir) => {
                let appender = tracing_appender::rolling::daily(dir, "message-finder.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer().with_writer(writer).with_ansi(false);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .with(file_layer)
            .init();

        Self {
            filter: handle,
            env_override,
            _file_guard: guard,
        }
    }

    /// Apply the persisted level at startup, unless `RUST_LOG` takes precedence.
    pub fn apply_initial(&self, level: LogLevel) {
        if !self.env_override {
            self.apply(level);
        }
    }

    pub fn apply(&self, level: LogLevel) {
        apply_level(&self.filter, level);
    }

    /// Follow `settings_updated` events for the rest of the process.
    pub fn follow(&self, engine: &EngineHandle) -> JoinHandle<()> {
        let handle = self.filter.clone();
        let mut rx = engine.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(EngineEvent::SettingsUpdated { settings }) => {
                        apply_level(&handle, settings.log_level)
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

fn apply_level(handle: &reload::Handle<EnvFilter, Registry>, level: LogLevel) {
    let directive = level.filter_directive();
    if let Err(e) = handle.reload(EnvFilter::new(directive)) {
        eprintln!("Failed to apply log level {directive}: {e}");
    }
}
