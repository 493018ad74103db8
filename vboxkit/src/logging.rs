//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events. Embedding applications
//! that do not install their own subscriber can call [`init_logging`].

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vboxkit_shared::errors::{VboxError, VboxResult};

/// Primary filter variable; `RUST_LOG` is consulted when it is unset.
pub const LOG_ENV: &str = "VBOXKIT_LOG";

static INITIALIZED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Directive used when neither environment variable is set.
    pub default_directive: String,
    /// Also write a daily-rolling file here.
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
    pub ansi: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            log_dir: None,
            file_prefix: "vboxkit.log".to_string(),
            ansi: true,
        }
    }
}

/// Install the global subscriber.
///
/// Only the first call does anything. When a log directory is configured the
/// returned guard must be kept alive to flush the file writer.
pub fn init_logging(options: LoggingOptions) -> VboxResult<Option<WorkerGuard>> {
    if INITIALIZED.get().is_some() {
        return Ok(None);
    }

    let filter = build_filter(&options)?;
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(options.ansi)
        .with_target(true);

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                VboxError::Storage(format!("cannot create log dir {}: {}", dir.display(), e))
            })?;
            let appender = tracing_appender::rolling::daily(dir, &options.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    // Another subscriber already owns the global slot; leave it in place.
    if let Err(e) = installed {
        tracing::debug!(error = %e, "Global subscriber already set");
    }
    let _ = INITIALIZED.set(());
    Ok(guard)
}

fn build_filter(options: &LoggingOptions) -> VboxResult<EnvFilter> {
    let from_env = std::env::var(LOG_ENV)
        .ok()
        .or_else(|| std::env::var(EnvFilter::DEFAULT_ENV).ok())
        .filter(|v| !v.trim().is_empty());

    let directive = from_env.as_deref().unwrap_or(&options.default_directive);
    EnvFilter::try_new(directive)
        .map_err(|e| VboxError::InvalidArgument(format!("invalid log filter {:?}: {}", directive, e)))
}
