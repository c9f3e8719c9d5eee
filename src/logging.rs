//! Tracing subscriber setup for the binary

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Level used when `RUST_LOG` is not set
pub fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "fetch_sync=warn",
        1 => "fetch_sync=info",
        2 => "fetch_sync=debug",
        _ => "trace",
    }
}

/// Install the global subscriber. With `log_dir`, events are also written
/// to a daily rolling file; keep the returned guard alive to flush it.
pub fn init(verbosity: u8, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "fetch-sync.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level() {
        assert_eq!(default_level(0), "fetch_sync=warn");
        assert_eq!(default_level(2), "fetch_sync=debug");
        assert_eq!(default_level(9), "trace");
    }
}
