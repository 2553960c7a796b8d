//! Structured logging setup.
//!
//! Always logs to stderr, filtered by `RUST_LOG` (falling back to a level
//! derived from `--debug`/`--verbose`). Setting `TTY_RFB_BRIDGE_LOG` to a
//! path additionally mirrors events to that file with a non-blocking
//! writer, replacing the original console's `openlog()`/per-day logfile
//! pair with a single `tracing` pipeline.
//!
//! ```sh
//! TTY_RFB_BRIDGE_LOG=/var/log/tty-rfb-bridge.log tty-rfb-bridge
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Initialize logging for the given debug/verbose levels.
///
/// Returns an `Option<WorkerGuard>` that must be kept alive for the
/// duration of the process when file logging is active — dropping it
/// flushes and closes the log file. Store the returned guard in a local
/// binding in `main()`.
pub fn init(debug: u8, verbose: u8) -> Option<WorkerGuard> {
    let default_level = match debug.max(verbose) {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(true);

    let (file_layer, guard) = match file_log_path() {
        Some(path) => {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new().create(true).append(true).open(&path).expect("failed to open log file");
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false).with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(filter).with(stderr_layer).with(file_layer).init();

    install_panic_hook();
    if let Some(path) = file_log_path() {
        tracing::info!(path = %path.display(), "file logging active");
    }
    guard
}

fn file_log_path() -> Option<PathBuf> {
    std::env::var("TTY_RFB_BRIDGE_LOG").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Log panics as a `tracing::error!` event before delegating to the
/// previously-installed handler, so a crash is visible in the same log
/// stream as everything else.
fn install_panic_hook() {
    let prev_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_else(|| "<unknown location>".to_string());

        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_string()
        };

        tracing::error!(location = %location, "panic: {}", message);
        prev_hook(info);
    }));
}
