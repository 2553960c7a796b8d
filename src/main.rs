mod config;
mod error;
mod grid;
mod input;
mod logging;
mod palette;
mod pty;
mod rfb_adapter;
mod session;
mod surface;
mod vt;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use clap::Parser;

use config::{read_password_from_stdin, Args, Config};
use session::Session;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let password = if args.passwd { Some(read_password_from_stdin()?) } else { None };
    let _log_guard = logging::init(args.debug, args.verbose);
    let config = Config::from_args(args, password);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    let session = Arc::new(Mutex::new(Session::new(&config).map_err(|e| {
        tracing::error!(error = %e, "failed to start session");
        e
    })?));

    let bind_port = resolve_port(&config)?;
    tracing::info!(listen = %config.listen, port = bind_port, width = config.width, height = config.height, "starting session");

    run_event_loops(session, &config, bind_port, running)?;

    tracing::info!("session shut down cleanly");
    Ok(())
}

/// Pick the TCP port to bind: either the fixed `--port`, or the first free
/// port in `[--min-port, --max-port]` when `--auto-port` is set.
fn resolve_port(config: &Config) -> anyhow::Result<u16> {
    if !config.auto_port {
        return Ok(config.port);
    }
    for candidate in config.min_port..=config.max_port {
        if std::net::TcpListener::bind((config.listen, candidate)).is_ok() {
            return Ok(candidate);
        }
    }
    anyhow::bail!("no free port in [{}, {}]", config.min_port, config.max_port);
}

/// Wire up the RFB listener and the PTY reader thread, then block until
/// `running` is cleared or the PTY's child process exits.
///
/// This is the concrete instantiation of spec.md §4.4/§5: one thread reads
/// the PTY and feeds the VT102 machine, the main thread loops on the RFB
/// crate's event pump, and both hold `session`'s mutex only for the
/// duration of a single dispatch.
fn run_event_loops(session: Arc<Mutex<Session>>, config: &Config, port: u16, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let server = Arc::new(rfb_adapter::SessionServer { session: session.clone() });
    let mut listener = rfb::VncServer::bind((config.listen, port), server.clone(), rfb_adapter::pixel_format())
        .map_err(|e| error::SessionError::RfbInit(e.into()))?;
    if let (Some(cert), Some(key)) = (&config.sslcert, &config.sslkey) {
        listener.enable_tls(cert, key).map_err(|e| error::SessionError::RfbInit(e.into()))?;
    }
    if let Some(password) = &config.password {
        listener.set_password(password);
    }

    let update_sink = Arc::new(Mutex::new(rfb_adapter::OwnedRfbSurface::new(listener.update_sink())));
    let reader_handle = session::spawn_pty_reader_thread(session.clone(), update_sink, running.clone());

    let poll_timeout = std::time::Duration::from_micros(config.select_timeout_micros);
    while running.load(Ordering::Relaxed) {
        listener.process(poll_timeout);
        if session.lock().expect("session mutex poisoned").has_pty_exited() {
            tracing::info!("pty child exited, shutting down");
            running.store(false, Ordering::Relaxed);
        }
    }

    let _ = reader_handle.join();

    if let Some(fatal) = session.lock().expect("session mutex poisoned").take_fatal_error() {
        return Err(fatal.into());
    }
    Ok(())
}

/// Install a SIGINT/SIGTERM handler that flips `running` to false instead
/// of aborting immediately, matching the original's `cleanup_0`/`cleanup_1`
/// teardown-then-exit pattern rather than a bare `exit()` in the handler.
fn ctrlc_handler<F: Fn() + Send + 'static>(on_signal: F) -> anyhow::Result<()> {
    ctrlc::set_handler(on_signal)?;
    Ok(())
}
