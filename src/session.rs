//! Owned session state and the two-thread event loop.
//!
//! Replaces `original_source/main.c`'s process-global `vncConsole` with a
//! single owned `Session` value shared behind `Arc<Mutex<_>>` (spec's
//! "global mutable state → owned session" design note). One thread blocks
//! on PTY reads and feeds the VT102 machine; a second loops on the RFB
//! crate's timeout-bounded event pump. Both hold the same mutex while they
//! touch `Session`, mirroring the original's single `pthread_mutex_t`
//! around `vt_out()` and `rfbProcessEvents()`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::error::{SessionError, SessionResult};
use crate::grid::Grid;
use crate::input::PointerBridge;
use crate::pty::Pty;
use crate::surface::Surface;
use crate::vt::VtMachine;

pub struct Session {
    pub grid: Grid,
    pub vt: VtMachine,
    pub pointer: PointerBridge,
    pty: Pty,
    cell_width: u16,
    cell_height: u16,
    /// Set once a PTY read fails; `run_event_loops` checks this after the
    /// event loop exits and turns it into the process's exit code.
    fatal: Option<SessionError>,
}

impl Session {
    pub fn new(config: &Config) -> SessionResult<Self> {
        let grid = Grid::new(config.width as usize, config.height as usize, config.wrap_bottom_to_top)?;
        let pty = Pty::spawn(config.shell.as_deref(), config.width, config.height)?;
        Ok(Session {
            grid,
            vt: VtMachine::new(),
            pointer: PointerBridge::new(),
            pty,
            cell_width: crate::palette::GLYPH_WIDTH as u16,
            cell_height: crate::palette::GLYPH_HEIGHT as u16,
            fatal: None,
        })
    }

    pub fn take_fatal_error(&mut self) -> Option<SessionError> {
        self.fatal.take()
    }

    /// Drain one chunk of PTY output through the VT102 machine. Called by
    /// the PTY reader thread while holding the session lock.
    pub fn feed_pty_output(&mut self, surface: &mut dyn Surface, bytes: &[u8]) {
        for &b in bytes {
            self.vt.feed(&mut self.grid, surface, b);
        }
    }

    /// Forward keystroke bytes (from a key event, or a pasted selection) to
    /// the PTY. Never echoed locally — `do_key`'s PTY write has no echo of
    /// its own; any echo the user sees comes back around through the PTY
    /// and is drawn by `feed_pty_output` like any other output.
    pub fn handle_key_bytes(&mut self, _surface: &mut dyn Surface, bytes: &[u8]) {
        self.pty.write(bytes);
    }

    /// Convert a pixel-space pointer event to cell coordinates and drive
    /// the selection/paste bridge, writing any resulting paste to the PTY.
    pub fn handle_pointer_event(&mut self, surface: &mut dyn Surface, mask: u8, px: u16, py: u16) {
        let cell_x = (px / self.cell_width) as usize;
        let cell_y = (py / self.cell_height) as usize;
        if let Some(paste) = self.pointer.pointer_event(&mut self.grid, surface, mask, cell_x, cell_y) {
            self.pty.write(&paste);
        }
    }

    pub fn has_pty_exited(&mut self) -> bool {
        self.pty.has_exited()
    }
}

/// Spawn the PTY reader thread: blocks on `session.pty`'s output channel
/// and feeds each chunk through the VT102 machine under the shared lock.
/// Runs until the channel closes (the child exited) or `running` is
/// cleared. Generic over the surface implementation so tests can use a
/// recording double instead of a real RFB update sink.
pub fn spawn_pty_reader_thread<S>(session: Arc<Mutex<Session>>, update_sink: Arc<Mutex<S>>, running: Arc<std::sync::atomic::AtomicBool>) -> std::thread::JoinHandle<()>
where
    S: Surface + Send + 'static,
{
    std::thread::spawn(move || {
        use std::sync::atomic::Ordering;
        loop {
            if !running.load(Ordering::Relaxed) {
                break;
            }
            let chunk = {
                let guard = session.lock().expect("session mutex poisoned");
                guard.pty.output.recv_timeout(Duration::from_millis(200))
            };
            match chunk {
                Ok(Ok(bytes)) => {
                    let mut sess = session.lock().expect("session mutex poisoned");
                    let mut sink = update_sink.lock().expect("surface mutex poisoned");
                    sess.feed_pty_output(&mut *sink, &bytes);
                }
                Ok(Err(io_err)) => {
                    let mut sess = session.lock().expect("session mutex poisoned");
                    sess.fatal = Some(SessionError::PtyRead(io_err));
                    running.store(false, Ordering::Relaxed);
                    break;
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::RecordingSurface;
    use std::time::Duration;

    fn test_config(command: &str) -> Config {
        Config {
            listen: "127.0.0.1".parse().unwrap(),
            port: 5900,
            auto_port: false,
            min_port: 5900,
            max_port: 5999,
            width: 20,
            height: 5,
            sslcert: None,
            sslkey: None,
            password: None,
            wrap_bottom_to_top: false,
            shell: Some(command.to_string()),
            select_timeout_micros: 100_000,
        }
    }

    /// `Session::new` opens a real PTY and wires a `Grid` sized from
    /// `Config`; feeding bytes through it (as the reader thread would) lands
    /// in the grid via the VT102 machine.
    #[test]
    fn feed_pty_output_drives_the_grid_through_the_vt_machine() {
        let mut session = Session::new(&test_config("/bin/cat")).expect("pty spawn");
        let mut surface = RecordingSurface::default();

        session.feed_pty_output(&mut surface, b"hi\r\n");

        assert_eq!(session.grid.cell(0, 0).ch, b'h');
        assert_eq!(session.grid.cell(1, 0).ch, b'i');
        assert_eq!(session.grid.cursor.y, 1);
    }

    /// Keystroke bytes handed to `handle_key_bytes` reach the real child
    /// process on the other end of the PTY; `cat` echoes them straight back.
    #[test]
    fn handle_key_bytes_writes_through_to_the_pty() {
        let mut session = Session::new(&test_config("/bin/cat")).expect("pty spawn");
        let mut surface = RecordingSurface::default();

        session.handle_key_bytes(&mut surface, b"hi\n");

        let mut collected = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while collected.is_empty() && std::time::Instant::now() < deadline {
            if let Ok(Ok(chunk)) = session.pty.output.recv_timeout(Duration::from_millis(200)) {
                collected.extend_from_slice(&chunk);
            }
        }
        assert!(collected.windows(2).any(|w| w == b"hi"), "expected the child's echo to contain the written bytes, got {collected:?}");
    }

    /// A pointer drag-then-release over already-painted cells captures the
    /// marked text; a right-click release replays it as a PTY write.
    #[test]
    fn pointer_selection_round_trips_into_a_paste_write() {
        use crate::input::{BUTTON_LEFT, BUTTON_RIGHT};

        let mut session = Session::new(&test_config("/bin/cat")).expect("pty spawn");
        let mut surface = RecordingSurface::default();
        session.feed_pty_output(&mut surface, b"ok");

        let cw = session.cell_width;
        session.handle_pointer_event(&mut surface, BUTTON_LEFT, 0, 0);
        session.handle_pointer_event(&mut surface, BUTTON_LEFT, 2 * cw, 0);
        session.handle_pointer_event(&mut surface, 0, 2 * cw, 0);
        session.handle_pointer_event(&mut surface, BUTTON_RIGHT, 2 * cw, 0);
        session.handle_pointer_event(&mut surface, 0, 2 * cw, 0);

        let mut collected = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while collected.is_empty() && std::time::Instant::now() < deadline {
            if let Ok(Ok(chunk)) = session.pty.output.recv_timeout(Duration::from_millis(200)) {
                collected.extend_from_slice(&chunk);
            }
        }
        assert!(collected.windows(2).any(|w| w == b"ok"), "expected the pasted selection to reach the pty, got {collected:?}");
    }
}
