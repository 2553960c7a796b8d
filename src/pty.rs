//! PTY backend: spawns a shell (or arbitrary command) and exposes its
//! controlling terminal as a bidirectional byte stream.
//!
//! Grounded on the teacher's `terminal.rs` PTY-spawn sequence
//! (`portable_pty::native_pty_system`, `CommandBuilder`, a reader thread),
//! stripped of its `alacritty_terminal`/`tokio` plumbing — this crate drives
//! bytes straight into `VtMachine::feed` instead of a separate terminal
//! emulation layer.

use std::io::{Read, Write};
use std::sync::mpsc::{self, Receiver};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use crate::error::{SessionError, SessionResult};

/// An owned PTY pair: a writer half for keystrokes/paste and a channel that
/// delivers bytes read from the child's output in a background thread. A
/// read failure is sent as `Err` once, then the channel closes — a read
/// error is fatal to the session (spec's error-propagation policy), unlike
/// a write failure.
pub struct Pty {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    pub output: Receiver<std::io::Result<Vec<u8>>>,
    child: Box<dyn Child + Send + Sync>,
}

impl Pty {
    /// Spawn `command` (defaulting to `$SHELL`, matching a standalone run
    /// without container-runtime TTY allocation — see SPEC_FULL.md §4.6)
    /// attached to a `width`x`height` character-cell PTY.
    pub fn spawn(command: Option<&str>, width: u16, height: u16) -> SessionResult<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize { rows: height, cols: width, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| SessionError::PtySpawn(e.into()))?;

        let shell = command.map(str::to_owned).unwrap_or_else(|| std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()));
        let cmd = CommandBuilder::new(shell);
        let child = pair.slave.spawn_command(cmd).map_err(|e| SessionError::PtySpawn(e.into()))?;
        drop(pair.slave);

        let mut reader = pair.master.try_clone_reader().map_err(|e| SessionError::PtySpawn(e.into()))?;
        let writer = pair.master.take_writer().map_err(|e| SessionError::PtySpawn(e.into()))?;

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "pty read failed");
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        Ok(Pty { master: pair.master, writer, output: rx, child })
    }

    /// Write bytes to the PTY (keystrokes, pasted text). Failures are
    /// logged and dropped, not propagated — a stalled or dead child
    /// shouldn't take down the RFB session (spec's error-propagation
    /// policy: PTY-write failures are recoverable).
    pub fn write(&mut self, bytes: &[u8]) {
        if let Err(e) = self.writer.write_all(bytes) {
            tracing::warn!(error = %e, "pty write failed");
        }
    }

    /// Propagate a terminal resize to the child process.
    pub fn resize(&mut self, width: u16, height: u16) {
        if let Err(e) = self.master.resize(PtySize { rows: height, cols: width, pixel_width: 0, pixel_height: 0 }) {
            tracing::warn!(error = %e, "pty resize failed");
        }
    }

    /// Whether the child process has exited.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }
}
