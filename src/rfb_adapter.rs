//! Thin adapter between `Session` and the `rfb` crate's server-side API.
//!
//! Contains no VT102 or grid logic — it only translates `rfb::Server`
//! callbacks into `Session` method calls and forwards `Grid`/`Surface`
//! notifications into the `rfb` crate's dirty/copy-rectangle and bell
//! primitives. See SPEC_FULL.md §4.5 for why this crate is the named RFB
//! backend.

use rfb::{PixelFormat, Rect, Server};

use crate::input::key_to_pty_bytes;
use crate::session::Session;
use crate::surface::{NullSurface, Surface};

/// Palette-indexed 8 bits-per-pixel format, matching the grid's
/// framebuffer representation one-for-one (spec.md §4.1: "indexed color,
/// one byte per pixel").
pub fn pixel_format() -> PixelFormat {
    PixelFormat::indexed_8bpp()
}

/// Forwards `Grid`/`VtMachine` dirty/copy-rect notifications into the
/// `rfb` crate's per-client update queue.
pub struct RfbSurface<'a> {
    inner: &'a mut dyn rfb::UpdateSink,
}

impl<'a> RfbSurface<'a> {
    pub fn new(inner: &'a mut dyn rfb::UpdateSink) -> Self {
        RfbSurface { inner }
    }
}

impl<'a> Surface for RfbSurface<'a> {
    fn dirty_rect(&mut self, x: u16, y: u16, w: u16, h: u16) {
        self.inner.mark_dirty(Rect { x, y, w, h });
    }

    fn copy_rect(&mut self, dst_x: u16, dst_y: u16, src_x: u16, src_y: u16, w: u16, h: u16) {
        self.inner.copy_rect(Rect { x: src_x, y: src_y, w, h }, dst_x, dst_y);
    }

    fn bell(&mut self) {
        self.inner.bell();
    }
}

/// An owned counterpart to `RfbSurface` for contexts (the PTY reader
/// thread) that need a `'static` handle to the listener's broadcast queue
/// rather than a borrow scoped to one callback.
pub struct OwnedRfbSurface(Box<dyn rfb::UpdateSink + Send>);

impl OwnedRfbSurface {
    pub fn new(sink: Box<dyn rfb::UpdateSink + Send>) -> Self {
        OwnedRfbSurface(sink)
    }
}

impl Surface for OwnedRfbSurface {
    fn dirty_rect(&mut self, x: u16, y: u16, w: u16, h: u16) {
        self.0.mark_dirty(Rect { x, y, w, h });
    }

    fn copy_rect(&mut self, dst_x: u16, dst_y: u16, src_x: u16, src_y: u16, w: u16, h: u16) {
        self.0.copy_rect(Rect { x: src_x, y: src_y, w, h }, dst_x, dst_y);
    }

    fn bell(&mut self) {
        self.0.bell();
    }
}

/// Implements the `rfb` crate's `Server` trait on top of a shared `Session`.
/// Every callback takes the session lock for the duration of the call,
/// matching spec.md §5's single-mutex concurrency model.
pub struct SessionServer {
    pub session: std::sync::Arc<std::sync::Mutex<Session>>,
}

impl Server for SessionServer {
    fn pixel_format(&self) -> PixelFormat {
        pixel_format()
    }

    fn framebuffer_size(&self) -> (u16, u16) {
        let session = self.session.lock().expect("session mutex poisoned");
        (session.grid.width_px() as u16, session.grid.height_px() as u16)
    }

    fn read_framebuffer(&self, out: &mut [u8]) {
        let mut session = self.session.lock().expect("session mutex poisoned");
        // Mirrors the original's `displayHook` -> `vcMakeSureCursorIsDrawn`:
        // the cursor overlay is only ever painted right before a client
        // reads the framebuffer, not on every grid edit.
        session.grid.draw_cursor(&mut NullSurface);
        out.copy_from_slice(session.grid.framebuffer());
    }

    fn on_key_event(&self, update_sink: &mut dyn rfb::UpdateSink, keysym: u32, down: bool, ctrl_held: bool) {
        if !down {
            return;
        }
        let mut session = self.session.lock().expect("session mutex poisoned");
        let mut surface = RfbSurface::new(update_sink);
        if let Some(bytes) = key_to_pty_bytes(keysym, ctrl_held) {
            session.handle_key_bytes(&mut surface, &bytes);
        }
    }

    fn on_pointer_event(&self, update_sink: &mut dyn rfb::UpdateSink, mask: u8, x: u16, y: u16) {
        let mut session = self.session.lock().expect("session mutex poisoned");
        let mut surface = RfbSurface::new(update_sink);
        session.handle_pointer_event(&mut surface, mask, x, y);
    }

    fn on_cut_text(&self, _update_sink: &mut dyn rfb::UpdateSink, text: &[u8]) {
        let mut session = self.session.lock().expect("session mutex poisoned");
        session.pointer.set_cut_text(text);
    }

    fn on_client_connect(&self, addr: std::net::SocketAddr) {
        tracing::info!(%addr, "rfb client connected");
    }

    fn on_client_disconnect(&self, addr: std::net::SocketAddr) {
        tracing::info!(%addr, "rfb client disconnected");
    }
}

