//! The downward-facing surface the grid/rasterizer notifies on every
//! framebuffer mutation (spec §6.2). A real session wires this to the `rfb`
//! crate's dirty-rectangle / copy-rectangle / bell primitives; tests use a
//! recording double instead.

/// Sink for framebuffer change notifications emitted by `Grid`.
///
/// Coordinates are in pixels. `copy_rect` lets the RFB surface use a cheap
/// copy-region primitive instead of retransmitting pixels for block moves
/// (scroll, insert/delete line, insert/delete character).
pub trait Surface {
    fn dirty_rect(&mut self, x: u16, y: u16, w: u16, h: u16);
    fn copy_rect(&mut self, dst_x: u16, dst_y: u16, src_x: u16, src_y: u16, w: u16, h: u16);
    fn bell(&mut self);
}

/// A `Surface` that discards every notification. Useful when a caller wants
/// to mutate the grid without an attached RFB session (e.g. warm-up writes).
pub struct NullSurface;

impl Surface for NullSurface {
    fn dirty_rect(&mut self, _x: u16, _y: u16, _w: u16, _h: u16) {}
    fn copy_rect(&mut self, _dst_x: u16, _dst_y: u16, _src_x: u16, _src_y: u16, _w: u16, _h: u16) {}
    fn bell(&mut self) {}
}

/// A `Surface` that records every call, for tests.
#[derive(Default)]
#[cfg(any(test, feature = "test-support"))]
pub struct RecordingSurface {
    pub dirty_rects: Vec<(u16, u16, u16, u16)>,
    pub copy_rects: Vec<(u16, u16, u16, u16, u16, u16)>,
    pub bells: usize,
}

#[cfg(any(test, feature = "test-support"))]
impl Surface for RecordingSurface {
    fn dirty_rect(&mut self, x: u16, y: u16, w: u16, h: u16) {
        self.dirty_rects.push((x, y, w, h));
    }
    fn copy_rect(&mut self, dst_x: u16, dst_y: u16, src_x: u16, src_y: u16, w: u16, h: u16) {
        self.copy_rects.push((dst_x, dst_y, src_x, src_y, w, h));
    }
    fn bell(&mut self) {
        self.bells += 1;
    }
}
