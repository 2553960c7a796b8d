//! Character-cell grid and pixel rasterizer.
//!
//! `Grid` owns the two representations the VT102 engine keeps in lockstep: a
//! `Vec<Cell>` of character + attribute pairs (what the VT machine edits) and
//! a `Vec<u8>` pixel framebuffer of palette indices (what gets shipped to the
//! RFB surface). Every mutating operation here rasterizes into the
//! framebuffer and reports the affected rectangle to the caller's `Surface`.
//!
//! Grounded on `original_source/console.c`'s `vcPutCharColour`,
//! `vcCheckCoordinates`, `vcScroll`, `vcInsertLines`, `vcDeleteLines`,
//! `vcInsertCharacters`, `vcDeleteCharacters`, `vcDrawOrHideCursor`,
//! `vcToggleMarkCell`, `vcUnmark` and `vcReset`.

use crate::palette::{glyph_for, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::surface::Surface;

/// Attribute bits, matching `original_source/console.h`.
pub const XA_NORMAL: u8 = 0x00;
pub const XA_BLINK: u8 = 0x01;
pub const XA_BOLD: u8 = 0x02;
pub const XA_REVERSE: u8 = 0x04;
pub const XA_STANDOUT: u8 = 0x08;
pub const XA_UNDERLINE: u8 = 0x10;

pub const BLACK: u8 = 0;
pub const WHITE: u8 = 7;

/// One screen cell: a character plus a packed fg/bg/attribute byte.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Cell {
    pub ch: u8,
    pub fg: u8,
    pub bg: u8,
    pub attr: u8,
}

impl Cell {
    pub const fn blank(fg: u8, bg: u8) -> Self {
        Cell { ch: b' ', fg, bg, attr: XA_NORMAL }
    }
}

/// Cursor state and the XOR-painted rectangle geometry for it.
///
/// The rectangle is derived once from the glyph cell size, matching
/// `vcGetConsole`'s `cx1/cy1/cx2/cy2` derivation: a band roughly spanning the
/// cell's middle columns and the row just above the glyph baseline, so the
/// cursor reads as an underline-ish block without covering a full cell.
#[derive(Clone, Copy)]
pub struct Cursor {
    pub x: usize,
    pub y: usize,
    pub is_drawn: bool,
    pub suppressed: bool,
    rect_x1: usize,
    rect_x2: usize,
    rect_y1: usize,
    rect_y2: usize,
}

impl Cursor {
    fn new() -> Self {
        let x1 = GLYPH_WIDTH / 8;
        let x2 = GLYPH_WIDTH * 7 / 8;
        let y2 = GLYPH_HEIGHT.saturating_sub(1);
        let y1 = y2.saturating_sub(GLYPH_HEIGHT / 8);
        Cursor { x: 0, y: 0, is_drawn: false, suppressed: false, rect_x1: x1, rect_x2: x2, rect_y1: y1, rect_y2: y2 }
    }
}

/// Scroll region, half-open `[top, bottom)` in cell rows.
#[derive(Clone, Copy)]
pub struct ScrollRegion {
    pub top: usize,
    pub bottom: usize,
}

/// Mouse-drag text selection.
///
/// The marked extent is tracked as a half-open linear cell range
/// `[lo, hi)`; `mark_start` is the anchor (where the drag began) and
/// `mark_end` is the most recently reported position, with the toggled
/// region always recomputed as `[min(start,end), max(start,end))`. This is
/// the explicit, documented replacement for the original's `cx`/`cy`
/// axis mix-up (spec's open question, resolved by convention rather than
/// reproduced as a bug).
#[derive(Default)]
pub struct Selection {
    pub active: bool,
    mark_start: usize,
    mark_end: usize,
    pub text: Vec<u8>,
}

/// The character grid plus its rasterized pixel framebuffer.
pub struct Grid {
    pub width: usize,
    pub height: usize,
    cells: Vec<Cell>,
    framebuffer: Vec<u8>,
    pub cursor: Cursor,
    pub scroll: ScrollRegion,
    pub selection: Selection,
    pub default_fg: u8,
    pub default_bg: u8,
    pub wrap_bottom_to_top: bool,
}

impl Grid {
    /// Allocate a `width`x`height` grid and its backing pixel framebuffer.
    /// Uses fallible allocation (`try_reserve`) rather than the infallible
    /// `vec!` macro so a pathological `--width`/`--height` can be reported
    /// as a `SessionError::Allocation` instead of aborting the process, the
    /// same failure mode `vcAllocate` guarded against with a `malloc` check.
    pub fn new(width: usize, height: usize, wrap_bottom_to_top: bool) -> crate::error::SessionResult<Self> {
        let default_fg = WHITE;
        let default_bg = BLACK;

        let cell_count = width * height;
        let mut cells = Vec::new();
        cells
            .try_reserve_exact(cell_count)
            .map_err(|_| crate::error::SessionError::Allocation("character grid"))?;
        cells.resize(cell_count, Cell::blank(default_fg, default_bg));

        let pixel_count = width * GLYPH_WIDTH * height * GLYPH_HEIGHT;
        let mut framebuffer = Vec::new();
        framebuffer
            .try_reserve_exact(pixel_count)
            .map_err(|_| crate::error::SessionError::Allocation("pixel framebuffer"))?;
        framebuffer.resize(pixel_count, default_bg);

        Ok(Grid {
            width,
            height,
            cells,
            framebuffer,
            cursor: Cursor::new(),
            scroll: ScrollRegion { top: 0, bottom: height },
            selection: Selection::default(),
            default_fg,
            default_bg,
            wrap_bottom_to_top,
        })
    }

    pub fn width_px(&self) -> usize {
        self.width * GLYPH_WIDTH
    }

    pub fn height_px(&self) -> usize {
        self.height * GLYPH_HEIGHT
    }

    /// Read-only access to the rasterized framebuffer (palette indices).
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    fn cell_index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn cell(&self, x: usize, y: usize) -> Cell {
        self.cells[self.cell_index(x, y)]
    }

    /// Rasterize one cell's current contents into the framebuffer and
    /// report the pixel rectangle as dirty.
    fn paint_cell(&mut self, surface: &mut dyn Surface, x: usize, y: usize) {
        let cell = self.cell(x, y);
        let (fg_idx, bg_idx) = if cell.attr & XA_REVERSE != 0 { (cell.bg, cell.fg) } else { (cell.fg, cell.bg) };
        let px0 = x * GLYPH_WIDTH;
        let py0 = y * GLYPH_HEIGHT;
        let mask = glyph_for(cell.ch);
        for row in 0..GLYPH_HEIGHT {
            let bits = mask[row];
            let py = py0 + row;
            for col in 0..GLYPH_WIDTH {
                let set = bits & (1 << (7 - col)) != 0;
                let idx = if cell.attr & XA_UNDERLINE != 0 && row == GLYPH_HEIGHT - 1 {
                    fg_idx
                } else if set {
                    fg_idx
                } else {
                    bg_idx
                };
                self.framebuffer[py * self.width_px() + px0 + col] = idx;
            }
        }
        surface.dirty_rect(px0 as u16, py0 as u16, GLYPH_WIDTH as u16, GLYPH_HEIGHT as u16);
    }

    /// Fill `count` rows starting at `from_row` with blank cells and
    /// rasterize them, notifying one combined dirty rectangle.
    fn fill_rows(&mut self, surface: &mut dyn Surface, from_row: usize, count: usize) {
        if count == 0 {
            return;
        }
        let blank = Cell::blank(self.default_fg, self.default_bg);
        for row in from_row..from_row + count {
            for x in 0..self.width {
                let idx = self.cell_index(x, row);
                self.cells[idx] = blank;
            }
        }
        for row in from_row..from_row + count {
            for x in 0..self.width {
                self.paint_cell(surface, x, row);
            }
        }
    }

    /// Move `count` rows of cells and pixels from `src_row` to `dst_row`,
    /// reporting it to the surface as a copy-rect rather than per-cell
    /// dirty rectangles.
    fn move_rows(&mut self, surface: &mut dyn Surface, dst_row: usize, src_row: usize, count: usize) {
        if count == 0 || dst_row == src_row {
            return;
        }
        let w = self.width;
        self.cells.copy_within(src_row * w..(src_row + count) * w, dst_row * w);
        let wpx = self.width_px();
        let row_bytes = wpx * GLYPH_HEIGHT;
        let src_off = src_row * row_bytes;
        let dst_off = dst_row * row_bytes;
        let len = count * row_bytes;
        self.framebuffer.copy_within(src_off..src_off + len, dst_off);
        surface.copy_rect(0, (dst_row * GLYPH_HEIGHT) as u16, 0, (src_row * GLYPH_HEIGHT) as u16, wpx as u16, (count * GLYPH_HEIGHT) as u16);
    }

    /// Write one character at the cursor position with the given
    /// fg/bg/attribute, then advance the cursor one column. Control bytes
    /// (CR, LF, TAB, BS) are handled by the caller (the VT machine); this
    /// only ever paints printable bytes.
    pub fn put_char(&mut self, surface: &mut dyn Surface, ch: u8, fg: u8, bg: u8, attr: u8) {
        self.hide_cursor(surface);
        self.normalize_cursor(surface);
        let idx = self.cell_index(self.cursor.x, self.cursor.y);
        self.cells[idx] = Cell { ch, fg, bg, attr };
        self.paint_cell(surface, self.cursor.x, self.cursor.y);
        self.cursor.x += 1;
    }

    /// Clamp/wrap the cursor after a column or row change, scrolling (or
    /// wrapping, if `wrap_bottom_to_top` is set) when it runs off the
    /// bottom of the scroll region. Mirrors `vcCheckCoordinates`.
    pub fn normalize_cursor(&mut self, surface: &mut dyn Surface) {
        if self.cursor.x >= self.width {
            self.cursor.x = 0;
            self.cursor.y += 1;
        }
        if self.cursor.y >= self.scroll.bottom {
            if self.wrap_bottom_to_top {
                self.cursor.y = self.scroll.top;
            } else {
                let overflow = self.cursor.y - self.scroll.bottom + 1;
                self.scroll_region(surface, overflow as i32);
                self.cursor.y = self.scroll.bottom - 1;
            }
        }
        if self.cursor.y < self.scroll.top {
            self.cursor.y = self.scroll.top;
        }
    }

    /// Set the scroll region to `[top, bottom)`, clamped to the grid.
    pub fn set_scroll_region(&mut self, top: usize, bottom: usize) {
        let top = top.min(self.height.saturating_sub(1));
        let bottom = bottom.clamp(top + 1, self.height);
        self.scroll = ScrollRegion { top, bottom };
    }

    /// Scroll the region by `count` rows; positive scrolls text up
    /// (deletes from the top, inserts blank at the bottom), negative scrolls
    /// down. Mirrors `vcScroll`, including the overflow branch when
    /// `|count|` meets or exceeds the region height — except the overflow
    /// fill here uses spaces, not the original's `.` (documented fix).
    pub fn scroll_region(&mut self, surface: &mut dyn Surface, count: i32) {
        let region_height = self.scroll.bottom - self.scroll.top;
        if count == 0 {
            return;
        }
        if count.unsigned_abs() as usize >= region_height {
            self.fill_rows(surface, self.scroll.top, region_height);
            return;
        }
        if count > 0 {
            self.delete_lines(surface, self.scroll.top, count as usize);
        } else {
            self.insert_lines(surface, self.scroll.top, (-count) as usize);
        }
    }

    /// Insert `count` blank lines at row `from` within the scroll region,
    /// pushing the lines below it down (lines that fall off the bottom of
    /// the region are discarded). Mirrors `vcInsertLines`; blanked rows are
    /// filled in this grid's own cell/pixel buffers, not the original's
    /// mistakenly-aliased screen buffer offset.
    pub fn insert_lines(&mut self, surface: &mut dyn Surface, from: usize, count: usize) {
        let from = from.clamp(self.scroll.top, self.scroll.bottom);
        let count = count.min(self.scroll.bottom - from);
        if count == 0 {
            return;
        }
        let keep = self.scroll.bottom - from - count;
        if keep > 0 {
            self.move_rows(surface, from + count, from, keep);
        }
        self.fill_rows(surface, from, count);
    }

    /// Delete `count` lines starting at row `from` within the scroll
    /// region, pulling lines below it up and blanking the vacated rows at
    /// the bottom of the region. Mirrors `vcDeleteLines`.
    pub fn delete_lines(&mut self, surface: &mut dyn Surface, from: usize, count: usize) {
        let from = from.clamp(self.scroll.top, self.scroll.bottom);
        let count = count.min(self.scroll.bottom - from);
        if count == 0 {
            return;
        }
        let keep = self.scroll.bottom - from - count;
        if keep > 0 {
            self.move_rows(surface, from, from + count, keep);
        }
        self.fill_rows(surface, from + keep, count);
    }

    /// Delete `count` characters starting at the cursor column, shifting
    /// the remainder of the row left and filling the vacated cells at the
    /// *end* of the row with blanks. Mirrors `vcDeleteCharacters`, fixed to
    /// fill `[width-count, width)` rather than the original's buggy
    /// gap-count offset.
    pub fn delete_chars(&mut self, surface: &mut dyn Surface, count: usize) {
        let y = self.cursor.y;
        let x = self.cursor.x;
        let count = count.min(self.width - x);
        if count == 0 {
            return;
        }
        let row_start = self.cell_index(0, y);
        let keep = self.width - x - count;
        if keep > 0 {
            self.cells.copy_within(row_start + x + count..row_start + x + count + keep, row_start + x);
        }
        let blank = Cell::blank(self.default_fg, self.default_bg);
        for i in (self.width - count)..self.width {
            self.cells[row_start + i] = blank;
        }
        for cx in x..self.width {
            self.paint_cell(surface, cx, y);
        }
    }

    /// Insert `count` blank characters at the cursor column, shifting the
    /// remainder of the row right (characters that fall off the row end are
    /// discarded) and blanking the newly opened cells. Mirrors
    /// `vcInsertCharacters`, explicitly blanking vacated cells rather than
    /// leaving them for the client to infer.
    pub fn insert_chars(&mut self, surface: &mut dyn Surface, count: usize) {
        let y = self.cursor.y;
        let x = self.cursor.x;
        let count = count.min(self.width - x);
        if count == 0 {
            return;
        }
        let row_start = self.cell_index(0, y);
        let keep = self.width - x - count;
        if keep > 0 {
            self.cells.copy_within(row_start + x..row_start + x + keep, row_start + x + count);
        }
        let blank = Cell::blank(self.default_fg, self.default_bg);
        for i in x..x + count {
            self.cells[row_start + i] = blank;
        }
        for cx in x..self.width {
            self.paint_cell(surface, cx, y);
        }
    }

    /// Erase part or all of the cursor's row. `mode`: 0 = cursor to end,
    /// 1 = start to cursor, 2 = whole line.
    pub fn erase_line(&mut self, surface: &mut dyn Surface, mode: u8) {
        let y = self.cursor.y;
        let (start, end) = match mode {
            0 => (self.cursor.x, self.width),
            1 => (0, self.cursor.x + 1),
            _ => (0, self.width),
        };
        let end = end.min(self.width);
        let blank = Cell::blank(self.default_fg, self.default_bg);
        for x in start..end {
            let idx = self.cell_index(x, y);
            self.cells[idx] = blank;
        }
        for x in start..end {
            self.paint_cell(surface, x, y);
        }
    }

    /// Erase the whole display, regardless of `mode` — all three CSI J
    /// parameters (0/1/2) fall through to a full clear, preserving the
    /// original implementation's behavior rather than the parameter's
    /// documented meaning (spec's deliberate preserved bug).
    pub fn erase_display(&mut self, surface: &mut dyn Surface, _mode: u8) {
        self.fill_rows(surface, 0, self.height);
    }

    /// Reset the grid to its power-on state: blank cells, cursor at
    /// origin, full-height scroll region. Mirrors `vcReset`.
    pub fn reset(&mut self, surface: &mut dyn Surface) {
        self.cursor.x = 0;
        self.cursor.y = 0;
        self.cursor.is_drawn = false;
        self.scroll = ScrollRegion { top: 0, bottom: self.height };
        self.selection = Selection::default();
        self.fill_rows(surface, 0, self.height);
    }

    fn xor_rect(&mut self, x0: usize, y0: usize, x1: usize, y1: usize) {
        let wpx = self.width_px();
        for y in y0..y1 {
            for x in x0..x1 {
                let idx = y * wpx + x;
                self.framebuffer[idx] ^= 0x0f;
            }
        }
    }

    /// Toggle the cursor's XOR overlay rectangle within its cell. Mirrors
    /// `vcDrawOrHideCursor`, including its `x < width && y < height` guard —
    /// `x == width` is the pending-wrap state and has no on-screen cell to
    /// paint into.
    fn toggle_cursor_rect(&mut self, surface: &mut dyn Surface) {
        if self.cursor.x >= self.width || self.cursor.y >= self.height {
            return;
        }
        let px0 = self.cursor.x * GLYPH_WIDTH;
        let py0 = self.cursor.y * GLYPH_HEIGHT;
        let (x0, x1, y0, y1) = {
            let c = &self.cursor;
            (px0 + c.rect_x1, px0 + c.rect_x2, py0 + c.rect_y1, py0 + c.rect_y2)
        };
        self.xor_rect(x0, y0, x1, y1);
        self.cursor.is_drawn = !self.cursor.is_drawn;
        surface.dirty_rect(x0 as u16, y0 as u16, (x1 - x0) as u16, (y1 - y0) as u16);
    }

    /// Draw the cursor overlay if it isn't already drawn and isn't
    /// suppressed (DECTCEM off).
    pub fn draw_cursor(&mut self, surface: &mut dyn Surface) {
        if self.cursor.suppressed || self.cursor.is_drawn {
            return;
        }
        self.toggle_cursor_rect(surface);
    }

    /// Hide the cursor overlay if it's currently drawn. If a selection is
    /// active, unmark it first (mirrors `vcHideCursor` calling `vcUnmark`).
    pub fn hide_cursor(&mut self, surface: &mut dyn Surface) {
        if self.selection.active {
            self.unmark(surface);
        }
        if !self.cursor.is_drawn {
            return;
        }
        self.toggle_cursor_rect(surface);
    }

    fn linear(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    fn toggle_cell_mark(&mut self, surface: &mut dyn Surface, pos: usize) {
        let x = pos % self.width;
        let y = pos / self.width;
        let px0 = x * GLYPH_WIDTH;
        let py0 = y * GLYPH_HEIGHT;
        self.xor_rect(px0, py0, px0 + GLYPH_WIDTH, py0 + GLYPH_HEIGHT);
        surface.dirty_rect(px0 as u16, py0 as u16, GLYPH_WIDTH as u16, GLYPH_HEIGHT as u16);
    }

    /// Begin a mouse-drag selection at the given cell.
    pub fn begin_mark(&mut self, surface: &mut dyn Surface, x: usize, y: usize) {
        self.hide_cursor(surface);
        let pos = self.linear(x, y);
        self.selection.active = true;
        self.selection.mark_start = pos;
        self.selection.mark_end = pos;
        self.toggle_cell_mark(surface, pos);
    }

    /// Extend an in-progress selection to a new cell, toggling only the
    /// cells whose marked state changes (the delta between the old and new
    /// `[min,max)` extent around `mark_start`).
    pub fn extend_mark(&mut self, surface: &mut dyn Surface, x: usize, y: usize) {
        if !self.selection.active {
            return;
        }
        let new_pos = self.linear(x, y);
        let old_lo = self.selection.mark_start.min(self.selection.mark_end);
        let old_hi = self.selection.mark_start.max(self.selection.mark_end);
        let new_lo = self.selection.mark_start.min(new_pos);
        let new_hi = self.selection.mark_start.max(new_pos);
        for pos in old_lo..=old_hi {
            if pos < new_lo || pos > new_hi {
                self.toggle_cell_mark(surface, pos);
            }
        }
        for pos in new_lo..=new_hi {
            if pos < old_lo || pos > old_hi {
                self.toggle_cell_mark(surface, pos);
            }
        }
        self.selection.mark_end = new_pos;
    }

    /// Clear the marked overlay without changing the captured selection
    /// text. Mirrors `vcUnmark`.
    pub fn unmark(&mut self, surface: &mut dyn Surface) {
        if !self.selection.active {
            return;
        }
        let lo = self.selection.mark_start.min(self.selection.mark_end);
        let hi = self.selection.mark_start.max(self.selection.mark_end);
        for pos in lo..=hi {
            self.toggle_cell_mark(surface, pos);
        }
        self.selection.active = false;
    }

    /// Finish a drag, extracting the marked cells' characters (row-major,
    /// no trailing terminator — the Rust `Vec<u8>` needs none) into
    /// `selection.text` and clearing the overlay. Returns the captured text.
    pub fn end_mark(&mut self, surface: &mut dyn Surface) -> Vec<u8> {
        if !self.selection.active {
            return Vec::new();
        }
        let lo = self.selection.mark_start.min(self.selection.mark_end);
        let hi = self.selection.mark_start.max(self.selection.mark_end);
        let text: Vec<u8> = (lo..=hi).map(|pos| self.cells[pos].ch).collect();
        self.unmark(surface);
        self.selection.text = text.clone();
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::RecordingSurface;

    fn grid() -> (Grid, RecordingSurface) {
        (Grid::new(10, 5, false).unwrap(), RecordingSurface::default())
    }

    #[test]
    fn put_char_advances_cursor_and_paints() {
        let (mut g, mut s) = grid();
        g.put_char(&mut s, b'A', WHITE, BLACK, XA_NORMAL);
        assert_eq!(g.cursor.x, 1);
        assert_eq!(g.cell(0, 0).ch, b'A');
        assert!(!s.dirty_rects.is_empty());
    }

    #[test]
    fn erase_display_ignores_mode_and_clears_everything() {
        let (mut g, mut s) = grid();
        g.put_char(&mut s, b'X', WHITE, BLACK, XA_NORMAL);
        g.erase_display(&mut s, 1);
        assert_eq!(g.cell(0, 0).ch, b' ');
    }

    #[test]
    fn scroll_overflow_fills_with_spaces_not_dots() {
        let (mut g, mut s) = grid();
        g.put_char(&mut s, b'Z', WHITE, BLACK, XA_NORMAL);
        g.scroll_region(&mut s, 100);
        for y in 0..g.height {
            for x in 0..g.width {
                assert_eq!(g.cell(x, y).ch, b' ');
            }
        }
    }

    #[test]
    fn delete_chars_fills_trailing_cells() {
        let (mut g, mut s) = grid();
        for ch in b"ABCDE" {
            g.put_char(&mut s, *ch, WHITE, BLACK, XA_NORMAL);
        }
        g.cursor.x = 1;
        g.delete_chars(&mut s, 2);
        assert_eq!(g.cell(1, 0).ch, b'D');
        assert_eq!(g.cell(2, 0).ch, b'E');
        assert_eq!(g.cell(8, 0).ch, b' ');
        assert_eq!(g.cell(9, 0).ch, b' ');
    }

    #[test]
    fn insert_lines_blanks_its_own_buffer_not_the_source_row() {
        let (mut g, mut s) = grid();
        g.put_char(&mut s, b'Q', WHITE, BLACK, XA_NORMAL);
        g.insert_lines(&mut s, 0, 1);
        assert_eq!(g.cell(0, 0).ch, b' ');
        assert_eq!(g.cell(0, 1).ch, b'Q');
    }

    #[test]
    fn selection_round_trip() {
        let (mut g, mut s) = grid();
        for ch in b"HELLO" {
            g.put_char(&mut s, *ch, WHITE, BLACK, XA_NORMAL);
        }
        g.begin_mark(&mut s, 0, 0);
        g.extend_mark(&mut s, 4, 0);
        let text = g.end_mark(&mut s);
        assert_eq!(text, b"HELLO");
        assert!(!g.selection.active);
    }

    #[test]
    fn wrap_bottom_to_top_avoids_scrolling() {
        let mut g = Grid::new(4, 2, true).unwrap();
        let mut s = RecordingSurface::default();
        for _ in 0..3 {
            for ch in b"AB" {
                g.put_char(&mut s, *ch, WHITE, BLACK, XA_NORMAL);
            }
            g.cursor.x = 0;
            g.cursor.y += 1;
            g.normalize_cursor(&mut s);
        }
        assert!(s.copy_rects.is_empty());
    }
}
