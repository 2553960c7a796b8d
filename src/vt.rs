//! VT102/ANSI escape-sequence state machine.
//!
//! Drives a `Grid` byte by byte. Grounded on `original_source/vt100.c`'s
//! `vt_out`/`state1`/`state2`/`state3`/`state6`/`ansi_mode`/`dec_mode`
//! dispatch, reproduced as an explicit Rust enum instead of the original's
//! `esc_s` integer plus fallthrough `switch`.

use crate::grid::{Grid, XA_BLINK, XA_BOLD, XA_NORMAL, XA_REVERSE, XA_UNDERLINE};
use crate::surface::Surface;

const MAX_PARAMS: usize = 16;

/// Which escape-sequence state the machine is in. Named after
/// `original_source/vt100.c`'s `esc_s` values.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum EscState {
    /// Ground state: bytes are either control codes or printable chars.
    Ground,
    /// Saw ESC, waiting to see what kind of sequence follows.
    Escape,
    /// Inside a CSI (`ESC [`) sequence, accumulating parameters.
    Csi,
    /// Inside a CSI-? (`ESC [ ?`) DEC private-mode sequence.
    CsiPrivate,
    /// Saw `ESC (` or `ESC )`, expecting one charset-designator byte
    /// (accepted and discarded — charset switching is out of scope).
    Charset,
    /// Saw `ESC #`, expecting one byte (only `8`, DEC screen alignment
    /// test, is recognized; everything else is ignored).
    Hash,
}

/// The VT102 engine: escape-sequence parser state plus current text
/// attributes, driving a `Grid`.
pub struct VtMachine {
    state: EscState,
    params: [u16; MAX_PARAMS],
    nparams: usize,
    fg: u8,
    bg: u8,
    attr: u8,
}

impl VtMachine {
    pub fn new() -> Self {
        VtMachine {
            state: EscState::Ground,
            params: [0; MAX_PARAMS],
            nparams: 0,
            fg: crate::grid::WHITE,
            bg: crate::grid::BLACK,
            attr: XA_NORMAL,
        }
    }

    fn reset_params(&mut self) {
        self.params = [0; MAX_PARAMS];
        self.nparams = 0;
    }

    fn param(&self, i: usize, default: u16) -> u16 {
        let v = *self.params.get(i).unwrap_or(&0);
        if v == 0 { default } else { v }
    }

    /// Feed one byte from the PTY into the state machine.
    pub fn feed(&mut self, grid: &mut Grid, surface: &mut dyn Surface, byte: u8) {
        // Control bytes are recognized in every state except mid-CSI param
        // accumulation, matching vt_out's dispatch-before-state-switch order.
        match byte {
            b'\r' => {
                grid.cursor.x = 0;
                return;
            }
            0x07 => {
                surface.bell();
                return;
            }
            0x18 | 0x1a => {
                self.state = EscState::Ground;
                return;
            }
            0x1b => {
                self.state = EscState::Escape;
                self.reset_params();
                return;
            }
            0x08 => {
                if grid.cursor.x > 0 {
                    grid.cursor.x -= 1;
                }
                return;
            }
            b'\n' => {
                grid.cursor.x = 0;
                grid.cursor.y += 1;
                grid.normalize_cursor(surface);
                return;
            }
            0x0b | 0x0c => {
                // VT/FF: ignored (logged only by the original's state1).
                return;
            }
            b'\t' => {
                grid.hide_cursor(surface);
                loop {
                    grid.put_char(surface, b' ', self.fg, self.bg, self.attr);
                    if grid.cursor.x % 8 == 0 || grid.cursor.x >= grid.width {
                        break;
                    }
                }
                return;
            }
            _ => {}
        }

        match self.state {
            EscState::Ground => self.ground(grid, surface, byte),
            EscState::Escape => self.escape(grid, surface, byte),
            EscState::Csi => self.csi(grid, surface, byte),
            EscState::CsiPrivate => self.csi_private(grid, byte),
            EscState::Charset => {
                self.state = EscState::Ground;
            }
            EscState::Hash => {
                // Only `8` (DEC screen alignment test) is named by the
                // original; it only logs, so there's nothing to apply here.
                self.state = EscState::Ground;
            }
        }
    }

    fn ground(&mut self, grid: &mut Grid, surface: &mut dyn Surface, byte: u8) {
        if byte < 0x20 {
            return;
        }
        // `put_char` normalizes (wraps a pending `x == width`) before it
        // writes. Don't normalize again here — that would eagerly wrap the
        // cursor the instant it reaches the last column instead of leaving
        // the pending-wrap state for the next write to resolve.
        grid.put_char(surface, byte, self.fg, self.bg, self.attr);
    }

    fn escape(&mut self, grid: &mut Grid, surface: &mut dyn Surface, byte: u8) {
        match byte {
            b'[' => self.state = EscState::Csi,
            b'(' | b')' => self.state = EscState::Charset,
            b'#' => self.state = EscState::Hash,
            b'P' => self.state = EscState::Ground, // DCS: accepted, contents ignored
            b'E' => {
                grid.cursor.x = 0;
                grid.cursor.y += 1;
                self.state = EscState::Ground;
            }
            b'c' => {
                // RIS: full reset, matching state1's `case 'c'` -> vcReset.
                self.fg = crate::grid::WHITE;
                self.bg = crate::grid::BLACK;
                self.attr = XA_NORMAL;
                grid.reset(surface);
                self.state = EscState::Ground;
            }
            _ => self.state = EscState::Ground,
        }
    }

    fn accumulate_digit(&mut self, d: u8) {
        if self.nparams == 0 {
            self.nparams = 1;
        }
        let i = self.nparams - 1;
        if i < MAX_PARAMS {
            self.params[i] = self.params[i].saturating_mul(10).saturating_add((d - b'0') as u16);
        }
    }

    fn next_param(&mut self) {
        if self.nparams < MAX_PARAMS {
            self.nparams += 1;
        }
    }

    fn csi(&mut self, grid: &mut Grid, surface: &mut dyn Surface, byte: u8) {
        match byte {
            b'0'..=b'9' => self.accumulate_digit(byte),
            b';' => self.next_param(),
            b'?' => self.state = EscState::CsiPrivate,
            _ => {
                self.csi_final(grid, surface, byte);
                self.state = EscState::Ground;
            }
        }
    }

    fn csi_private(&mut self, grid: &mut Grid, byte: u8) {
        match byte {
            b'0'..=b'9' => self.accumulate_digit(byte),
            b';' => self.next_param(),
            b'h' | b'l' => {
                self.dec_mode(grid, self.param(0, 0), byte == b'h');
                self.state = EscState::Ground;
            }
            _ => self.state = EscState::Ground,
        }
    }

    /// CSI-? h/l: DEC private modes. Only mode 25 (cursor visibility) has an
    /// observable effect; the rest (5 bell-on-error, 7 autowrap) are logged
    /// only by the original and are no-ops here.
    fn dec_mode(&mut self, grid: &mut Grid, mode: u16, set: bool) {
        if mode == 25 {
            grid.cursor.suppressed = !set;
        }
    }

    /// CSI h/l: ANSI modes. Mode 4 (insert/replace) and mode 20 (newline
    /// mode) are logged only by the original and have no behavioral effect
    /// here either.
    fn ansi_mode(&mut self, _grid: &mut Grid, _mode: u16, _set: bool) {}

    fn csi_final(&mut self, grid: &mut Grid, surface: &mut dyn Surface, byte: u8) {
        match byte {
            b'A' => self.move_cursor(grid, 0, -(self.param(0, 1) as i32)),
            b'B' => self.move_cursor(grid, 0, self.param(0, 1) as i32),
            b'C' => self.move_cursor(grid, self.param(0, 1) as i32, 0),
            b'D' => self.move_cursor(grid, -(self.param(0, 1) as i32), 0),
            b'H' | b'f' => {
                let row = self.param(0, 1).saturating_sub(1) as usize;
                let col = self.param(1, 1).saturating_sub(1) as usize;
                grid.cursor.y = row.min(grid.height.saturating_sub(1));
                grid.cursor.x = col.min(grid.width.saturating_sub(1));
            }
            b'K' => grid.erase_line(surface, self.param(0, 0) as u8),
            b'J' => grid.erase_display(surface, self.param(0, 0) as u8),
            b'm' => self.sgr(),
            b'L' => grid.insert_lines(surface, grid.cursor.y, self.param(0, 1) as usize),
            b'M' => grid.delete_lines(surface, grid.cursor.y, self.param(0, 1) as usize),
            b'P' => grid.delete_chars(surface, self.param(0, 1) as usize),
            b'@' => grid.insert_chars(surface, self.param(0, 1) as usize),
            b'r' => {
                let top = self.param(0, 1).saturating_sub(1) as usize;
                let bottom = self.param(1, grid.height as u16) as usize;
                grid.set_scroll_region(top, bottom);
            }
            b'h' | b'l' => self.ansi_mode(grid, self.param(0, 0), byte == b'h'),
            _ => {}
        }
    }

    fn move_cursor(&mut self, grid: &mut Grid, dx: i32, dy: i32) {
        let x = (grid.cursor.x as i32 + dx).clamp(0, grid.width as i32 - 1);
        let y = (grid.cursor.y as i32 + dy).clamp(grid.scroll.top as i32, grid.scroll.bottom as i32 - 1);
        grid.cursor.x = x as usize;
        grid.cursor.y = y as usize;
    }

    /// CSI m: Select Graphic Rendition. Mirrors `vt100.c`'s `case 'm'`
    /// parameter loop.
    fn sgr(&mut self) {
        if self.nparams == 0 {
            self.fg = crate::grid::WHITE;
            self.bg = crate::grid::BLACK;
            self.attr = XA_NORMAL;
            return;
        }
        for i in 0..self.nparams {
            let p = self.params[i];
            match p {
                0 => {
                    self.fg = crate::grid::WHITE;
                    self.bg = crate::grid::BLACK;
                    self.attr = XA_NORMAL;
                }
                1 => self.attr |= XA_BOLD,
                4 => self.attr |= XA_UNDERLINE,
                5 => self.attr |= XA_BLINK,
                7 => self.attr |= XA_REVERSE,
                22 => self.attr &= !XA_BOLD,
                24 => self.attr &= !XA_UNDERLINE,
                25 => self.attr &= !XA_BLINK,
                27 => self.attr &= !XA_REVERSE,
                30..=37 => self.fg = (p - 30) as u8,
                39 => self.fg = crate::grid::WHITE,
                40..=47 => self.bg = (p - 40) as u8,
                49 => self.bg = crate::grid::BLACK,
                _ => {}
            }
        }
    }

}

impl Default for VtMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::surface::RecordingSurface;

    fn harness() -> (VtMachine, Grid, RecordingSurface) {
        (VtMachine::new(), Grid::new(20, 10, false).unwrap(), RecordingSurface::default())
    }

    fn feed_str(vt: &mut VtMachine, grid: &mut Grid, s: &mut RecordingSurface, text: &str) {
        for b in text.bytes() {
            vt.feed(grid, s, b);
        }
    }

    #[test]
    fn prints_plain_text() {
        let (mut vt, mut grid, mut s) = harness();
        feed_str(&mut vt, &mut grid, &mut s, "Hi");
        assert_eq!(grid.cell(0, 0).ch, b'H');
        assert_eq!(grid.cell(1, 0).ch, b'i');
        assert_eq!(grid.cursor.x, 2);
    }

    #[test]
    fn csi_cursor_position_is_one_based() {
        let (mut vt, mut grid, mut s) = harness();
        feed_str(&mut vt, &mut grid, &mut s, "\x1b[5;3H");
        assert_eq!(grid.cursor.y, 4);
        assert_eq!(grid.cursor.x, 2);
    }

    #[test]
    fn sgr_sets_and_resets_colors() {
        let (mut vt, mut grid, mut s) = harness();
        feed_str(&mut vt, &mut grid, &mut s, "\x1b[31;44mX\x1b[0mY");
        assert_eq!(grid.cell(0, 0).fg, 1);
        assert_eq!(grid.cell(0, 0).bg, 4);
        assert_eq!(grid.cell(1, 0).fg, crate::grid::WHITE);
        assert_eq!(grid.cell(1, 0).bg, crate::grid::BLACK);
    }

    #[test]
    fn csi_j_clears_regardless_of_parameter() {
        for mode in ["0", "1", "2"] {
            let (mut vt, mut grid, mut s) = harness();
            feed_str(&mut vt, &mut grid, &mut s, "ABC");
            feed_str(&mut vt, &mut grid, &mut s, &format!("\x1b[{mode}J"));
            assert_eq!(grid.cell(0, 0).ch, b' ');
            assert_eq!(grid.cell(1, 0).ch, b' ');
            assert_eq!(grid.cell(2, 0).ch, b' ');
        }
    }

    #[test]
    fn dec_private_mode_25_hides_and_shows_cursor() {
        let (mut vt, mut grid, mut s) = harness();
        feed_str(&mut vt, &mut grid, &mut s, "\x1b[?25l");
        assert!(grid.cursor.suppressed);
        feed_str(&mut vt, &mut grid, &mut s, "\x1b[?25h");
        assert!(!grid.cursor.suppressed);
    }

    #[test]
    fn newline_resets_column_and_advances_row() {
        let (mut vt, mut grid, mut s) = harness();
        feed_str(&mut vt, &mut grid, &mut s, "AB\n");
        assert_eq!(grid.cursor.x, 0);
        assert_eq!(grid.cursor.y, 1);
    }

    #[test]
    fn vertical_tab_and_form_feed_are_ignored() {
        let (mut vt, mut grid, mut s) = harness();
        feed_str(&mut vt, &mut grid, &mut s, "A\x0b\x0cB");
        assert_eq!(grid.cell(0, 0).ch, b'A');
        assert_eq!(grid.cell(1, 0).ch, b'B');
        assert_eq!(grid.cursor.x, 2);
        assert_eq!(grid.cursor.y, 0);
    }

    #[test]
    fn esc_c_fully_resets_the_grid() {
        let (mut vt, mut grid, mut s) = harness();
        feed_str(&mut vt, &mut grid, &mut s, "\x1b[31mABC\x1b[10;10H\x1bc");
        for y in 0..grid.height {
            for x in 0..grid.width {
                assert_eq!(grid.cell(x, y).ch, b' ');
            }
        }
        assert_eq!(grid.cursor.x, 0);
        assert_eq!(grid.cursor.y, 0);
    }

    #[test]
    fn scroll_region_clamps_cursor_motion() {
        let (mut vt, mut grid, mut s) = harness();
        feed_str(&mut vt, &mut grid, &mut s, "\x1b[3;6r");
        grid.cursor.y = 4;
        feed_str(&mut vt, &mut grid, &mut s, "\x1b[10A");
        assert_eq!(grid.cursor.y, 2);
    }

    #[test]
    fn carriage_return_newline_wraps_into_second_row() {
        let (mut vt, mut grid, mut s) = harness();
        feed_str(&mut vt, &mut grid, &mut s, "Hello\r\nWorld");
        for (i, ch) in b"Hello".iter().enumerate() {
            assert_eq!(grid.cell(i, 0).ch, *ch);
        }
        for (i, ch) in b"World".iter().enumerate() {
            assert_eq!(grid.cell(i, 1).ch, *ch);
        }
        assert_eq!(grid.cursor.x, 5);
        assert_eq!(grid.cursor.y, 1);
    }

    #[test]
    fn clear_then_home_leaves_a_single_mark_at_origin() {
        let (mut vt, mut grid, mut s) = harness();
        feed_str(&mut vt, &mut grid, &mut s, "\x1b[2J\x1b[H*");
        assert_eq!(grid.cell(0, 0).ch, b'*');
        for y in 0..grid.height {
            for x in 0..grid.width {
                if (x, y) != (0, 0) {
                    assert_eq!(grid.cell(x, y).ch, b' ');
                }
            }
        }
        assert_eq!(grid.cursor.x, 1);
        assert_eq!(grid.cursor.y, 0);
    }

    #[test]
    fn colored_text_resets_attributes_between_runs() {
        let (mut vt, mut grid, mut s) = harness();
        feed_str(&mut vt, &mut grid, &mut s, "\x1b[31mA\x1b[0mB");
        assert_eq!(grid.cell(0, 0).ch, b'A');
        assert_eq!(grid.cell(0, 0).fg, 1);
        assert_eq!(grid.cell(0, 0).bg, crate::grid::BLACK);
        assert_eq!(grid.cell(1, 0).ch, b'B');
        assert_eq!(grid.cell(1, 0).fg, crate::grid::WHITE);
        assert_eq!(grid.cell(1, 0).bg, crate::grid::BLACK);
    }

    #[test]
    fn absolute_cursor_position_then_write_advances_correctly() {
        let (mut vt, mut grid, mut s) = harness();
        feed_str(&mut vt, &mut grid, &mut s, "\x1b[3;5HX");
        assert_eq!(grid.cell(4, 2).ch, b'X');
        assert_eq!(grid.cursor.x, 5);
        assert_eq!(grid.cursor.y, 2);
    }

    #[test]
    fn filling_every_row_then_newline_scrolls_one_line() {
        let mut grid = Grid::new(80, 24, false).unwrap();
        let mut s = RecordingSurface::default();
        for row in 0..24usize {
            let letter = b'A' + row as u8;
            grid.cursor.x = 0;
            grid.cursor.y = row;
            grid.put_char(&mut s, letter, crate::grid::WHITE, crate::grid::BLACK, XA_NORMAL);
        }
        grid.cursor.x = 0;
        grid.cursor.y = 23;
        let mut vt = VtMachine::new();
        vt.feed(&mut grid, &mut s, b'\n');
        assert_eq!(grid.cell(0, 0).ch, b'B');
        assert_eq!(grid.cell(0, 23).ch, b' ');
        assert_eq!(grid.cursor.x, 0);
        assert_eq!(grid.cursor.y, 23);
    }

    #[test]
    fn delete_two_characters_shifts_row_left() {
        let (mut vt, mut grid, mut s) = harness();
        feed_str(&mut vt, &mut grid, &mut s, "ABCDE");
        grid.cursor.x = 1;
        feed_str(&mut vt, &mut grid, &mut s, "\x1b[2P");
        assert_eq!(grid.cell(0, 0).ch, b'A');
        assert_eq!(grid.cell(1, 0).ch, b'D');
        assert_eq!(grid.cell(2, 0).ch, b'E');
        assert_eq!(grid.cell(3, 0).ch, b' ');
    }
}
