//! Keyboard and pointer input bridge.
//!
//! Translates RFB keyboard/pointer events into PTY bytes and `Grid` mouse-
//! selection calls. Grounded on `original_source/main.c`'s
//! `linuxConsoleSequences` table and `do_key`, and on `console.c`'s
//! `vcKbdAddEventProc`/`vcPtrAddEventProc`/`vcSetXCutTextProc`.

use crate::grid::Grid;
use crate::surface::Surface;

/// X11 keysym values the bridge cares about (a small subset; anything below
/// 0xff00 that isn't a control character is assumed printable and passed
/// through as its low byte, matching `do_key`'s fallback).
pub mod keysym {
    pub const BACKSPACE: u32 = 0xff08;
    pub const TAB: u32 = 0xff09;
    pub const RETURN: u32 = 0xff0d;
    pub const ESCAPE: u32 = 0xff1b;
    pub const HOME: u32 = 0xff50;
    pub const LEFT: u32 = 0xff51;
    pub const UP: u32 = 0xff52;
    pub const RIGHT: u32 = 0xff53;
    pub const DOWN: u32 = 0xff54;
    pub const PAGE_UP: u32 = 0xff55;
    pub const PAGE_DOWN: u32 = 0xff56;
    pub const END: u32 = 0xff57;
    pub const INSERT: u32 = 0xff63;
    pub const DELETE: u32 = 0xffff;
    pub const KP_HOME: u32 = 0xff95;
    pub const KP_BEGIN: u32 = 0xff9d;
    pub const CONTROL_L: u32 = 0xffe3;
    pub const CONTROL_R: u32 = 0xffe4;
    pub const F1: u32 = 0xffbe;
    pub const F2: u32 = 0xffbf;
    pub const F3: u32 = 0xffc0;
    pub const F4: u32 = 0xffc1;
    pub const F5: u32 = 0xffc2;
    pub const F6: u32 = 0xffc3;
    pub const F7: u32 = 0xffc4;
    pub const F8: u32 = 0xffc5;
    pub const F9: u32 = 0xffc6;
    pub const F10: u32 = 0xffc7;
    pub const F11: u32 = 0xffc8;
    pub const F12: u32 = 0xffc9;
    pub const F13: u32 = 0xffca;
    pub const F14: u32 = 0xffcb;
    pub const F15: u32 = 0xffcc;
    pub const F16: u32 = 0xffcd;
    pub const F17: u32 = 0xffce;
    pub const F18: u32 = 0xffcf;
    pub const F19: u32 = 0xffd0;
    pub const F20: u32 = 0xffd1;
}

/// Map a key-down keysym plus current control-held state to the bytes that
/// should be written to the PTY. Returns `None` for keys with no PTY effect
/// (e.g. bare modifier presses).
///
/// Mirrors `do_key`'s table lookup followed by its ctrl+letter special case
/// and raw-byte fallback.
pub fn key_to_pty_bytes(keysym: u32, ctrl_held: bool) -> Option<Vec<u8>> {
    use keysym::*;

    if ctrl_held {
        if let Some(ctrl_byte) = ctrl_letter_byte(keysym) {
            return Some(vec![ctrl_byte]);
        }
    }

    let seq: &[u8] = match keysym {
        ESCAPE => b"\x1b",
        TAB => b"\t",
        RETURN => b"\r",
        BACKSPACE => b"\x7f",
        HOME | KP_HOME => b"\x1b[1~",
        INSERT => b"\x1b[2~",
        DELETE => b"\x1b[3~",
        END => b"\x1b[4~",
        PAGE_UP => b"\x1b[5~",
        PAGE_DOWN => b"\x1b[6~",
        UP => b"\x1b[A",
        DOWN => b"\x1b[B",
        RIGHT => b"\x1b[C",
        LEFT => b"\x1b[D",
        KP_BEGIN => b"\x1b[G",
        F1 => b"\x1b[[A",
        F2 => b"\x1b[[B",
        F3 => b"\x1b[[C",
        F4 => b"\x1b[[D",
        F5 => b"\x1b[[E",
        // F6-F20: non-contiguous tilde-sequence numbering, transcribed
        // literally from `linuxConsoleSequences` rather than interpolated
        // (the numbering skips 22, 27, and 30).
        F6 => b"\x1b[17~",
        F7 => b"\x1b[18~",
        F8 => b"\x1b[19~",
        F9 => b"\x1b[20~",
        F10 => b"\x1b[21~",
        F11 => b"\x1b[23~",
        F12 => b"\x1b[24~",
        F13 => b"\x1b[25~",
        F14 => b"\x1b[26~",
        F15 => b"\x1b[28~",
        F16 => b"\x1b[29~",
        F17 => b"\x1b[31~",
        F18 => b"\x1b[32~",
        F19 => b"\x1b[33~",
        F20 => b"\x1b[34~",
        CONTROL_L | CONTROL_R => return None,
        _ => {
            if keysym < 0x100 {
                return Some(vec![keysym as u8]);
            }
            return None;
        }
    };
    Some(seq.to_vec())
}

/// `keysym - 'a' + 1` for letters, and the handful of named control-byte
/// exceptions `do_key` special-cases. Returns `None` if ctrl+this key has
/// no defined control byte.
fn ctrl_letter_byte(keysym: u32) -> Option<u8> {
    match keysym {
        0x61..=0x7a => Some((keysym - 0x61 + 1) as u8), // a-z
        0x40 => Some(0x00),                             // @
        0x5b => Some(0x1b),                             // [
        0x5c => Some(0x1c),                              // \
        0x5d => Some(0x1d),                              // ]
        0x5e => Some(0x1e),                              // ^
        0x5f => Some(0x1f),                              // _
        _ => None,
    }
}

/// Bounded accumulator for the RFB cut-text (paste) primitive. Mirrors
/// `vcSetXCutTextProc`'s `MAX_CUT_TEXT_SYMBOLS` cap.
pub const MAX_CUT_TEXT: usize = 65535;

/// Pointer button state bits, matching the RFB pointer-event mask
/// convention `vcPtrAddEventProc` reads (`mask & 1` = left, `mask & 4` =
/// right).
pub const BUTTON_LEFT: u8 = 0x01;
pub const BUTTON_RIGHT: u8 = 0x04;

/// Drives `Grid` mouse-drag selection and right-click paste from RFB
/// pointer events. Left button drags a selection; a left-button release
/// extracts the selected text into `last_selection`. A right-button
/// release replays `last_selection` as synthetic keystrokes (paste).
pub struct PointerBridge {
    button_was_down: u8,
    last_selection: Vec<u8>,
}

impl PointerBridge {
    pub fn new() -> Self {
        PointerBridge { button_was_down: 0, last_selection: Vec::new() }
    }

    /// Process one pointer event. `cell_x`/`cell_y` are already converted
    /// from pixel to cell coordinates by the caller. Returns bytes to
    /// write to the PTY, if the event triggers a paste.
    pub fn pointer_event(&mut self, grid: &mut Grid, surface: &mut dyn Surface, mask: u8, cell_x: usize, cell_y: usize) -> Option<Vec<u8>> {
        let cell_x = cell_x.min(grid.width.saturating_sub(1));
        let cell_y = cell_y.min(grid.height.saturating_sub(1));

        let left_now = mask & BUTTON_LEFT != 0;
        let left_was = self.button_was_down & BUTTON_LEFT != 0;
        if left_now && !left_was {
            grid.begin_mark(surface, cell_x, cell_y);
        } else if left_now && left_was {
            grid.extend_mark(surface, cell_x, cell_y);
        } else if !left_now && left_was {
            let text = grid.end_mark(surface);
            if !text.is_empty() {
                self.last_selection = text;
            }
        }

        let right_now = mask & BUTTON_RIGHT != 0;
        let right_was = self.button_was_down & BUTTON_RIGHT != 0;
        let paste = if right_was && !right_now && !self.last_selection.is_empty() {
            Some(self.last_selection.clone())
        } else {
            None
        };

        self.button_was_down = mask;
        paste
    }

    /// Replace the held selection with externally supplied cut-text (the
    /// RFB client's clipboard push), bounded to `MAX_CUT_TEXT` bytes.
    pub fn set_cut_text(&mut self, text: &[u8]) {
        let len = text.len().min(MAX_CUT_TEXT);
        self.last_selection = text[..len].to_vec();
    }
}

impl Default for PointerBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::surface::RecordingSurface;

    #[test]
    fn arrow_keys_map_to_csi_sequences() {
        assert_eq!(key_to_pty_bytes(keysym::UP, false), Some(b"\x1b[A".to_vec()));
        assert_eq!(key_to_pty_bytes(keysym::LEFT, false), Some(b"\x1b[D".to_vec()));
    }

    #[test]
    fn function_keys_above_f5_use_tilde_sequences() {
        assert_eq!(key_to_pty_bytes(keysym::F6, false), Some(b"\x1b[17~".to_vec()));
    }

    #[test]
    fn function_key_numbering_skips_the_reserved_gaps() {
        assert_eq!(key_to_pty_bytes(keysym::F11, false), Some(b"\x1b[23~".to_vec()));
        assert_eq!(key_to_pty_bytes(keysym::F12, false), Some(b"\x1b[24~".to_vec()));
        assert_eq!(key_to_pty_bytes(keysym::F15, false), Some(b"\x1b[28~".to_vec()));
        assert_eq!(key_to_pty_bytes(keysym::F17, false), Some(b"\x1b[31~".to_vec()));
        assert_eq!(key_to_pty_bytes(keysym::F20, false), Some(b"\x1b[34~".to_vec()));
    }

    #[test]
    fn ctrl_letter_produces_control_byte() {
        assert_eq!(key_to_pty_bytes(0x63, true), Some(vec![3])); // ctrl+c
    }

    #[test]
    fn plain_ascii_passes_through() {
        assert_eq!(key_to_pty_bytes(b'Q' as u32, false), Some(vec![b'Q']));
    }

    #[test]
    fn drag_then_release_captures_selection() {
        let mut grid = Grid::new(10, 2, false).unwrap();
        let mut s = RecordingSurface::default();
        for ch in b"HELLO" {
            grid.put_char(&mut s, *ch, crate::grid::WHITE, crate::grid::BLACK, crate::grid::XA_NORMAL);
        }
        let mut bridge = PointerBridge::new();
        bridge.pointer_event(&mut grid, &mut s, BUTTON_LEFT, 0, 0);
        bridge.pointer_event(&mut grid, &mut s, BUTTON_LEFT, 4, 0);
        bridge.pointer_event(&mut grid, &mut s, 0, 4, 0);
        assert_eq!(bridge.last_selection, b"HELLO");
    }

    #[test]
    fn right_click_release_replays_selection_as_paste() {
        let mut grid = Grid::new(10, 2, false).unwrap();
        let mut s = RecordingSurface::default();
        let mut bridge = PointerBridge::new();
        bridge.set_cut_text(b"echo hi");
        bridge.pointer_event(&mut grid, &mut s, BUTTON_RIGHT, 0, 0);
        let pasted = bridge.pointer_event(&mut grid, &mut s, 0, 0, 0);
        assert_eq!(pasted, Some(b"echo hi".to_vec()));
    }

    #[test]
    fn cut_text_is_bounded() {
        let mut bridge = PointerBridge::new();
        let huge = vec![b'x'; MAX_CUT_TEXT + 100];
        bridge.set_cut_text(&huge);
        assert_eq!(bridge.last_selection.len(), MAX_CUT_TEXT);
    }
}
