// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The terminal encoder state machine.
//!
//! Tracks where the remote cursor is (by virtual line), which SGR attribute
//! was last emitted, and whether the cursor is currently hidden, and emits
//! the smallest escape/byte sequence that brings the remote screen up to
//! date with each scraped row.

use super::color::{push_set_color, CSI};
use super::scan::{fix_console_popup_box_art, scan_unicode_scalar_value};
use super::OutputSink;
use crate::core::cell::COLOR_ATTRIBUTE_MASK;
use crate::core::unicode::encode_utf8;
use crate::core::Cell;

/// Whether [`Terminal::reset`] should clear the remote screen first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendClearFlag {
    SendClear,
    OmitClear,
}

/// Remote cursor position as (column, virtual line).
pub type CursorPos = (i16, i64);

#[derive(Debug)]
pub struct Terminal {
    /// Virtual line the remote cursor sits on.
    remote_line: i64,
    cursor_hidden: bool,
    cursor_pos: CursorPos,
    /// Last SGR attribute emitted; -1 forces the next cell to re-emit.
    remote_color: i32,
    /// Bypass mode: emit raw text only, no escape sequences.
    console_mode: bool,
    /// Scratch for one encoded row.
    term_line: Vec<u8>,
}

impl Default for Terminal {
    fn default() -> Self { Self::new() }
}

impl Terminal {
    #[must_use]
    pub fn new() -> Self {
        Self {
            remote_line: 0,
            cursor_hidden: false,
            cursor_pos: (0, 0),
            remote_color: -1,
            console_mode: false,
            term_line: Vec::new(),
        }
    }

    /// Bypass mode for clients that want a pure byte stream. `1` enables.
    pub fn set_console_mode(&mut self, mode: i32) { self.console_mode = mode == 1; }

    /// Restart encoder state. With [`SendClearFlag::SendClear`], first reset
    /// SGR parameters, home the cursor, and erase the remote screen.
    pub fn reset(&mut self, out: &mut dyn OutputSink, send_clear: SendClearFlag, new_line: i64) {
        if send_clear == SendClearFlag::SendClear && !self.console_mode {
            out.send(b"\x1b[0m\x1b[1;1H\x1b[2J");
        }
        self.remote_line = new_line;
        self.cursor_hidden = false;
        self.cursor_pos = (0, new_line);
        self.remote_color = -1;
    }

    /// Emit one row at virtual line `line`.
    ///
    /// The row always ends with erase-to-EOL so stale longer content cannot
    /// survive, except that when the final cell is non-blank the erase is
    /// issued one character early. Many terminals treat a `CSI 0K` issued
    /// just past the last column as erasing that column too.
    pub fn send_line(&mut self, out: &mut dyn OutputSink, line: i64, cells: &[Cell]) {
        self.hide_terminal_cursor(out);
        self.move_terminal_to_line(out, line);

        let mut term_line = std::mem::take(&mut self.term_line);
        term_line.clear();
        let mut trimmed_len = 0;
        let mut already_erased = false;

        let width = cells.len();
        let mut i = 0;
        while i < width {
            let color = i32::from(cells[i].attributes & COLOR_ATTRIBUTE_MASK);
            if color != self.remote_color {
                if !self.console_mode {
                    push_set_color(&mut term_line, color as u16);
                }
                trimmed_len = term_line.len();
                self.remote_color = color;
            }
            let (cell_count, scalar) = scan_unicode_scalar_value(&cells[i..]);
            if scalar == u32::from(b' ') {
                term_line.push(b' ');
            } else {
                if i + cell_count == width {
                    if !self.console_mode {
                        term_line.extend_from_slice(b"\x1b[0K");
                    }
                    already_erased = true;
                }
                let scalar = fix_console_popup_box_art(scalar);
                let mut enc = [0u8; 4];
                let enc_len = encode_utf8(&mut enc, scalar);
                if enc_len == 0 {
                    term_line.push(b'?');
                } else {
                    term_line.extend_from_slice(&enc[..enc_len]);
                }
                trimmed_len = term_line.len();
            }
            i += cell_count;
        }

        // Trailing spaces are not sent; erase-to-EOL covers them.
        out.send(&term_line[..trimmed_len]);
        self.term_line = term_line;

        if !already_erased && !self.console_mode {
            out.send(b"\x1b[0K");
        }
    }

    /// Park the cursor after a scrape pass. If it moved it must first be
    /// hidden; a hidden cursor is moved into place and shown again.
    pub fn finish_output(&mut self, out: &mut dyn OutputSink, new_cursor_pos: CursorPos) {
        if new_cursor_pos != self.cursor_pos {
            self.hide_terminal_cursor(out);
        }
        if self.cursor_hidden {
            self.move_terminal_to_line(out, new_cursor_pos.1);
            if !self.console_mode {
                let mut buf = Vec::with_capacity(16);
                buf.extend_from_slice(CSI);
                super::color::push_uint(&mut buf, (new_cursor_pos.0 + 1).max(1) as u32);
                buf.extend_from_slice(b"G\x1b[?25h");
                out.send(&buf);
            }
            self.cursor_hidden = false;
        }
        self.cursor_pos = new_cursor_pos;
    }

    fn hide_terminal_cursor(&mut self, out: &mut dyn OutputSink) {
        if self.cursor_hidden {
            return;
        }
        if !self.console_mode {
            out.send(b"\x1b[?25l");
        }
        self.cursor_hidden = true;
    }

    /// Move to a virtual line. Upward motion is `\r` + CUU; downward motion
    /// is repeated `\r\n`; same line is a bare `\r`.
    ///
    /// CPL/CNL are avoided on purpose: Konsole 2.5.4 rejects Cursor
    /// Previous Line with "Undecodable sequence" errors, and Cursor Next
    /// Line does nothing when the cursor is already on the last line.
    fn move_terminal_to_line(&mut self, out: &mut dyn OutputSink, line: i64) {
        if line < self.remote_line {
            if !self.console_mode {
                let mut buf = Vec::with_capacity(16);
                buf.push(b'\r');
                buf.extend_from_slice(CSI);
                super::color::push_uint(&mut buf, (self.remote_line - line) as u32);
                buf.push(b'A');
                out.send(&buf);
            }
            self.remote_line = line;
        } else if line > self.remote_line {
            while line > self.remote_line {
                if !self.console_mode {
                    out.send(b"\r\n");
                }
                self.remote_line += 1;
            }
        } else {
            out.send(b"\r");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::core::cell::{COMMON_LVB_LEADING_BYTE as LEAD,
                            COMMON_LVB_TRAILING_BYTE as TRAIL};

    fn row(text: &str, attributes: u16) -> Vec<Cell> {
        text.encode_utf16()
            .map(|unit| Cell::new(unit, attributes))
            .collect()
    }

    fn padded_row(text: &str, attributes: u16, width: usize) -> Vec<Cell> {
        let mut cells = row(text, attributes);
        cells.resize(width, Cell::blank(attributes));
        cells
    }

    fn text(out: &[u8]) -> String { String::from_utf8(out.to_vec()).unwrap() }

    #[test]
    fn first_line_emission() {
        let mut term = Terminal::new();
        let mut out = Vec::new();
        term.send_line(&mut out, 0, &padded_row("hello", 7, 80));
        // Hide cursor, stay on line 0, default color, text, erase to EOL.
        assert_eq!(text(&out), "\x1b[?25l\r\x1b[0mhello\x1b[0K");
    }

    #[test]
    fn finish_output_restores_cursor() {
        let mut term = Terminal::new();
        let mut out = Vec::new();
        term.send_line(&mut out, 0, &padded_row("hello", 7, 80));
        out.clear();
        term.finish_output(&mut out, (0, 1));
        // Down one line, column 1, show cursor.
        assert_eq!(text(&out), "\r\n\x1b[1G\x1b[?25h");
    }

    #[test]
    fn quiescent_tick_emits_nothing() {
        let mut term = Terminal::new();
        let mut out = Vec::new();
        term.send_line(&mut out, 0, &padded_row("hello", 7, 80));
        term.finish_output(&mut out, (5, 0));
        out.clear();
        // Same cursor position, no lines sent: nothing goes out.
        term.finish_output(&mut out, (5, 0));
        assert_eq!(text(&out), "");
    }

    #[test]
    fn overwrite_moves_cursor_up() {
        let mut term = Terminal::new();
        let mut out = Vec::new();
        term.send_line(&mut out, 0, &padded_row("A", 7, 80));
        term.finish_output(&mut out, (1, 0));
        out.clear();
        term.send_line(&mut out, 0, &padded_row("B", 7, 80));
        term.finish_output(&mut out, (1, 0));
        // Cursor hides, returns to column 0 on the same line, rewrites.
        assert_eq!(text(&out), "\x1b[?25l\rB\x1b[0K\r\x1b[2G\x1b[?25h");
    }

    #[test]
    fn upward_motion_uses_cuu_not_cpl() {
        let mut term = Terminal::new();
        let mut out = Vec::new();
        term.send_line(&mut out, 5, &padded_row("five", 7, 80));
        out.clear();
        term.send_line(&mut out, 2, &padded_row("two", 7, 80));
        let s = text(&out);
        assert!(s.contains("\r\x1b[3A"), "got {s:?}");
        assert!(!s.contains("\x1b[F"));
    }

    #[test]
    fn downward_motion_is_crlf_per_line() {
        let mut term = Terminal::new();
        let mut out = Vec::new();
        term.send_line(&mut out, 0, &padded_row("a", 7, 80));
        out.clear();
        term.send_line(&mut out, 3, &padded_row("b", 7, 80));
        assert!(text(&out).starts_with("\r\n\r\n\r\n"));
    }

    #[test]
    fn full_last_cell_erases_one_early() {
        let mut term = Terminal::new();
        let mut out = Vec::new();
        term.send_line(&mut out, 0, &row("ab", 7));
        // Erase appears before the final character, not after it.
        assert_eq!(text(&out), "\x1b[?25l\r\x1b[0ma\x1b[0Kb");
    }

    #[test]
    fn color_change_mid_line() {
        let mut term = Terminal::new();
        let mut out = Vec::new();
        let mut cells = row("ab", 7);
        cells[1].attributes = 0x0F;
        term.send_line(&mut out, 0, &cells);
        let s = text(&out);
        assert!(s.contains("\x1b[0ma"), "got {s:?}");
        assert!(s.contains("\x1b[0;1m"), "got {s:?}");
    }

    #[test]
    fn trailing_spaces_are_trimmed_but_color_resets_before_them() {
        let mut term = Terminal::new();
        let mut out = Vec::new();
        term.send_line(&mut out, 0, &padded_row("hi", 7, 40));
        let s = text(&out);
        assert!(s.ends_with("hi\x1b[0K"), "got {s:?}");
    }

    #[test]
    fn astral_code_point_emits_one_character() {
        let mut term = Terminal::new();
        let mut out = Vec::new();
        let cells = vec![
            Cell::new(0xD840, 7 | LEAD),
            Cell::new(0xD840, 7 | TRAIL),
            Cell::new(0xDC00, 7 | LEAD),
            Cell::new(0xDC00, 7 | TRAIL),
        ];
        term.send_line(&mut out, 0, &cells);
        let s = text(&out);
        let expected = char::from_u32(0x20000).unwrap().to_string();
        assert_eq!(s.matches(&expected).count(), 1, "got {s:?}");
    }

    #[test]
    fn full_width_character_at_right_edge() {
        let mut term = Terminal::new();
        let mut out = Vec::new();
        let mut cells = padded_row("x", 7, 8);
        cells[6] = Cell::new(0x4E2D, 7 | LEAD);
        cells[7] = Cell::new(0x4E2D, 7 | TRAIL);
        term.send_line(&mut out, 0, &cells);
        let s = text(&out);
        assert_eq!(s.matches('中').count(), 1, "got {s:?}");
        // Erase was issued early because the pair consumed the line.
        assert!(!s.ends_with("\x1b[0K"), "got {s:?}");
    }

    #[test]
    fn box_art_cells_render_double_line_borders() {
        let mut term = Terminal::new();
        let mut out = Vec::new();
        let cells = vec![Cell::new(1, 7), Cell::new(6, 7), Cell::new(2, 7)];
        term.send_line(&mut out, 0, &cells);
        let s = text(&out);
        assert!(s.contains('╔'), "got {s:?}");
        assert!(s.contains('╗'), "got {s:?}");
    }

    #[test]
    fn console_mode_suppresses_escapes() {
        let mut term = Terminal::new();
        term.set_console_mode(1);
        let mut out = Vec::new();
        term.reset(&mut out, SendClearFlag::SendClear, 0);
        term.send_line(&mut out, 0, &padded_row("plain", 7, 80));
        term.finish_output(&mut out, (5, 0));
        // Bare carriage returns survive bypass mode; escapes do not.
        assert_eq!(text(&out), "\rplain\r");
    }

    #[test]
    fn reset_with_clear_homes_and_erases() {
        let mut term = Terminal::new();
        let mut out = Vec::new();
        term.reset(&mut out, SendClearFlag::SendClear, 10);
        assert_eq!(text(&out), "\x1b[0m\x1b[1;1H\x1b[2J");
        out.clear();
        term.send_line(&mut out, 10, &padded_row("x", 7, 80));
        // Cursor is already on virtual line 10 after the reset.
        assert!(text(&out).starts_with("\x1b[?25l\r"));
    }
}
