// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The terminal byte-stream decoder.
//!
//! Consumes bytes arriving on the data pipe and turns them into synthetic
//! console input records. Matching is attempted in a fixed order: Ctrl-C
//! (when the host has processed input on), the DSR reply, mouse reports,
//! the escape-sequence dictionary, Alt-prefixed characters, and finally
//! plain UTF-8 text.
//!
//! A prefix that *could* still become a longer match is held in the byte
//! queue. Two mechanisms bound the wait: a Device Status Report query sent
//! to the terminal acts as a barrier (its reply proves any fragment before
//! it arrived in full), and a 1 second timeout flushes the queue as literal
//! bytes, which is how a lone Escape press gets through.

use super::default_map::add_default_entries;
use super::map::{InputMap, MappedKey};
use super::mouse::{match_dsr, match_mouse_report, MatchResult, MouseReport};
use super::platform::{default_layout, Clock, KeyboardLayout, SystemClock};
use super::records::{InputRecord, MouseEvent, DOUBLE_CLICK,
                     FROM_LEFT_1ST_BUTTON_PRESSED, FROM_LEFT_2ND_BUTTON_PRESSED,
                     LEFT_ALT_PRESSED, LEFT_CTRL_PRESSED, MOUSE_MOVED,
                     MOUSE_WHEELED, RIGHTMOST_BUTTON_PRESSED, SHIFT_PRESSED,
                     VK_CONTROL, VK_MENU, VK_SHIFT};
use super::DsrSender;
use crate::console::ConsoleApi;
use crate::core::unicode::{decode_utf8_char, encode_utf16, utf8_sequence_len};
use crate::core::{Coord, Rect};

/// How long a partial escape sequence may wait for its tail.
pub const INCOMPLETE_ESCAPE_TIMEOUT_MS: u32 = 1000;

/// Mouse wheel button-state words: +120 and -120 deltas in the high word.
const WHEEL_UP_BUTTON_STATE: u32 = 0x0078_0000;
const WHEEL_DOWN_BUTTON_STATE: u32 = 0xff88_0000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct DoubleClickDetection {
    button: u32,
    pos: Coord,
    tick: u32,
    released: bool,
}

#[derive(Debug)]
pub struct ConsoleInput {
    input_map: InputMap,
    byte_queue: Vec<u8>,
    dsr_sent: bool,
    last_write_tick: u32,
    mouse_button_state: u32,
    double_click: DoubleClickDetection,
    mouse_window_rect: Rect,
    clock: Box<dyn Clock>,
    layout: Box<dyn KeyboardLayout>,
}

impl Default for ConsoleInput {
    fn default() -> Self { Self::new(Box::new(SystemClock), default_layout()) }
}

impl ConsoleInput {
    #[must_use]
    pub fn new(clock: Box<dyn Clock>, layout: Box<dyn KeyboardLayout>) -> Self {
        let mut input_map = InputMap::new();
        add_default_entries(&mut input_map);
        Self {
            input_map,
            byte_queue: Vec::new(),
            dsr_sent: false,
            last_write_tick: 0,
            mouse_button_state: 0,
            double_click: DoubleClickDetection::default(),
            mouse_window_rect: Rect::default(),
            clock,
            layout,
        }
    }

    /// Mouse coordinates arriving from the terminal are clamped into this
    /// rectangle; the scraper refreshes it every tick.
    pub fn set_mouse_window_rect(&mut self, rect: Rect) { self.mouse_window_rect = rect; }

    /// Log every dictionary entry (the `dump_input_map` debug flag).
    pub fn dump_input_map(&self) {
        for (sequence, key) in self.input_map.entries() {
            tracing::info!(
                sequence = %dump_bytes(&sequence),
                virtual_key = key.virtual_key,
                key_state = key.key_state,
                "input map entry"
            );
        }
    }

    /// Feed bytes from the data pipe.
    pub fn write_input(
        &mut self,
        input: &[u8],
        console: &mut dyn ConsoleApi,
        dsr: &mut dyn DsrSender,
    ) {
        if input.is_empty() {
            return;
        }
        tracing::trace!(bytes = %dump_bytes(input), "input chars");
        self.byte_queue.extend_from_slice(input);
        self.do_write(false, console);
        if !self.byte_queue.is_empty() && !self.dsr_sent {
            tracing::debug!("send DSR");
            dsr.send_dsr();
            self.dsr_sent = true;
        }
        self.last_write_tick = self.clock.tick_count();
    }

    /// Called on the poll tick: flush a partial escape sequence that has
    /// waited longer than the timeout, treating the queue as complete.
    pub fn flush_incomplete_escape_code(&mut self, console: &mut dyn ConsoleApi) {
        if !self.byte_queue.is_empty()
            && self
                .clock
                .tick_count()
                .wrapping_sub(self.last_write_tick)
                > INCOMPLETE_ESCAPE_TIMEOUT_MS
        {
            self.do_write(true, console);
            self.byte_queue.clear();
        }
    }

    fn do_write(&mut self, is_eof: bool, console: &mut dyn ConsoleApi) {
        let queue = std::mem::take(&mut self.byte_queue);
        let mut records = Vec::new();
        let mut idx = 0;
        while idx < queue.len() {
            match self.scan_input(&mut records, &queue[idx..], is_eof, console) {
                Some(consumed) => idx += consumed,
                None => break,
            }
        }
        self.byte_queue = queue;
        self.byte_queue.drain(..idx);
        if let Err(error) = console.write_input(&records) {
            tracing::warn!(%error, "WriteConsoleInput failed");
        }
    }

    /// Try to consume one prefix. `None` means "wait for more bytes".
    fn scan_input(
        &mut self,
        records: &mut Vec<InputRecord>,
        input: &[u8],
        is_eof: bool,
        console: &mut dyn ConsoleApi,
    ) -> Option<usize> {
        debug_assert!(!input.is_empty());

        // Ctrl-C bypasses the input queue when the host will turn it into
        // a signal.
        if input[0] == 0x03 && console.processed_input_mode() {
            tracing::debug!("Ctrl-C");
            console.generate_ctrl_c_event();
            return Some(1);
        }

        if input[0] == 0x1B {
            match match_dsr(input) {
                MatchResult::Match(len) => {
                    tracing::debug!("received a DSR reply");
                    self.dsr_sent = false;
                    return Some(len);
                }
                MatchResult::Incomplete if !is_eof => return None,
                _ => {}
            }

            let mut report = MouseReport::default();
            match match_mouse_report(input, &mut report) {
                MatchResult::Match(len) => {
                    self.handle_mouse_report(records, report, console);
                    return Some(len);
                }
                MatchResult::Incomplete if !is_eof => return None,
                _ => {}
            }
        }

        // The escape-sequence dictionary.
        let lookup = self.input_map.lookup_key(input);
        if lookup.incomplete && !is_eof {
            // Need more characters (or the timeout).
            return None;
        }
        if lookup.match_len > 0 {
            self.append_key_press(records, lookup.key);
            return Some(lookup.match_len);
        }

        // Alt-<character>. `ESC ESC` is deliberately not treated as
        // Alt-ESC: a user hammering the Escape key on a slow connection
        // could trigger it by accident.
        if input[0] == 0x1B && input.len() >= 2 && input[1] != 0x1B {
            let char_len = utf8_sequence_len(input[1]);
            if 1 + char_len > input.len() {
                return None;
            }
            self.append_utf8_char(records, &input[1..1 + char_len], LEFT_ALT_PRESSED);
            return Some(1 + char_len);
        }

        // A plain UTF-8 character.
        let char_len = utf8_sequence_len(input[0]);
        if char_len > input.len() {
            return None;
        }
        self.append_utf8_char(records, &input[..char_len], 0);
        Some(char_len)
    }

    fn handle_mouse_report(
        &mut self,
        records: &mut Vec<InputRecord>,
        report: MouseReport,
        console: &mut dyn ConsoleApi,
    ) {
        tracing::trace!(?report, "mouse input");
        let button = (report.flags & 0x03) as u32;
        let rect = self.mouse_window_rect;
        let mut event = MouseEvent {
            position: Coord::new(
                rect.left + report.coord.x.min(rect.width - 1).max(0),
                rect.top + report.coord.y.min(rect.height - 1).max(0),
            ),
            ..MouseEvent::default()
        };

        // The modifier state is neatly independent of everything else.
        if report.flags & 0x04 != 0 {
            event.control_key_state |= SHIFT_PRESSED;
        }
        if report.flags & 0x08 != 0 {
            event.control_key_state |= LEFT_ALT_PRESSED;
        }
        if report.flags & 0x10 != 0 {
            event.control_key_state |= LEFT_CTRL_PRESSED;
        }

        if report.flags & 0x40 != 0 {
            event.event_flags |= MOUSE_WHEELED;
            match button {
                0 => event.button_state |= WHEEL_UP_BUTTON_STATE,
                1 => event.button_state |= WHEEL_DOWN_BUTTON_STATE,
                // Invalid wheel button: consume without emitting.
                _ => return,
            }
        } else {
            if report.flags & 0x20 != 0 {
                event.event_flags |= MOUSE_MOVED;
            }
            if button == 3 {
                // "All buttons up" from the encodings without per-button
                // release reporting.
                self.mouse_button_state = 0;
                self.double_click.released = true;
            } else {
                let relevant_flag = match button {
                    0 => FROM_LEFT_1ST_BUTTON_PRESSED,
                    1 => FROM_LEFT_2ND_BUTTON_PRESSED,
                    _ => RIGHTMOST_BUTTON_PRESSED,
                };
                if report.release {
                    self.mouse_button_state &= !relevant_flag;
                    if relevant_flag == self.double_click.button
                        && report.coord == self.double_click.pos
                    {
                        self.double_click.released = true;
                    } else {
                        self.double_click = DoubleClickDetection::default();
                    }
                } else if self.mouse_button_state & relevant_flag == 0 {
                    // The button has been newly pressed. The coordinate
                    // match is exact, which is stricter than Windows, but
                    // Windows compares pixels and we only have cells.
                    self.mouse_button_state |= relevant_flag;
                    let tick = self.clock.tick_count();
                    if self.double_click.button == relevant_flag
                        && self.double_click.pos == report.coord
                        && self.double_click.released
                        && tick.wrapping_sub(self.double_click.tick)
                            < self.clock.double_click_time()
                    {
                        event.event_flags |= DOUBLE_CLICK;
                        self.double_click = DoubleClickDetection::default();
                    } else {
                        self.double_click = DoubleClickDetection {
                            button: relevant_flag,
                            pos: report.coord,
                            tick,
                            released: false,
                        };
                    }
                }
            }
        }

        event.button_state |= self.mouse_button_state;

        if console.mouse_input_enabled() {
            tracing::trace!(?event, "mouse event");
            records.push(InputRecord::Mouse(event));
        }
    }

    fn append_utf8_char(
        &mut self,
        records: &mut Vec<InputRecord>,
        char_bytes: &[u8],
        key_state: u32,
    ) {
        let (scalar, _) = decode_utf8_char(char_bytes);
        let mut units = [0u16; 2];
        let unit_count = encode_utf16(&mut units, scalar);
        for &unit in &units[..unit_count] {
            let (virtual_key, key_state) = match self.layout.key_scan(unit) {
                Some(scan) => (scan.virtual_key, key_state | scan.key_state),
                None => (0, key_state),
            };
            self.append_key_press(
                records,
                MappedKey {
                    virtual_key,
                    unicode_char: unit,
                    key_state,
                },
            );
        }
    }

    /// Expand one logical key press into down/up records with modifier
    /// bracketing: Ctrl, Alt, Shift go down in that order and come back up
    /// in reverse.
    fn append_key_press(&mut self, records: &mut Vec<InputRecord>, key: MappedKey) {
        let ctrl = key.key_state & LEFT_CTRL_PRESSED != 0;
        let alt = key.key_state & LEFT_ALT_PRESSED != 0;
        let shift = key.key_state & SHIFT_PRESSED != 0;
        tracing::trace!(
            virtual_key = key.virtual_key,
            unicode_char = key.unicode_char,
            key_state = key.key_state,
            "keypress"
        );

        let mut unicode_char = key.unicode_char;
        let mut step_state = 0;
        if ctrl {
            step_state |= LEFT_CTRL_PRESSED;
            self.append_record(records, true, VK_CONTROL, 0, step_state);
        }
        if alt {
            step_state |= LEFT_ALT_PRESSED;
            self.append_record(records, true, VK_MENU, 0, step_state);
        }
        if shift {
            step_state |= SHIFT_PRESSED;
            self.append_record(records, true, VK_SHIFT, 0, step_state);
        }
        if ctrl && alt {
            // Matches what the Windows 7 console itself produces.
            unicode_char = 0;
        }
        self.append_record(records, true, key.virtual_key, unicode_char, step_state);
        if alt {
            unicode_char = 0;
        }
        self.append_record(records, false, key.virtual_key, unicode_char, step_state);
        if shift {
            step_state &= !SHIFT_PRESSED;
            self.append_record(records, false, VK_SHIFT, 0, step_state);
        }
        if alt {
            step_state &= !LEFT_ALT_PRESSED;
            self.append_record(records, false, VK_MENU, 0, step_state);
        }
        if ctrl {
            step_state &= !LEFT_CTRL_PRESSED;
            self.append_record(records, false, VK_CONTROL, 0, step_state);
        }
    }

    fn append_record(
        &mut self,
        records: &mut Vec<InputRecord>,
        key_down: bool,
        virtual_key: u16,
        unicode_char: u16,
        key_state: u32,
    ) {
        records.push(InputRecord::key(
            key_down,
            virtual_key,
            self.layout.scan_code(virtual_key),
            unicode_char,
            key_state,
        ));
    }
}

/// Render bytes with Unix control-character carets plus a hex listing.
#[must_use]
pub fn dump_bytes(input: &[u8]) -> String {
    let mut out = String::new();
    for &byte in input {
        match byte {
            0x00..=0x1F => {
                out.push('^');
                out.push(char::from(byte + 0x40));
            }
            0x7F => out.push_str("^?"),
            _ => out.push(char::from(byte)),
        }
    }
    out.push_str(" (");
    for (i, byte) in input.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02X}"));
    }
    out.push(')');
    out
}
