// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! An in-memory console for tests.
//!
//! Implements [`ConsoleApi`] over a simulated screen buffer with enough host
//! behavior for the scraper scenarios: cursor-driven text output that slides
//! the window and scrolls the buffer, region fills, freeze bookkeeping, and
//! the legacy-Mark cursor quirk the startup probe looks for.

use super::{ConsoleApi, ConsoleError, ConsoleResult, FreezeCommand};
use crate::core::{Cell, Coord, Rect, ScreenBufferInfo};
use crate::input::records::InputRecord;

#[derive(Debug)]
pub struct TestConsole {
    buffer: Vec<Cell>,
    buffer_size: Coord,
    window: Rect,
    cursor: Coord,
    attributes: u16,
    title: String,
    frozen: bool,
    mark_moves_cursor: bool,
    supports_large_reads: bool,
    require_freeze_for_reads: bool,
    processed_input: bool,
    mouse_input: bool,
    read_calls: usize,
    scrolled_out: i64,
    ctrl_c_events: usize,
    close_posted: bool,
    input_records: Vec<InputRecord>,
}

impl TestConsole {
    #[must_use]
    pub fn new(buffer_size: Coord, window: Rect) -> Self {
        let len = buffer_size.x as usize * buffer_size.y as usize;
        Self {
            buffer: vec![Cell::blank(7); len],
            buffer_size,
            window,
            cursor: Coord::new(0, 0),
            attributes: 7,
            title: String::new(),
            frozen: false,
            mark_moves_cursor: false,
            supports_large_reads: true,
            require_freeze_for_reads: false,
            processed_input: true,
            mouse_input: false,
            read_calls: 0,
            scrolled_out: 0,
            ctrl_c_events: 0,
            close_posted: false,
            input_records: Vec::new(),
        }
    }

    // ---------- knobs ----------

    pub fn set_mark_moves_cursor(&mut self, value: bool) { self.mark_moves_cursor = value; }

    pub fn set_supports_large_reads(&mut self, value: bool) {
        self.supports_large_reads = value;
    }

    /// When set, any cell read outside a freeze window panics. The scraper
    /// tests turn this on to pin the freeze invariant.
    pub fn set_require_freeze_for_reads(&mut self, value: bool) {
        self.require_freeze_for_reads = value;
    }

    pub fn set_processed_input(&mut self, value: bool) { self.processed_input = value; }

    pub fn set_mouse_input(&mut self, value: bool) { self.mouse_input = value; }

    // ---------- inspection ----------

    #[must_use]
    pub fn is_frozen(&self) -> bool { self.frozen }

    #[must_use]
    pub fn read_call_count(&self) -> usize { self.read_calls }

    #[must_use]
    pub fn scrolled_out_rows(&self) -> i64 { self.scrolled_out }

    #[must_use]
    pub fn ctrl_c_event_count(&self) -> usize { self.ctrl_c_events }

    #[must_use]
    pub fn close_was_posted(&self) -> bool { self.close_posted }

    #[must_use]
    pub fn cell_at(&self, x: i16, y: i16) -> Cell {
        self.buffer[self.index(x, y)]
    }

    pub fn take_input_records(&mut self) -> Vec<InputRecord> {
        std::mem::take(&mut self.input_records)
    }

    // ---------- child-process emulation ----------

    /// Place text directly into the buffer without touching the cursor.
    pub fn poke_text(&mut self, x: i16, y: i16, text: &str) {
        let attributes = self.attributes;
        for (i, unit) in text.encode_utf16().enumerate() {
            let idx = self.index(x + i as i16, y);
            self.buffer[idx] = Cell::new(unit, attributes);
        }
    }

    /// Emulate the child writing through the cooked console: characters
    /// advance the cursor, the window slides down to keep the cursor
    /// visible, and output past the last buffer row scrolls the buffer.
    pub fn write_text(&mut self, text: &str) {
        assert!(!self.frozen, "child output while console frozen");
        for unit in text.encode_utf16() {
            match unit {
                0x0D => self.cursor.x = 0,
                0x0A => self.feed_line(),
                _ => {
                    let idx = self.index(self.cursor.x, self.cursor.y);
                    self.buffer[idx] = Cell::new(unit, self.attributes);
                    self.cursor.x += 1;
                    if self.cursor.x >= self.buffer_size.x {
                        self.cursor.x = 0;
                        self.feed_line();
                    }
                }
            }
        }
        self.follow_cursor();
    }

    /// Emulate CLS: fill the buffer, home the cursor, window to the top.
    pub fn clear_screen(&mut self) {
        assert!(!self.frozen, "child CLS while console frozen");
        let blank = Cell::blank(self.attributes);
        self.buffer.fill(blank);
        self.cursor = Coord::new(0, 0);
        self.window.top = 0;
    }

    fn feed_line(&mut self) {
        self.cursor.y += 1;
        if self.cursor.y >= self.buffer_size.y {
            let overflow = self.cursor.y - self.buffer_size.y + 1;
            self.scroll_buffer(overflow);
            self.cursor.y = self.buffer_size.y - 1;
        }
        self.follow_cursor();
    }

    fn scroll_buffer(&mut self, rows: i16) {
        let width = self.buffer_size.x as usize;
        let shift = rows as usize * width;
        self.buffer.drain(..shift);
        self.buffer
            .resize(self.buffer.len() + shift, Cell::blank(self.attributes));
        self.scrolled_out += i64::from(rows);
    }

    fn follow_cursor(&mut self) {
        if self.cursor.y > self.window.bottom() {
            self.window.top = self.cursor.y - self.window.height + 1;
        }
        let max_top = self.buffer_size.y - self.window.height;
        self.window.top = self.window.top.clamp(0, max_top.max(0));
    }

    fn index(&self, x: i16, y: i16) -> usize {
        assert!(
            x >= 0 && x < self.buffer_size.x && y >= 0 && y < self.buffer_size.y,
            "cell ({x},{y}) outside buffer {:?}",
            self.buffer_size
        );
        y as usize * self.buffer_size.x as usize + x as usize
    }
}

impl ConsoleApi for TestConsole {
    fn reopen(&mut self) -> ConsoleResult<()> { Ok(()) }

    fn buffer_info(&mut self) -> ConsoleResult<ScreenBufferInfo> {
        Ok(ScreenBufferInfo {
            buffer_size: self.buffer_size,
            window: self.window,
            cursor: self.cursor,
            attributes: self.attributes,
        })
    }

    fn resize_buffer(&mut self, size: Coord) -> ConsoleResult<()> {
        if self.frozen {
            // The host refuses to resize while a selection is open.
            return Err(ConsoleError::new("SetConsoleScreenBufferSize", 5));
        }
        let mut next = vec![Cell::blank(self.attributes); size.x as usize * size.y as usize];
        for y in 0..size.y.min(self.buffer_size.y) {
            for x in 0..size.x.min(self.buffer_size.x) {
                next[y as usize * size.x as usize + x as usize] = self.cell_at(x, y);
            }
        }
        self.buffer = next;
        self.buffer_size = size;
        self.cursor.x = self.cursor.x.min(size.x - 1);
        self.cursor.y = self.cursor.y.min(size.y - 1);
        self.window.width = self.window.width.min(size.x);
        self.window.height = self.window.height.min(size.y);
        self.window.left = 0;
        self.window.top = self.window.top.clamp(0, size.y - self.window.height);
        Ok(())
    }

    fn move_window(&mut self, rect: Rect) -> ConsoleResult<()> {
        let width = rect.width.min(self.buffer_size.x);
        let height = rect.height.min(self.buffer_size.y);
        let left = rect.left.clamp(0, self.buffer_size.x - width);
        let top = rect.top.clamp(0, self.buffer_size.y - height);
        self.window = Rect::new(left, top, width, height);
        Ok(())
    }

    fn set_cursor_position(&mut self, pos: Coord) -> ConsoleResult<()> {
        self.cursor = pos;
        Ok(())
    }

    fn set_text_attribute(&mut self, attributes: u16) -> ConsoleResult<()> {
        self.attributes = attributes;
        Ok(())
    }

    fn clear_lines(
        &mut self,
        row: i16,
        count: i16,
        info: &ScreenBufferInfo,
    ) -> ConsoleResult<()> {
        let blank = Cell::blank(info.attributes);
        if count <= 0 {
            return Ok(());
        }
        let start = self.index(0, row);
        let len = self.buffer_size.x as usize * count as usize;
        let end = (start + len).min(self.buffer.len());
        self.buffer[start..end].fill(blank);
        Ok(())
    }

    fn read(&mut self, rect: Rect, data: &mut [Cell]) -> ConsoleResult<()> {
        if self.require_freeze_for_reads {
            assert!(self.frozen, "cell read while console unfrozen: {rect:?}");
        }
        self.read_calls += 1;
        let width = rect.width as usize;
        for row in 0..rect.height {
            let src = self.index(rect.left, rect.top + row);
            let dst = row as usize * width;
            data[dst..dst + width].copy_from_slice(&self.buffer[src..src + width]);
        }
        Ok(())
    }

    fn write(&mut self, rect: Rect, data: &[Cell]) -> ConsoleResult<()> {
        let width = rect.width as usize;
        for row in 0..rect.height {
            let dst = self.index(rect.left, rect.top + row);
            let src = row as usize * width;
            self.buffer[dst..dst + width].copy_from_slice(&data[src..src + width]);
        }
        Ok(())
    }

    fn write_input(&mut self, records: &[InputRecord]) -> ConsoleResult<()> {
        self.input_records.extend_from_slice(records);
        Ok(())
    }

    fn title(&mut self) -> ConsoleResult<String> { Ok(self.title.clone()) }

    fn set_title(&mut self, title: &str) -> ConsoleResult<()> {
        self.title = title.to_owned();
        Ok(())
    }

    fn processed_input_mode(&mut self) -> bool { self.processed_input }

    fn mouse_input_enabled(&mut self) -> bool { self.mouse_input }

    fn generate_ctrl_c_event(&mut self) { self.ctrl_c_events += 1; }

    fn post_close_message(&mut self) { self.close_posted = true; }

    fn send_sys_command(&mut self, command: FreezeCommand) {
        self.frozen = true;
        if command == FreezeCommand::Mark && self.mark_moves_cursor {
            // Legacy hosts move the reported cursor to the selection anchor.
            self.cursor = Coord::new(0, 0);
        }
    }

    fn send_escape(&mut self) { self.frozen = false; }

    fn supports_large_reads(&self) -> bool { self.supports_large_reads }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn write_text_advances_and_wraps() {
        let mut console = TestConsole::new(Coord::new(4, 10), Rect::new(0, 0, 4, 3));
        console.write_text("abcde");
        assert_eq!(console.cell_at(0, 0).unit, u16::from(b'a'));
        assert_eq!(console.cell_at(3, 0).unit, u16::from(b'd'));
        assert_eq!(console.cell_at(0, 1).unit, u16::from(b'e'));
        assert_eq!(console.cursor, Coord::new(1, 1));
    }

    #[test]
    fn window_follows_cursor_down() {
        let mut console = TestConsole::new(Coord::new(10, 30), Rect::new(0, 0, 10, 5));
        for _ in 0..9 {
            console.write_text("x\r\n");
        }
        assert_eq!(console.cursor.y, 9);
        assert_eq!(console.window.top, 5);
        assert_eq!(console.scrolled_out_rows(), 0);
    }

    #[test]
    fn buffer_scrolls_at_bottom() {
        let mut console = TestConsole::new(Coord::new(10, 6), Rect::new(0, 0, 10, 4));
        for i in 0..8 {
            console.write_text(&format!("l{i}\r\n"));
        }
        // Ten cursor rows requested in a six-row buffer: three scrolled out.
        assert_eq!(console.scrolled_out_rows(), 3);
        // Oldest surviving line moved to the top.
        assert_eq!(console.cell_at(1, 0).unit, u16::from(b'3'));
    }

    #[test]
    fn freeze_blocks_reads_when_strict() {
        let mut console = TestConsole::new(Coord::new(10, 10), Rect::new(0, 0, 10, 5));
        console.set_require_freeze_for_reads(true);
        console.send_sys_command(FreezeCommand::SelectAll);
        let mut cells = vec![Cell::default(); 10];
        console.read(Rect::new(0, 0, 10, 1), &mut cells).unwrap();
        console.send_escape();
        assert!(!console.is_frozen());
    }

    #[test]
    fn resize_refused_while_frozen() {
        let mut console = TestConsole::new(Coord::new(10, 10), Rect::new(0, 0, 10, 5));
        console.send_sys_command(FreezeCommand::Mark);
        assert!(console.resize_buffer(Coord::new(20, 10)).is_err());
        console.send_escape();
        assert!(console.resize_buffer(Coord::new(20, 10)).is_ok());
    }
}
