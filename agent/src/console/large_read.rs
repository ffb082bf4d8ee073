// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Bulk cell reads that respect host size limits.
//!
//! A single `ReadConsoleOutputW` call fails on older hosts when the target
//! rectangle is too large (the call marshals the whole rectangle through one
//! allocation). Hosts from Windows 8 on are known to handle a full-height
//! read of [`crate::MAX_CONSOLE_WIDTH`] columns, so the splitting is skipped
//! there.

use super::{ConsoleApi, ConsoleResult};
use crate::core::{Cell, Rect};
use crate::MAX_CONSOLE_WIDTH;

/// Destination of a (possibly split) bulk read: the union rectangle plus
/// row-major cell storage, addressable by buffer row.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    rect: Rect,
    data: Vec<Cell>,
}

impl ReadBuffer {
    #[must_use]
    pub fn rect(&self) -> Rect { self.rect }

    /// Cells of one buffer row inside the read rectangle.
    #[must_use]
    pub fn line_data(&self, row: i16) -> &[Cell] {
        let idx = self.line_start(row);
        &self.data[idx..idx + self.rect.width as usize]
    }

    fn line_data_mut(&mut self, row: i16) -> &mut [Cell] {
        let idx = self.line_start(row);
        let width = self.rect.width as usize;
        &mut self.data[idx..idx + width]
    }

    fn line_start(&self, row: i16) -> usize {
        debug_assert!(
            row >= self.rect.top && row <= self.rect.bottom(),
            "row {row} outside read rect {:?}",
            self.rect
        );
        (row - self.rect.top) as usize * self.rect.width as usize
    }
}

/// Read `read_area` into `out`, splitting into row-contiguous sub-reads when
/// the host cannot take the whole rectangle at once.
pub fn large_console_read(
    out: &mut ReadBuffer,
    console: &mut dyn ConsoleApi,
    read_area: Rect,
) -> ConsoleResult<()> {
    debug_assert!(
        read_area.left >= 0
            && read_area.top >= 0
            && read_area.width >= 1
            && read_area.height >= 1
            && i32::from(read_area.width) <= MAX_CONSOLE_WIDTH,
        "invalid read area {read_area:?}"
    );

    let count = read_area.width as usize * read_area.height as usize;
    if out.data.len() < count {
        out.data.resize(count, Cell::default());
    }
    out.rect = read_area;

    if console.supports_large_reads() {
        return console.read(read_area, &mut out.data[..count]);
    }

    let max_read_lines =
        (MAX_CONSOLE_WIDTH / i32::from(read_area.width)).max(1) as i16;
    let mut cur_line = read_area.top;
    while cur_line <= read_area.bottom() {
        let sub_read_area = Rect::new(
            read_area.left,
            cur_line,
            read_area.width,
            max_read_lines.min(read_area.bottom() + 1 - cur_line),
        );
        console.read(sub_read_area, out.line_data_mut(cur_line))?;
        cur_line = sub_read_area.bottom() + 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::test_fixtures::TestConsole;
    use super::*;
    use crate::core::Coord;

    fn console_with_rows(rows: i16) -> TestConsole {
        let mut console =
            TestConsole::new(Coord::new(2000, rows), Rect::new(0, 0, 80, 25));
        for row in 0..rows {
            console.poke_text(0, row, &format!("row{row}"));
        }
        console
    }

    #[test]
    fn single_read_on_new_hosts() {
        let mut console = console_with_rows(40);
        console.set_supports_large_reads(true);
        let mut out = ReadBuffer::default();
        large_console_read(&mut out, &mut console, Rect::new(0, 0, 2000, 40)).unwrap();
        assert_eq!(console.read_call_count(), 1);
        assert_eq!(out.line_data(39)[3].unit, u16::from(b'3'));
    }

    #[test]
    fn wide_read_splits_by_rows_on_old_hosts() {
        let mut console = console_with_rows(40);
        console.set_supports_large_reads(false);
        let mut out = ReadBuffer::default();
        large_console_read(&mut out, &mut console, Rect::new(0, 0, 2000, 40)).unwrap();
        // 2500 / 2000 = 1 row per sub-read.
        assert_eq!(console.read_call_count(), 40);
        for row in 0..40i16 {
            let line = out.line_data(row);
            assert_eq!(line[0].unit, u16::from(b'r'), "row {row}");
        }
        assert_eq!(out.rect(), Rect::new(0, 0, 2000, 40));
    }

    #[test]
    fn narrow_read_batches_multiple_rows() {
        let mut console = TestConsole::new(Coord::new(80, 100), Rect::new(0, 0, 80, 25));
        console.set_supports_large_reads(false);
        let mut out = ReadBuffer::default();
        large_console_read(&mut out, &mut console, Rect::new(0, 10, 80, 90)).unwrap();
        // 2500 / 80 = 31 rows per sub-read; 90 rows take 3 reads.
        assert_eq!(console.read_call_count(), 3);
    }

    #[test]
    fn offset_rect_rows_address_buffer_coordinates() {
        let mut console = console_with_rows(50);
        console.set_supports_large_reads(true);
        let mut out = ReadBuffer::default();
        large_console_read(&mut out, &mut console, Rect::new(0, 20, 100, 10)).unwrap();
        assert_eq!(out.line_data(20)[0].unit, u16::from(b'r'));
        assert_eq!(out.line_data(29)[3].unit, u16::from(b'2'));
    }
}
