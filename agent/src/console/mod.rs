// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Typed access to the host console.
//!
//! Everything above this module talks to [`ConsoleApi`]; the Windows
//! implementation lives in [`win32`], and an in-memory screen buffer used by
//! the scraper tests lives in [`test_fixtures`].

pub mod large_read;
#[cfg(test)]
pub mod test_fixtures;
#[cfg(windows)]
pub mod win32;

pub use large_read::*;

use crate::core::{Cell, Coord, Rect, ScreenBufferInfo};
use crate::input::records::InputRecord;

/// A console host call failed. The agent's policy for these is trace and
/// skip the tick, so the error carries just enough to trace.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed (os error {code})")]
pub struct ConsoleError {
    pub operation: &'static str,
    pub code: u32,
}

impl ConsoleError {
    #[must_use]
    pub fn new(operation: &'static str, code: u32) -> Self { Self { operation, code } }
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;

/// The two syscommands that freeze console output by opening a selection.
///
/// Before Windows 10, `Mark` moves the cursor position reported by the
/// buffer-info call while `SelectAll` runs quickly, so `SelectAll` is the
/// less intrusive choice. On the new Windows 10 console `Mark` no longer
/// moves the cursor and `SelectAll` burns CPU, so `Mark` wins there. Which
/// host we are on is decided once at startup by
/// [`detect_whether_mark_moves_cursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeCommand {
    Mark,
    SelectAll,
}

impl FreezeCommand {
    /// `WM_SYSCOMMAND` wParam value.
    #[must_use]
    pub const fn syscommand(self) -> u32 {
        match self {
            Self::Mark => 0xFFF2,
            Self::SelectAll => 0xFFF5,
        }
    }
}

/// The host console calls the agent needs, as fallible operations.
pub trait ConsoleApi {
    /// Reopen the active output buffer. The child may have switched screen
    /// buffers since the last tick.
    fn reopen(&mut self) -> ConsoleResult<()>;

    fn buffer_info(&mut self) -> ConsoleResult<ScreenBufferInfo>;

    fn cursor_position(&mut self) -> ConsoleResult<Coord> {
        Ok(self.buffer_info()?.cursor)
    }

    fn window_rect(&mut self) -> ConsoleResult<Rect> {
        Ok(self.buffer_info()?.window)
    }

    fn buffer_size(&mut self) -> ConsoleResult<Coord> {
        Ok(self.buffer_info()?.buffer_size)
    }

    fn resize_buffer(&mut self, size: Coord) -> ConsoleResult<()>;
    fn move_window(&mut self, rect: Rect) -> ConsoleResult<()>;
    fn set_cursor_position(&mut self, pos: Coord) -> ConsoleResult<()>;
    fn set_text_attribute(&mut self, attributes: u16) -> ConsoleResult<()>;

    /// Fill `count` rows starting at `row` with spaces carrying the
    /// snapshot's attribute.
    fn clear_lines(&mut self, row: i16, count: i16, info: &ScreenBufferInfo)
        -> ConsoleResult<()>;

    fn clear_all_lines(&mut self, info: &ScreenBufferInfo) -> ConsoleResult<()> {
        self.clear_lines(0, info.buffer_size.y, info)
    }

    /// Bulk cell read of `rect` into `data` (row-major, `rect` cell count).
    /// Callers go through [`large_console_read`] which splits reads the
    /// host would reject.
    fn read(&mut self, rect: Rect, data: &mut [Cell]) -> ConsoleResult<()>;

    /// Bulk cell write of `rect` from `data`.
    fn write(&mut self, rect: Rect, data: &[Cell]) -> ConsoleResult<()>;

    /// Push synthetic input records into the console input queue.
    fn write_input(&mut self, records: &[InputRecord]) -> ConsoleResult<()>;

    fn title(&mut self) -> ConsoleResult<String>;
    fn set_title(&mut self, title: &str) -> ConsoleResult<()>;

    /// True when the host translates Ctrl-C into a signal
    /// (`ENABLE_PROCESSED_INPUT` on the input handle).
    fn processed_input_mode(&mut self) -> bool;

    /// True when the child has asked for mouse reporting
    /// (`ENABLE_MOUSE_INPUT` set, quick-edit off).
    fn mouse_input_enabled(&mut self) -> bool;

    /// Deliver `CTRL_C_EVENT` to the console's process group.
    fn generate_ctrl_c_event(&mut self);

    /// Ask the hidden console window to close (agent teardown).
    fn post_close_message(&mut self);

    /// Open a selection to freeze console output.
    fn send_sys_command(&mut self, command: FreezeCommand);

    /// Close the selection (a `WM_CHAR` escape) to unfreeze.
    fn send_escape(&mut self);

    /// True on hosts where one bulk read may cover the whole scrape area
    /// (Windows 8 and later).
    fn supports_large_reads(&self) -> bool;
}

/// Startup probe for the freeze syscommand.
///
/// Legacy consoles move the reported cursor when `Mark` opens its
/// selection; the Windows 10 console does not. Shrink to a 2x2 window, park
/// the cursor at (1,1), send `Mark`, and see whether the cursor moved. The
/// caller runs this before the console holds anything worth keeping.
pub fn detect_whether_mark_moves_cursor(
    console: &mut dyn ConsoleApi,
) -> ConsoleResult<bool> {
    let info = console.buffer_info()?;
    console.resize_buffer(Coord::new(
        info.buffer_size.x.max(2),
        info.buffer_size.y.max(2),
    ))?;
    console.move_window(Rect::new(0, 0, 2, 2))?;
    let initial_position = Coord::new(1, 1);
    console.set_cursor_position(initial_position)?;
    console.send_sys_command(FreezeCommand::Mark);
    let moved = console.cursor_position()? != initial_position;
    console.send_escape();
    Ok(moved)
}
