// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Ring of logical lines already emitted (or about to be emitted) to the
//! terminal, keyed by virtual line number.
//!
//! A *virtual line number* is `buffer_row + scrolled_count`: it grows
//! monotonically as the console scrolls and never renames content. Once a
//! virtual line has been sent to the terminal, its ring slot holds the
//! authoritative copy used for change detection until the ring wraps around
//! and a newer virtual line claims the slot.

use smallvec::SmallVec;

use crate::core::Cell;

/// Cells for one emitted line plus the state change detection needs.
#[derive(Debug, Clone, Default)]
pub struct ConsoleLine {
    cells: SmallVec<[Cell; 128]>,
}

impl ConsoleLine {
    /// Forget the previous contents entirely. The next comparison will
    /// report a change for any non-empty row.
    pub fn reset(&mut self) { self.cells.clear(); }

    /// Fill with `width` blank cells carrying `attributes`.
    pub fn blank(&mut self, attributes: u16, width: usize) {
        self.cells.clear();
        self.cells.resize(width, Cell::blank(attributes));
    }

    /// Overwrite with `cells` unconditionally.
    pub fn set_line(&mut self, cells: &[Cell]) {
        self.cells.clear();
        self.cells.extend_from_slice(cells);
    }

    /// Compare against the stored copy; if anything differs (including the
    /// width), store the new cells and report true.
    pub fn detect_change_and_set_line(&mut self, cells: &[Cell]) -> bool {
        if self.cells.as_slice() == cells {
            return false;
        }
        self.set_line(cells);
        true
    }

    #[must_use]
    pub fn cells(&self) -> &[Cell] { self.cells.as_slice() }
}

/// Fixed-size ring of [`ConsoleLine`] indexed by virtual line number.
#[derive(Debug)]
pub struct LineBuffer {
    lines: Vec<ConsoleLine>,
}

impl LineBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: vec![ConsoleLine::default(); capacity],
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize { self.lines.len() }

    /// Ring slot for a virtual line.
    #[must_use]
    pub fn line(&self, virtual_line: i64) -> &ConsoleLine {
        &self.lines[self.slot(virtual_line)]
    }

    pub fn line_mut(&mut self, virtual_line: i64) -> &mut ConsoleLine {
        let slot = self.slot(virtual_line);
        &mut self.lines[slot]
    }

    /// Blank a virtual line's slot, as when the console clears rows above
    /// the window during a resize.
    pub fn blank(&mut self, virtual_line: i64, attributes: u16, width: usize) {
        self.line_mut(virtual_line).blank(attributes, width);
    }

    /// Forget every line. Used when tracking is reset and the terminal is
    /// cleared.
    pub fn reset_all(&mut self) {
        for line in &mut self.lines {
            line.reset();
        }
    }

    fn slot(&self, virtual_line: i64) -> usize {
        debug_assert!(virtual_line >= 0, "virtual line went negative");
        (virtual_line as usize) % self.lines.len()
    }
}
