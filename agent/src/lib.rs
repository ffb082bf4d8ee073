// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Console-scraping agent.
//!
//! Runs a Windows console child process inside a hidden console and bridges
//! it to a byte-oriented VT100 terminal over a pair of named pipes: a
//! control pipe carrying a small RPC protocol (start the child, resize,
//! query exit status) and a data pipe carrying terminal I/O in both
//! directions.
//!
//! The crate splits into a platform-neutral engine and a thin Windows rim:
//!
//! - [`scraper`] reconstructs an ordered line stream from screen-buffer
//!   snapshots taken under a freeze, [`terminal`] encodes it as VT100,
//!   [`input`] decodes terminal bytes into synthetic input records,
//!   [`line_buffer`] and [`protocol`] support them. All of this compiles
//!   and tests everywhere against [`console::ConsoleApi`].
//! - [`console::win32`], [`pipe`], [`process`], and [`agent`] bind the
//!   engine to the live Win32 console, Tokio named pipes, and
//!   `CreateProcessW`; they exist only on Windows.

pub mod console;
pub mod core;
pub mod debug_env;
pub mod input;
pub mod line_buffer;
pub mod protocol;
pub mod scraper;
pub mod terminal;

#[cfg(windows)]
pub mod agent;
#[cfg(windows)]
pub mod pipe;
#[cfg(windows)]
pub mod process;

/// Height of the agent-owned screen buffer in scrolling mode. A buffer
/// height that differs from this means the child resized it, which is the
/// direct-mode trigger. We must be able to issue a single cell read of
/// [`MAX_CONSOLE_WIDTH`] cells, and one of slightly fewer cells than this
/// row count.
pub const BUFFER_LINE_COUNT: i16 = 3000;

/// Widest console the agent will drive.
pub const MAX_CONSOLE_WIDTH: i32 = 2500;

/// Sync marker width in cells (and rows, since it occupies column 0).
pub const SYNC_MARKER_LEN: usize = 16;

/// Scrape-to-scrape latency bound.
pub const POLL_INTERVAL_MS: u64 = 25;
