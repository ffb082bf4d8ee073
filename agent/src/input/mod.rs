// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Terminal input decoding.
//!
//! Bytes from the data pipe come in here and synthetic console input
//! records come out. See [`decoder::ConsoleInput`] for the state machine.

pub mod decoder;
pub mod default_map;
pub mod map;
pub mod mouse;
pub mod platform;
pub mod records;
pub mod show_input;

pub use decoder::*;

/// The decoder's one outward capability: queue a Device Status Report
/// query on the data pipe. The reply serves as a barrier proving that any
/// bytes sent before it have arrived in full.
pub trait DsrSender {
    fn send_dsr(&mut self);
}
