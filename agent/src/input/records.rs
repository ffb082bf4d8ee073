// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Synthetic console input records and the Win32 constants that describe
//! them.
//!
//! The decoder produces these platform-neutral records; on Windows they are
//! converted 1:1 into `INPUT_RECORD` structures at the
//! `WriteConsoleInputW` boundary. The constant values below are the Win32
//! ones, kept verbatim so the conversion is a plain copy.

use crate::core::Coord;

// Control-key state flags.
pub const RIGHT_ALT_PRESSED: u32 = 0x0001;
pub const LEFT_ALT_PRESSED: u32 = 0x0002;
pub const RIGHT_CTRL_PRESSED: u32 = 0x0004;
pub const LEFT_CTRL_PRESSED: u32 = 0x0008;
pub const SHIFT_PRESSED: u32 = 0x0010;
pub const NUMLOCK_ON: u32 = 0x0020;
pub const SCROLLLOCK_ON: u32 = 0x0040;
pub const CAPSLOCK_ON: u32 = 0x0080;
pub const ENHANCED_KEY: u32 = 0x0100;

// Mouse button-state flags.
pub const FROM_LEFT_1ST_BUTTON_PRESSED: u32 = 0x0001;
pub const RIGHTMOST_BUTTON_PRESSED: u32 = 0x0002;
pub const FROM_LEFT_2ND_BUTTON_PRESSED: u32 = 0x0004;
pub const FROM_LEFT_3RD_BUTTON_PRESSED: u32 = 0x0008;
pub const FROM_LEFT_4TH_BUTTON_PRESSED: u32 = 0x0010;

// Mouse event flags.
pub const MOUSE_MOVED: u32 = 0x0001;
pub const DOUBLE_CLICK: u32 = 0x0002;
pub const MOUSE_WHEELED: u32 = 0x0004;
pub const MOUSE_HWHEELED: u32 = 0x0008;

// Virtual-key codes the default escape dictionary uses.
pub const VK_BACK: u16 = 0x08;
pub const VK_TAB: u16 = 0x09;
pub const VK_CLEAR: u16 = 0x0C;
pub const VK_RETURN: u16 = 0x0D;
pub const VK_SHIFT: u16 = 0x10;
pub const VK_CONTROL: u16 = 0x11;
pub const VK_MENU: u16 = 0x12;
pub const VK_PAUSE: u16 = 0x13;
pub const VK_ESCAPE: u16 = 0x1B;
pub const VK_SPACE: u16 = 0x20;
pub const VK_PRIOR: u16 = 0x21;
pub const VK_NEXT: u16 = 0x22;
pub const VK_END: u16 = 0x23;
pub const VK_HOME: u16 = 0x24;
pub const VK_LEFT: u16 = 0x25;
pub const VK_UP: u16 = 0x26;
pub const VK_RIGHT: u16 = 0x27;
pub const VK_DOWN: u16 = 0x28;
pub const VK_INSERT: u16 = 0x2D;
pub const VK_DELETE: u16 = 0x2E;
pub const VK_F1: u16 = 0x70;
pub const VK_F2: u16 = 0x71;
pub const VK_F3: u16 = 0x72;
pub const VK_F4: u16 = 0x73;
pub const VK_F5: u16 = 0x74;
pub const VK_F6: u16 = 0x75;
pub const VK_F7: u16 = 0x76;
pub const VK_F8: u16 = 0x77;
pub const VK_F9: u16 = 0x78;
pub const VK_F10: u16 = 0x79;
pub const VK_F11: u16 = 0x7A;
pub const VK_F12: u16 = 0x7B;

/// One `KEY_EVENT_RECORD`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_down: bool,
    pub repeat_count: u16,
    pub virtual_key: u16,
    pub scan_code: u16,
    pub unicode_char: u16,
    pub control_key_state: u32,
}

/// One `MOUSE_EVENT_RECORD`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseEvent {
    pub position: Coord,
    pub button_state: u32,
    pub control_key_state: u32,
    pub event_flags: u32,
}

/// A synthetic console input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRecord {
    Key(KeyEvent),
    Mouse(MouseEvent),
}

impl InputRecord {
    #[must_use]
    pub fn key(
        key_down: bool,
        virtual_key: u16,
        scan_code: u16,
        unicode_char: u16,
        control_key_state: u32,
    ) -> Self {
        Self::Key(KeyEvent {
            key_down,
            repeat_count: 1,
            virtual_key,
            scan_code,
            unicode_char,
            control_key_state,
        })
    }
}

/// Human-readable virtual-key name for `--show-input` dumps.
#[must_use]
pub fn virtual_key_name(virtual_key: u16) -> String {
    let known = match virtual_key {
        0x08 => "Back",
        0x09 => "Tab",
        0x0C => "Clear",
        0x0D => "Return",
        0x10 => "Shift",
        0x11 => "Control",
        0x12 => "Menu",
        0x13 => "Pause",
        0x1B => "Escape",
        0x20 => "Space",
        0x21 => "Prior",
        0x22 => "Next",
        0x23 => "End",
        0x24 => "Home",
        0x25 => "Left",
        0x26 => "Up",
        0x27 => "Right",
        0x28 => "Down",
        0x2D => "Insert",
        0x2E => "Delete",
        _ => "",
    };
    if !known.is_empty() {
        return known.to_owned();
    }
    if (0x70..=0x7B).contains(&virtual_key) {
        return format!("F{}", virtual_key - 0x6F);
    }
    if (0x30..=0x39).contains(&virtual_key) || (0x41..=0x5A).contains(&virtual_key) {
        return char::from(virtual_key as u8).to_string();
    }
    format!("0x{virtual_key:02X}")
}
