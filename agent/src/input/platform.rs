// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Host services the decoder depends on, behind seams so the state machine
//! is testable with a scripted clock and a fixed keyboard layout.

use super::records::{LEFT_ALT_PRESSED, LEFT_CTRL_PRESSED, SHIFT_PRESSED, VK_BACK,
                     VK_ESCAPE, VK_RETURN, VK_SPACE, VK_TAB};

/// Millisecond tick source plus the system double-click interval.
pub trait Clock: std::fmt::Debug {
    /// Monotonic-ish milliseconds, wrapping like `GetTickCount`.
    fn tick_count(&self) -> u32;
    /// Maximum press-to-press interval for a double click.
    fn double_click_time(&self) -> u32;
}

/// The live system clock.
#[derive(Debug, Default)]
pub struct SystemClock;

#[cfg(windows)]
impl Clock for SystemClock {
    fn tick_count(&self) -> u32 {
        unsafe { windows_sys::Win32::System::SystemInformation::GetTickCount() }
    }

    fn double_click_time(&self) -> u32 {
        unsafe { windows_sys::Win32::UI::Input::KeyboardAndMouse::GetDoubleClickTime() }
    }
}

#[cfg(not(windows))]
impl Clock for SystemClock {
    fn tick_count(&self) -> u32 {
        use std::sync::OnceLock;
        use std::time::Instant;
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        let epoch = *EPOCH.get_or_init(Instant::now);
        epoch.elapsed().as_millis() as u32
    }

    fn double_click_time(&self) -> u32 { 500 }
}

/// Result of asking the layout how to type one UTF-16 code unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyScan {
    pub virtual_key: u16,
    pub key_state: u32,
}

/// Keyboard layout queries (`VkKeyScan` / `MapVirtualKey`).
pub trait KeyboardLayout: std::fmt::Debug {
    /// Virtual key plus modifier set producing `unit`, or `None` when the
    /// layout cannot type it.
    fn key_scan(&self, unit: u16) -> Option<KeyScan>;

    /// Scan code for a virtual key.
    fn scan_code(&self, virtual_key: u16) -> u16;
}

/// The layout of the session's real keyboard.
#[cfg(windows)]
#[derive(Debug, Default)]
pub struct NativeLayout;

#[cfg(windows)]
impl KeyboardLayout for NativeLayout {
    fn key_scan(&self, unit: u16) -> Option<KeyScan> {
        use windows_sys::Win32::UI::Input::KeyboardAndMouse::VkKeyScanW;
        let scan = unsafe { VkKeyScanW(unit) };
        if scan == -1 {
            return None;
        }
        let mut key_state = 0;
        if scan & 0x100 != 0 {
            key_state |= SHIFT_PRESSED;
        } else if scan & 0x200 != 0 {
            key_state |= LEFT_CTRL_PRESSED;
        } else if scan & 0x400 != 0 {
            key_state |= LEFT_ALT_PRESSED;
        }
        Some(KeyScan {
            virtual_key: (scan & 0xFF) as u16,
            key_state,
        })
    }

    fn scan_code(&self, virtual_key: u16) -> u16 {
        use windows_sys::Win32::UI::Input::KeyboardAndMouse::{MapVirtualKeyW,
                                                              MAPVK_VK_TO_VSC};
        (unsafe { MapVirtualKeyW(u32::from(virtual_key), MAPVK_VK_TO_VSC) }) as u16
    }
}

/// A fixed US-ASCII layout used off-Windows and in tests. Covers the
/// printable ASCII range and the C0 characters a terminal can send.
#[derive(Debug, Default)]
pub struct UsAsciiLayout;

impl KeyboardLayout for UsAsciiLayout {
    fn key_scan(&self, unit: u16) -> Option<KeyScan> {
        let plain = |virtual_key: u16| {
            Some(KeyScan {
                virtual_key,
                key_state: 0,
            })
        };
        let shifted = |virtual_key: u16| {
            Some(KeyScan {
                virtual_key,
                key_state: SHIFT_PRESSED,
            })
        };
        if unit > 0x7E {
            return None;
        }
        let byte = unit as u8;
        match byte {
            0x08 => plain(VK_BACK),
            0x09 => plain(VK_TAB),
            0x0D => plain(VK_RETURN),
            0x1B => plain(VK_ESCAPE),
            0x20 => plain(VK_SPACE),
            // Ctrl-A .. Ctrl-Z, minus the ones above.
            0x01..=0x1A => Some(KeyScan {
                virtual_key: u16::from(b'A') + unit - 1,
                key_state: LEFT_CTRL_PRESSED,
            }),
            b'0'..=b'9' => plain(unit),
            b'A'..=b'Z' => shifted(unit),
            b'a'..=b'z' => plain(unit - 0x20),
            b')' | b'!' | b'@' | b'#' | b'$' | b'%' | b'^' | b'&' | b'*' | b'(' => {
                let digits = b")!@#$%^&*(";
                let idx = digits.iter().position(|&c| c == byte).unwrap_or(0);
                shifted(u16::from(b'0') + idx as u16)
            }
            b';' => plain(0xBA),
            b':' => shifted(0xBA),
            b'=' => plain(0xBB),
            b'+' => shifted(0xBB),
            b',' => plain(0xBC),
            b'<' => shifted(0xBC),
            b'-' => plain(0xBD),
            b'_' => shifted(0xBD),
            b'.' => plain(0xBE),
            b'>' => shifted(0xBE),
            b'/' => plain(0xBF),
            b'?' => shifted(0xBF),
            b'`' => plain(0xC0),
            b'~' => shifted(0xC0),
            b'[' => plain(0xDB),
            b'{' => shifted(0xDB),
            b'\\' => plain(0xDC),
            b'|' => shifted(0xDC),
            b']' => plain(0xDD),
            b'}' => shifted(0xDD),
            b'\'' => plain(0xDE),
            b'"' => shifted(0xDE),
            _ => None,
        }
    }

    fn scan_code(&self, _virtual_key: u16) -> u16 { 0 }
}

/// The platform's default layout.
#[must_use]
pub fn default_layout() -> Box<dyn KeyboardLayout> {
    #[cfg(windows)]
    {
        Box::new(NativeLayout)
    }
    #[cfg(not(windows))]
    {
        Box::new(UsAsciiLayout)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn ascii_layout_letters() {
        let layout = UsAsciiLayout;
        assert_eq!(
            layout.key_scan(u16::from(b'a')).unwrap(),
            KeyScan {
                virtual_key: u16::from(b'A'),
                key_state: 0
            }
        );
        assert_eq!(
            layout.key_scan(u16::from(b'A')).unwrap().key_state,
            SHIFT_PRESSED
        );
    }

    #[test]
    fn ascii_layout_shifted_digits() {
        let layout = UsAsciiLayout;
        let scan = layout.key_scan(u16::from(b'%')).unwrap();
        assert_eq!(scan.virtual_key, u16::from(b'5'));
        assert_eq!(scan.key_state, SHIFT_PRESSED);
    }

    #[test]
    fn ascii_layout_control_characters() {
        let layout = UsAsciiLayout;
        let scan = layout.key_scan(0x01).unwrap();
        assert_eq!(scan.virtual_key, u16::from(b'A'));
        assert_eq!(scan.key_state, LEFT_CTRL_PRESSED);
    }

    #[test]
    fn non_ascii_is_untypeable() {
        let layout = UsAsciiLayout;
        assert_eq!(layout.key_scan(0x4E2D), None);
        assert_eq!(layout.key_scan(0xD83D), None);
    }
}
