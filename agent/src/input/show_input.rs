// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! `--show-input`: dump console input records to stdout.
//!
//! A debugging aid for the decoder: run the agent interactively inside a
//! console, type keys (optionally wiggle the mouse), and see exactly which
//! records the console delivers. Ends at Ctrl-D.

use super::records::{virtual_key_name, InputRecord, KeyEvent, MouseEvent,
                     CAPSLOCK_ON, DOUBLE_CLICK, ENHANCED_KEY,
                     FROM_LEFT_1ST_BUTTON_PRESSED, FROM_LEFT_2ND_BUTTON_PRESSED,
                     FROM_LEFT_3RD_BUTTON_PRESSED, FROM_LEFT_4TH_BUTTON_PRESSED,
                     LEFT_ALT_PRESSED, LEFT_CTRL_PRESSED, MOUSE_HWHEELED,
                     MOUSE_MOVED, MOUSE_WHEELED, NUMLOCK_ON,
                     RIGHTMOST_BUTTON_PRESSED, RIGHT_ALT_PRESSED,
                     RIGHT_CTRL_PRESSED, SCROLLLOCK_ON, SHIFT_PRESSED};

struct Flag {
    value: u32,
    text: &'static str,
}

const BUTTON_STATES: &[Flag] = &[
    Flag { value: FROM_LEFT_1ST_BUTTON_PRESSED, text: "1" },
    Flag { value: FROM_LEFT_2ND_BUTTON_PRESSED, text: "2" },
    Flag { value: FROM_LEFT_3RD_BUTTON_PRESSED, text: "3" },
    Flag { value: FROM_LEFT_4TH_BUTTON_PRESSED, text: "4" },
    Flag { value: RIGHTMOST_BUTTON_PRESSED, text: "R" },
];

const CONTROL_KEY_STATES: &[Flag] = &[
    Flag { value: CAPSLOCK_ON, text: "CapsLock" },
    Flag { value: ENHANCED_KEY, text: "Enhanced" },
    Flag { value: LEFT_ALT_PRESSED, text: "LAlt" },
    Flag { value: LEFT_CTRL_PRESSED, text: "LCtrl" },
    Flag { value: NUMLOCK_ON, text: "NumLock" },
    Flag { value: RIGHT_ALT_PRESSED, text: "RAlt" },
    Flag { value: RIGHT_CTRL_PRESSED, text: "RCtrl" },
    Flag { value: SCROLLLOCK_ON, text: "ScrollLock" },
    Flag { value: SHIFT_PRESSED, text: "Shift" },
];

const MOUSE_EVENT_FLAGS: &[Flag] = &[
    Flag { value: DOUBLE_CLICK, text: "Double" },
    Flag { value: MOUSE_HWHEELED, text: "HWheel" },
    Flag { value: MOUSE_MOVED, text: "Move" },
    Flag { value: MOUSE_WHEELED, text: "Wheel" },
];

fn write_flags(flags: u32, remainder_name: &str, table: &[Flag], sep: char) -> String {
    let mut out = String::new();
    let mut remaining = flags;
    for flag in table {
        if flag.value & flags == flag.value {
            if !out.is_empty() {
                out.push(sep);
            }
            out.push_str(flag.text);
            remaining &= !flag.value;
        }
    }
    if remaining != 0 {
        if !out.is_empty() {
            out.push(sep);
        }
        out.push_str(&format!("{remainder_name}(0x{remaining:x})"));
    }
    out
}

fn format_key_event(key: &KeyEvent) -> String {
    let state = write_flags(key.control_key_state, "keyState", CONTROL_KEY_STATES, '-');
    let state = if state.is_empty() { state } else { format!("{state}-") };
    format!(
        "key: {} rpt={} scn={} vk=0x{:02X} {} ch=0x{:04X} {}",
        if key.key_down { "dn" } else { "up" },
        key.repeat_count,
        key.scan_code,
        key.virtual_key,
        virtual_key_name(key.virtual_key),
        key.unicode_char,
        state,
    )
}

fn format_mouse_event(mouse: &MouseEvent) -> String {
    let buttons = write_flags(mouse.button_state & 0xFFFF, "buttons", BUTTON_STATES, '+');
    let flags = write_flags(mouse.event_flags, "eventFlags", MOUSE_EVENT_FLAGS, '+');
    let state = write_flags(mouse.control_key_state, "keyState", CONTROL_KEY_STATES, '-');
    format!(
        "mouse: pos={},{} buttonState=0x{:08X} [{}] flags=[{}] {}",
        mouse.position.x, mouse.position.y, mouse.button_state, buttons, flags, state,
    )
}

/// One line of dump output per record.
#[must_use]
pub fn format_record(record: &InputRecord) -> String {
    match record {
        InputRecord::Key(key) => format_key_event(key),
        InputRecord::Mouse(mouse) => format_mouse_event(mouse),
    }
}

/// Read records from the real console and print them until Ctrl-D.
#[cfg(windows)]
pub fn debug_show_input(with_mouse: bool) {
    use windows_sys::Win32::System::Console::{GetConsoleMode, GetStdHandle,
                                              ReadConsoleInputW, SetConsoleMode,
                                              ENABLE_EXTENDED_FLAGS,
                                              ENABLE_MOUSE_INPUT,
                                              ENABLE_WINDOW_INPUT, INPUT_RECORD,
                                              STD_INPUT_HANDLE};

    use super::records::InputRecord as Record;
    use crate::core::Coord;

    const KEY_EVENT_TYPE: u16 = 0x0001;
    const MOUSE_EVENT_TYPE: u16 = 0x0002;

    let conin = unsafe { GetStdHandle(STD_INPUT_HANDLE) };
    let mut saved_mode: u32 = 0;
    unsafe { GetConsoleMode(conin, &mut saved_mode) };
    let mut mode = ENABLE_EXTENDED_FLAGS | ENABLE_WINDOW_INPUT;
    if with_mouse {
        mode |= ENABLE_MOUSE_INPUT;
    }
    unsafe { SetConsoleMode(conin, mode) };

    println!("Dumping INPUT_RECORDs. Press Ctrl-D to exit.");
    'outer: loop {
        let mut records: [INPUT_RECORD; 1] = unsafe { std::mem::zeroed() };
        let mut read: u32 = 0;
        if unsafe { ReadConsoleInputW(conin, records.as_mut_ptr(), 1, &mut read) } == 0
            || read == 0
        {
            break;
        }
        let native = &records[0];
        let record = match native.EventType {
            KEY_EVENT_TYPE => {
                let key = unsafe { &native.Event.KeyEvent };
                Record::Key(KeyEvent {
                    key_down: key.bKeyDown != 0,
                    repeat_count: key.wRepeatCount,
                    virtual_key: key.wVirtualKeyCode,
                    scan_code: key.wVirtualScanCode,
                    unicode_char: unsafe { key.uChar.UnicodeChar },
                    control_key_state: key.dwControlKeyState,
                })
            }
            MOUSE_EVENT_TYPE => {
                let mouse = unsafe { &native.Event.MouseEvent };
                Record::Mouse(MouseEvent {
                    position: Coord::new(mouse.dwMousePosition.X,
                                         mouse.dwMousePosition.Y),
                    button_state: mouse.dwButtonState,
                    control_key_state: mouse.dwControlKeyState,
                    event_flags: mouse.dwEventFlags,
                })
            }
            _ => continue,
        };
        println!("{}", format_record(&record));
        if let Record::Key(key) = record {
            // Ctrl-D on the down event ends the dump.
            if key.key_down && key.unicode_char == 0x04 {
                break 'outer;
            }
        }
    }

    unsafe { SetConsoleMode(conin, saved_mode) };
}

#[cfg(not(windows))]
pub fn debug_show_input(_with_mouse: bool) {
    eprintln!("--show-input requires a Windows console");
}
