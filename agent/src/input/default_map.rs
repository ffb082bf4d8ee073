// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The default escape-sequence dictionary.
//!
//! Covers the sequences the common terminals emit: CSI and SS3 cursor keys,
//! the VT220 tilde family with xterm modifier parameters, rxvt Home/End,
//! back-tab, and the C0 keys that map onto console virtual keys. The xterm
//! modifier parameter is `1 + bitmask` with bit 0 = Shift, bit 1 = Alt,
//! bit 2 = Ctrl.

use super::map::{InputMap, MappedKey};
use super::records::{LEFT_ALT_PRESSED, LEFT_CTRL_PRESSED, SHIFT_PRESSED, VK_BACK,
                     VK_CLEAR, VK_DELETE, VK_DOWN, VK_END, VK_F1, VK_F10, VK_F11,
                     VK_F12, VK_F2, VK_F3, VK_F4, VK_F5, VK_F6, VK_F7, VK_F8, VK_F9,
                     VK_HOME, VK_INSERT, VK_LEFT, VK_NEXT, VK_PRIOR, VK_RETURN,
                     VK_RIGHT, VK_TAB, VK_UP};

const fn plain(virtual_key: u16) -> MappedKey {
    MappedKey {
        virtual_key,
        unicode_char: 0,
        key_state: 0,
    }
}

const fn with_char(virtual_key: u16, unicode_char: u16) -> MappedKey {
    MappedKey {
        virtual_key,
        unicode_char,
        key_state: 0,
    }
}

fn modified(base: MappedKey, xterm_mod: u32) -> MappedKey {
    let bits = xterm_mod - 1;
    let mut key_state = base.key_state;
    if bits & 1 != 0 {
        key_state |= SHIFT_PRESSED;
    }
    if bits & 2 != 0 {
        key_state |= LEFT_ALT_PRESSED;
    }
    if bits & 4 != 0 {
        key_state |= LEFT_CTRL_PRESSED;
    }
    MappedKey { key_state, ..base }
}

/// Cursor-key family: plain CSI, plain SS3, and `CSI 1 ; m <letter>`.
const CURSOR_KEYS: &[(u8, u16)] = &[
    (b'A', VK_UP),
    (b'B', VK_DOWN),
    (b'C', VK_RIGHT),
    (b'D', VK_LEFT),
    (b'E', VK_CLEAR),
    (b'H', VK_HOME),
    (b'F', VK_END),
];

/// SS3-only function keys, also reachable as `CSI 1 ; m <letter>`.
const SS3_FKEYS: &[(u8, u16)] = &[
    (b'P', VK_F1),
    (b'Q', VK_F2),
    (b'R', VK_F3),
    (b'S', VK_F4),
];

/// VT220 tilde family: `CSI <n> ~` and `CSI <n> ; m ~`.
const TILDE_KEYS: &[(u32, u16)] = &[
    (1, VK_HOME),
    (2, VK_INSERT),
    (3, VK_DELETE),
    (4, VK_END),
    (5, VK_PRIOR),
    (6, VK_NEXT),
    (7, VK_HOME), // rxvt
    (8, VK_END),  // rxvt
    (11, VK_F1),
    (12, VK_F2),
    (13, VK_F3),
    (14, VK_F4),
    (15, VK_F5),
    (17, VK_F6),
    (18, VK_F7),
    (19, VK_F8),
    (20, VK_F9),
    (21, VK_F10),
    (23, VK_F11),
    (24, VK_F12),
];

pub fn add_default_entries(map: &mut InputMap) {
    // Bare ESC is deliberately NOT an entry. A lone ESC byte must stay
    // "incomplete" so Alt-<char> and split escape sequences can still
    // claim it; the flush timeout settles a true Escape press through the
    // plain-character path instead.

    // C0 keys with console equivalents.
    map.set(b"\x7f", with_char(VK_BACK, 0x08));
    map.set(
        b"\x08",
        MappedKey {
            key_state: LEFT_CTRL_PRESSED,
            ..with_char(VK_BACK, 0x08)
        },
    );
    map.set(b"\r", with_char(VK_RETURN, b'\r' as u16));
    map.set(
        b"\n",
        MappedKey {
            key_state: LEFT_CTRL_PRESSED,
            ..with_char(VK_RETURN, b'\n' as u16)
        },
    );
    map.set(b"\t", with_char(VK_TAB, b'\t' as u16));

    // Back-tab.
    map.set(
        b"\x1b[Z",
        MappedKey {
            key_state: SHIFT_PRESSED,
            ..with_char(VK_TAB, b'\t' as u16)
        },
    );

    for &(letter, virtual_key) in CURSOR_KEYS {
        map.set(&[0x1B, b'[', letter], plain(virtual_key));
        map.set(&[0x1B, b'O', letter], plain(virtual_key));
        add_modified_letter_family(map, letter, virtual_key);
    }

    for &(letter, virtual_key) in SS3_FKEYS {
        map.set(&[0x1B, b'O', letter], plain(virtual_key));
        add_modified_letter_family(map, letter, virtual_key);
    }

    for &(number, virtual_key) in TILDE_KEYS {
        let digits = number.to_string();
        let mut seq = vec![0x1B, b'['];
        seq.extend_from_slice(digits.as_bytes());
        seq.push(b'~');
        map.set(&seq, plain(virtual_key));

        for xterm_mod in 2..=8u32 {
            let mut seq = vec![0x1B, b'['];
            seq.extend_from_slice(digits.as_bytes());
            seq.push(b';');
            seq.extend_from_slice(xterm_mod.to_string().as_bytes());
            seq.push(b'~');
            map.set(&seq, modified(plain(virtual_key), xterm_mod));
        }
    }
}

/// `CSI 1 ; m <letter>` for every modifier combination.
fn add_modified_letter_family(map: &mut InputMap, letter: u8, virtual_key: u16) {
    for xterm_mod in 2..=8u32 {
        let seq = [0x1B, b'[', b'1', b';', b'0' + xterm_mod as u8, letter];
        map.set(&seq, modified(plain(virtual_key), xterm_mod));
    }
}
