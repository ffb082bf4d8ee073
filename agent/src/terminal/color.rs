// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Console attribute word to SGR translation.
//!
//! The console gives us 16 palette colors for each of foreground and
//! background; the terminal's palette and default colors are unknown. The
//! translation below is a heuristic tuned to behave acceptably on both
//! white-on-black and black-on-white schemes. Typical defaults, by palette:
//!
//! - mintty, putty, xterm, Konsole: LtGray-on-Black
//! - JediTerm/JetBrains, rxvt: Black-on-White
//!
//! Grayscale background colors therefore translate through the terminal's
//! *own* defaults (or Invert) rather than literal palette entries, so that
//! console text stays readable whichever scheme the terminal uses.

use crate::core::cell::{BACKGROUND_BLUE, BACKGROUND_GREEN, BACKGROUND_INTENSITY,
                        BACKGROUND_RED, FOREGROUND_BLUE, FOREGROUND_GREEN,
                        FOREGROUND_INTENSITY, FOREGROUND_RED};

pub const CSI: &[u8] = b"\x1b[";

const FLAG_RED: u16 = 1;
const FLAG_GREEN: u16 = 2;
const FLAG_BLUE: u16 = 4;
const FLAG_BRIGHT: u16 = 8;

const BLACK: u16 = 0;
const DKGRAY: u16 = BLACK | FLAG_BRIGHT;
const LTGRAY: u16 = FLAG_RED | FLAG_GREEN | FLAG_BLUE;
const WHITE: u16 = LTGRAY | FLAG_BRIGHT;

/// SGR parameter bases (Select Graphic Rendition).
const SGR_FORE: u16 = 30;
const SGR_FORE_HI: u16 = 90;
const SGR_BACK: u16 = 40;

/// Append a decimal integer without going through `format!`.
pub(crate) fn push_uint(out: &mut Vec<u8>, mut n: u32) {
    let mut buf = [0u8; 10];
    let mut at = buf.len();
    loop {
        at -= 1;
        buf[at] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    out.extend_from_slice(&buf[at..]);
}

/// Append `;<3X or 4X>` for a palette color, adding a `9X`/`10X` override
/// after a `3X`/`4X` fallback for bright colors. Terminals lacking the
/// intensive range quietly ignore the second parameter; terminals that have
/// it let it win.
fn push_color_sgr_params(out: &mut Vec<u8>, is_fore: bool, color: u16) {
    out.push(b';');
    let sgr_base = if is_fore { SGR_FORE } else { SGR_BACK };
    if color & FLAG_BRIGHT != 0 {
        let color_base = color & !FLAG_BRIGHT;
        push_uint(out, u32::from(sgr_base + color_base));
        out.push(b';');
        push_uint(out, u32::from(sgr_base + (SGR_FORE_HI - SGR_FORE) + color_base));
    } else {
        push_uint(out, u32::from(sgr_base + color));
    }
}

/// Emit the full SGR sequence selecting `color` (an attribute word masked to
/// its eight color bits).
pub fn push_set_color(out: &mut Vec<u8>, color: u16) {
    let mut fore: u16 = 0;
    let mut back: u16 = 0;
    if color & FOREGROUND_RED != 0 { fore |= FLAG_RED; }
    if color & FOREGROUND_GREEN != 0 { fore |= FLAG_GREEN; }
    if color & FOREGROUND_BLUE != 0 { fore |= FLAG_BLUE; }
    if color & FOREGROUND_INTENSITY != 0 { fore |= FLAG_BRIGHT; }
    if color & BACKGROUND_RED != 0 { back |= FLAG_RED; }
    if color & BACKGROUND_GREEN != 0 { back |= FLAG_GREEN; }
    if color & BACKGROUND_BLUE != 0 { back |= FLAG_BLUE; }
    if color & BACKGROUND_INTENSITY != 0 { back |= FLAG_BRIGHT; }

    out.extend_from_slice(CSI);
    out.push(b'0');
    if back == BLACK {
        if fore == LTGRAY {
            // The console's default foreground. Let the terminal use its
            // own defaults.
        } else if fore == WHITE {
            // Literal white would be invisible on a black-on-white
            // terminal. Bold is not guaranteed to change the color, but it
            // keeps the text visually distinct.
            out.extend_from_slice(b";1");
        } else if fore == DKGRAY {
            // DkGray(90) with a LtGray(37) fallback for terminals that do
            // not handle the 9X parameters.
            out.extend_from_slice(b";37;90");
        } else {
            push_color_sgr_params(out, true, fore);
        }
    } else if back == WHITE {
        // Invert the terminal's default colors for the background, then
        // select the foreground by setting a *background* color.
        out.extend_from_slice(b";7");
        if fore == LTGRAY || fore == BLACK {
            // Likely mapping console White onto the terminal's foreground
            // color. Selecting it explicitly would risk invisible text.
        } else {
            push_color_sgr_params(out, false, fore);
        }
    } else {
        push_color_sgr_params(out, true, fore);
        push_color_sgr_params(out, false, back);
    }
    if fore == back {
        // Equal colors are intentionally unreadable; Conceal comes closest
        // on terminals that support it.
        out.extend_from_slice(b";8");
    }
    out.push(b'm');
}
