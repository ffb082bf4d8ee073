// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Byte-sequence dictionary mapping escape sequences to key presses.
//!
//! A trie keyed on raw bytes. Lookup finds the *longest* entry that
//! prefixes the input, and separately reports whether a longer entry could
//! still match if more bytes arrived; the decoder uses that to wait for the
//! rest of a split escape sequence (bounded by the flush timeout).

use std::collections::BTreeMap;

/// A decoded key press: virtual key, character, and modifier mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappedKey {
    pub virtual_key: u16,
    pub unicode_char: u16,
    pub key_state: u32,
}

#[derive(Debug, Default)]
struct Node {
    key: Option<MappedKey>,
    children: BTreeMap<u8, Node>,
}

/// Outcome of a dictionary lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    /// Bytes consumed by the longest matching entry; 0 when nothing
    /// matches.
    pub match_len: usize,
    pub key: MappedKey,
    /// True when the input is a proper prefix of at least one entry.
    pub incomplete: bool,
}

#[derive(Debug, Default)]
pub struct InputMap {
    root: Node,
}

impl InputMap {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    pub fn set(&mut self, sequence: &[u8], key: MappedKey) {
        debug_assert!(!sequence.is_empty());
        let mut node = &mut self.root;
        for &byte in sequence {
            node = node.children.entry(byte).or_default();
        }
        node.key = Some(key);
    }

    #[must_use]
    pub fn lookup_key(&self, input: &[u8]) -> Lookup {
        let mut node = &self.root;
        let mut best: Option<(usize, MappedKey)> = None;
        let mut depth = 0;
        for &byte in input {
            match node.children.get(&byte) {
                Some(child) => {
                    depth += 1;
                    if let Some(key) = child.key {
                        best = Some((depth, key));
                    }
                    node = child;
                }
                None => {
                    // Diverged: no longer entry can match.
                    let (match_len, key) = best.unwrap_or_default();
                    return Lookup {
                        match_len,
                        key,
                        incomplete: false,
                    };
                }
            }
        }
        // Ran out of input while still on a live node.
        let (match_len, key) = best.unwrap_or_default();
        Lookup {
            match_len,
            key,
            incomplete: !node.children.is_empty(),
        }
    }

    /// Every entry in byte order, for the `dump_input_map` debug flag.
    #[must_use]
    pub fn entries(&self) -> Vec<(Vec<u8>, MappedKey)> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        collect(&self.root, &mut prefix, &mut out);
        out
    }
}

fn collect(node: &Node, prefix: &mut Vec<u8>, out: &mut Vec<(Vec<u8>, MappedKey)>) {
    if let Some(key) = node.key {
        out.push((prefix.clone(), key));
    }
    for (&byte, child) in &node.children {
        prefix.push(byte);
        collect(child, prefix, out);
        prefix.pop();
    }
}
