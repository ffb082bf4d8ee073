// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Control-pipe RPC framing.
//!
//! Each request is `i32 payload_size` (little-endian) followed by
//! `payload_size` bytes: an `i32` message type and type-specific fields.
//! Wide strings are an `i32` UTF-16 code-unit count followed by that many
//! little-endian units; the environment block keeps its embedded and
//! trailing NULs inside the string payload. Every request gets exactly one
//! `i32` reply.

use strum_macros::FromRepr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("packet truncated")]
    Truncated,
    #[error("bad length field: {0}")]
    BadLength(i32),
    #[error("unrecognized message type: {0}")]
    UnknownType(i32),
    #[error("trailing bytes after packet payload")]
    TrailingBytes,
}

/// Message type word. The values are the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(i32)]
pub enum MsgType {
    Ping = 0,
    StartProcess = 1,
    SetSize = 2,
    GetExitCode = 3,
    GetProcessId = 4,
    SetConsoleMode = 5,
}

/// A decoded control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentMsg {
    Ping,
    StartProcess {
        /// Application name; empty means "take it from the command line".
        program: Vec<u16>,
        cmdline: Vec<u16>,
        /// Working directory; empty means inherit.
        cwd: Vec<u16>,
        /// Doubly-NUL-terminated environment block; empty means inherit.
        env: Vec<u16>,
        /// Desktop name; empty means default.
        desktop: Vec<u16>,
    },
    SetSize {
        cols: i32,
        rows: i32,
    },
    GetExitCode,
    GetProcessId,
    SetConsoleMode {
        mode: i32,
    },
}

/// Sequential reader over one packet payload.
#[derive(Debug)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self { Self { data, pos: 0 } }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let end = self.pos + 4;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(ProtocolError::Truncated)?;
        self.pos = end;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_wstring(&mut self) -> Result<Vec<u16>, ProtocolError> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(ProtocolError::BadLength(count));
        }
        let byte_len = count as usize * 2;
        let end = self.pos + byte_len;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(ProtocolError::Truncated)?;
        self.pos = end;
        Ok(bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }

    #[must_use]
    pub fn eof(&self) -> bool { self.pos == self.data.len() }
}

/// Parse one payload (the bytes after the size prefix).
pub fn parse_packet(payload: &[u8]) -> Result<AgentMsg, ProtocolError> {
    let mut reader = PacketReader::new(payload);
    let type_word = reader.read_i32()?;
    let msg_type =
        MsgType::from_repr(type_word).ok_or(ProtocolError::UnknownType(type_word))?;
    let msg = match msg_type {
        MsgType::Ping => AgentMsg::Ping,
        MsgType::StartProcess => AgentMsg::StartProcess {
            program: reader.read_wstring()?,
            cmdline: reader.read_wstring()?,
            cwd: reader.read_wstring()?,
            env: reader.read_wstring()?,
            desktop: reader.read_wstring()?,
        },
        MsgType::SetSize => AgentMsg::SetSize {
            cols: reader.read_i32()?,
            rows: reader.read_i32()?,
        },
        MsgType::GetExitCode => AgentMsg::GetExitCode,
        MsgType::GetProcessId => AgentMsg::GetProcessId,
        MsgType::SetConsoleMode => AgentMsg::SetConsoleMode {
            mode: reader.read_i32()?,
        },
    };
    if !reader.eof() {
        return Err(ProtocolError::TrailingBytes);
    }
    Ok(msg)
}

/// Builder for packet payloads; the client side of the same framing. Tests
/// drive the agent with it.
#[derive(Debug, Default)]
pub struct PacketBuilder {
    payload: Vec<u8>,
}

impl PacketBuilder {
    #[must_use]
    pub fn new(msg_type: MsgType) -> Self {
        let mut builder = Self::default();
        builder.put_i32(msg_type as i32);
        builder
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.payload.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_wstring(&mut self, value: &str) -> &mut Self {
        let units: Vec<u16> = value.encode_utf16().collect();
        self.put_units(&units)
    }

    pub fn put_units(&mut self, units: &[u16]) -> &mut Self {
        self.put_i32(units.len() as i32);
        for unit in units {
            self.payload.extend_from_slice(&unit.to_le_bytes());
        }
        self
    }

    /// Prepend the size prefix and return the framed packet.
    #[must_use]
    pub fn frame(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.payload.len());
        out.extend_from_slice(&(self.payload.len() as i32).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn ping_round_trip() {
        let packet = PacketBuilder::new(MsgType::Ping).frame();
        assert_eq!(&packet[..4], &4i32.to_le_bytes());
        assert_eq!(parse_packet(&packet[4..]), Ok(AgentMsg::Ping));
    }

    #[test]
    fn set_size_round_trip() {
        let mut builder = PacketBuilder::new(MsgType::SetSize);
        builder.put_i32(120).put_i32(40);
        let packet = builder.frame();
        assert_eq!(
            parse_packet(&packet[4..]),
            Ok(AgentMsg::SetSize { cols: 120, rows: 40 })
        );
    }

    #[test]
    fn start_process_round_trip_with_env_block() {
        let env: Vec<u16> = "A=1\0B=2\0\0".encode_utf16().collect();
        let mut builder = PacketBuilder::new(MsgType::StartProcess);
        builder
            .put_wstring("")
            .put_wstring("cmd.exe /c dir")
            .put_wstring("C:\\work")
            .put_units(&env)
            .put_wstring("");
        let packet = builder.frame();
        let msg = parse_packet(&packet[4..]).unwrap();
        let AgentMsg::StartProcess {
            program,
            cmdline,
            cwd,
            env: parsed_env,
            desktop,
        } = msg
        else {
            panic!("wrong message");
        };
        assert!(program.is_empty());
        assert_eq!(String::from_utf16(&cmdline).unwrap(), "cmd.exe /c dir");
        assert_eq!(String::from_utf16(&cwd).unwrap(), "C:\\work");
        assert_eq!(parsed_env, env, "embedded NULs survive");
        assert!(desktop.is_empty());
    }

    #[test]
    fn unknown_type_is_reported() {
        let mut builder = PacketBuilder::default();
        builder.put_i32(99);
        let packet = builder.frame();
        assert_eq!(
            parse_packet(&packet[4..]),
            Err(ProtocolError::UnknownType(99))
        );
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut builder = PacketBuilder::new(MsgType::SetSize);
        builder.put_i32(120);
        let packet = builder.frame();
        assert_eq!(parse_packet(&packet[4..]), Err(ProtocolError::Truncated));
    }

    #[test]
    fn trailing_bytes_are_an_error() {
        let mut builder = PacketBuilder::new(MsgType::Ping);
        builder.put_i32(0);
        let packet = builder.frame();
        assert_eq!(
            parse_packet(&packet[4..]),
            Err(ProtocolError::TrailingBytes)
        );
    }

    #[test]
    fn negative_wstring_length_is_rejected() {
        let mut builder = PacketBuilder::new(MsgType::StartProcess);
        builder.put_i32(-5);
        let packet = builder.frame();
        assert_eq!(
            parse_packet(&packet[4..]),
            Err(ProtocolError::BadLength(-5))
        );
    }

    #[test]
    fn get_exit_code_and_console_mode() {
        let packet = PacketBuilder::new(MsgType::GetExitCode).frame();
        assert_eq!(parse_packet(&packet[4..]), Ok(AgentMsg::GetExitCode));

        let mut builder = PacketBuilder::new(MsgType::SetConsoleMode);
        builder.put_i32(1);
        let packet = builder.frame();
        assert_eq!(
            parse_packet(&packet[4..]),
            Ok(AgentMsg::SetConsoleMode { mode: 1 })
        );
    }
}
