// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Named-pipe client with bounded byte queues.
//!
//! Each pipe is a bidirectional byte stream. I/O is readiness-driven on the
//! current-thread Tokio runtime: at most one `try_read` and one `try_write`
//! happen per wake, which preserves the single-outstanding-operation
//! discipline the overlapped originals had. The read queue is capped;
//! while it is full no further reads are issued, which is the only
//! backpressure mechanism the agent needs.
//!
//! Any I/O error is a terminal closure for the pipe: both queues are
//! abandoned and the handle is dropped (cancelling whatever was pending).

use tokio::io::Interest;
use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient};
use windows_sys::Win32::Storage::FileSystem::SECURITY_IDENTIFICATION;

use crate::input::DsrSender;
use crate::terminal::OutputSink;

/// Default cap on the inbound queue.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

const IO_CHUNK_SIZE: usize = 32 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    #[error("could not connect to {name}: {source}")]
    Connect {
        name: String,
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct NamedPipe {
    /// `None` once the pipe has closed.
    client: Option<NamedPipeClient>,
    in_queue: Vec<u8>,
    out_queue: Vec<u8>,
    read_buffer_size: usize,
}

impl NamedPipe {
    /// Connect to the pipe server. Must run inside a Tokio runtime.
    pub fn connect(name: &str) -> Result<Self, PipeError> {
        let client = ClientOptions::new()
            .security_qos_flags(SECURITY_IDENTIFICATION)
            .open(name)
            .map_err(|source| PipeError::Connect {
                name: name.to_owned(),
                source,
            })?;
        tracing::debug!(name, "pipe connected");
        Ok(Self {
            client: Some(client),
            in_queue: Vec::new(),
            out_queue: Vec::new(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.client.is_none() }

    #[must_use]
    pub fn read_buffer_size(&self) -> usize { self.read_buffer_size }

    pub fn set_read_buffer_size(&mut self, size: usize) { self.read_buffer_size = size; }

    #[must_use]
    pub fn bytes_available(&self) -> usize { self.in_queue.len() }

    /// Unsent output, the measure used to defer closing the data pipe
    /// until everything the child produced has been handed to the client.
    #[must_use]
    pub fn bytes_to_send(&self) -> usize { self.out_queue.len() }

    /// Copy up to `out.len()` queued bytes without consuming them.
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.in_queue.len());
        out[..n].copy_from_slice(&self.in_queue[..n]);
        n
    }

    /// Consume up to `size` bytes from the inbound queue.
    pub fn read(&mut self, size: usize) -> Vec<u8> {
        let n = size.min(self.in_queue.len());
        self.in_queue.drain(..n).collect()
    }

    /// Consume the whole inbound queue.
    pub fn read_all(&mut self) -> Vec<u8> { std::mem::take(&mut self.in_queue) }

    /// Queue bytes for sending. Actual I/O happens in [`Self::service_io`].
    pub fn write(&mut self, data: &[u8]) {
        if self.client.is_some() {
            self.out_queue.extend_from_slice(data);
        }
    }

    /// Drop the handle; pending I/O is cancelled by the close.
    pub fn close_pipe(&mut self) {
        if self.client.take().is_some() {
            tracing::debug!("pipe closed");
        }
        self.in_queue.clear();
        self.out_queue.clear();
    }

    /// True when the next readiness wait could make progress.
    #[must_use]
    pub fn wants_io(&self) -> bool {
        self.client.is_some() && (self.wants_read() || self.wants_write())
    }

    fn wants_read(&self) -> bool { self.in_queue.len() < self.read_buffer_size }

    fn wants_write(&self) -> bool { !self.out_queue.is_empty() }

    /// Wait until the pipe is ready for whichever directions have work.
    /// Pends forever when there is nothing to do (callers guard on
    /// [`Self::wants_io`]).
    pub async fn ready(&self) {
        let Some(client) = &self.client else {
            return std::future::pending().await;
        };
        let interest = match (self.wants_read(), self.wants_write()) {
            (true, true) => Interest::READABLE | Interest::WRITABLE,
            (true, false) => Interest::READABLE,
            (false, true) => Interest::WRITABLE,
            (false, false) => return std::future::pending().await,
        };
        // Errors surface as try_read/try_write failures in service_io.
        let _ = client.ready(interest).await;
    }

    /// Advance reads and writes without blocking. Returns true if anything
    /// happened (bytes moved or the pipe transitioned to closed).
    pub fn service_io(&mut self) -> bool {
        let Some(client) = &self.client else {
            return false;
        };
        let mut progress = false;
        let mut error = false;

        while self.in_queue.len() < self.read_buffer_size {
            let mut buf = [0u8; IO_CHUNK_SIZE];
            let want = buf.len().min(self.read_buffer_size - self.in_queue.len());
            match client.try_read(&mut buf[..want]) {
                Ok(0) => {
                    error = true;
                    break;
                }
                Ok(n) => {
                    self.in_queue.extend_from_slice(&buf[..n]);
                    progress = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::debug!(error = %e, "pipe read error");
                    error = true;
                    break;
                }
            }
        }

        if !error {
            while !self.out_queue.is_empty() {
                match client.try_write(&self.out_queue) {
                    Ok(n) => {
                        self.out_queue.drain(..n);
                        progress = true;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        tracing::debug!(error = %e, "pipe write error");
                        error = true;
                        break;
                    }
                }
            }
        }

        if error {
            self.close_pipe();
            return true;
        }
        progress
    }
}

impl OutputSink for NamedPipe {
    fn send(&mut self, bytes: &[u8]) { self.write(bytes); }
}

impl DsrSender for NamedPipe {
    fn send_dsr(&mut self) { self.write(b"\x1b[6n"); }
}
