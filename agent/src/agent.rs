// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The agent: owns the console, the scraper, the decoder, both pipes, and
//! at most one child process, and runs the single-threaded event loop
//! tying them together.
//!
//! Each iteration services both pipes, drains control packets and decoder
//! input, then waits on pipe readiness with a poll-interval timeout. The
//! timeout path flushes stale partial escape sequences, polls the child
//! for exit, and runs a scrape. The loop ends when the control pipe
//! closes, or once the child has exited and the drained data pipe has been
//! closed.

use std::time::Duration;

use windows_sys::Win32::System::Console::SetConsoleCtrlHandler;

use crate::console::win32::Win32Console;
use crate::console::{detect_whether_mark_moves_cursor, ConsoleApi, FreezeCommand};
use crate::core::{Coord, Rect};
use crate::debug_env::{show_console_requested, DebugFlags};
use crate::input::ConsoleInput;
use crate::pipe::NamedPipe;
use crate::process::ChildProcess;
use crate::protocol::{parse_packet, AgentMsg};
use crate::scraper::Scraper;
use crate::terminal::SendClearFlag;
use crate::{BUFFER_LINE_COUNT, POLL_INTERVAL_MS};

/// Reply to a `StartProcess` that arrives while a child is alive
/// (`ERROR_BUSY`).
const START_PROCESS_BUSY: i32 = 170;

/// Claim to handle Ctrl-C so `GenerateConsoleCtrlEvent` reaches the child
/// without also killing the agent.
unsafe extern "system" fn console_ctrl_handler(ctrl_type: u32) -> i32 {
    const CTRL_C_EVENT: u32 = 0;
    i32::from(ctrl_type == CTRL_C_EVENT)
}

#[derive(Debug)]
pub struct Agent {
    console: Win32Console,
    scraper: Scraper,
    decoder: ConsoleInput,
    control_pipe: NamedPipe,
    data_pipe: NamedPipe,
    child: Option<ChildProcess>,
    child_exit_code: i32,
    closing_data_pipe: bool,
}

enum Wake {
    Pipe,
    Tick,
}

impl Agent {
    /// Connect both pipes and prime the console. Must run inside the
    /// runtime (pipe clients register with the reactor).
    pub fn new(
        control_pipe_name: &str,
        data_pipe_name: &str,
        cols: i16,
        rows: i16,
        flags: &DebugFlags,
    ) -> miette::Result<Self> {
        tracing::debug!("agent starting");

        let mut console = Win32Console::open()
            .map_err(|e| miette::miette!("cannot open console: {e}"))?;
        if !show_console_requested() {
            console.hide_window();
        }

        let mark_moves_cursor = detect_whether_mark_moves_cursor(&mut console)
            .map_err(|e| miette::miette!("freeze probe failed: {e}"))?;
        let freeze_command = if mark_moves_cursor {
            FreezeCommand::SelectAll
        } else {
            FreezeCommand::Mark
        };
        tracing::debug!(?freeze_command, "selected freeze syscommand");

        // Prime the console: the agent-owned tall buffer, a window of the
        // requested size, and LtGray-on-Black everywhere for the sake of
        // the color translation heuristic.
        let prime = |console: &mut Win32Console| -> crate::console::ConsoleResult<Rect> {
            console.move_window(Rect::new(0, 0, 1, 1))?;
            console.resize_buffer(Coord::new(cols, BUFFER_LINE_COUNT))?;
            console.move_window(Rect::new(0, 0, cols, rows))?;
            console.set_cursor_position(Coord::new(0, 0))?;
            console.set_title("")?;
            console.set_text_attribute(7)?;
            let info = console.buffer_info()?;
            console.clear_all_lines(&info)?;
            Ok(info.window)
        };
        let window = prime(&mut console)
            .map_err(|e| miette::miette!("cannot prime console: {e}"))?;

        let control_pipe = NamedPipe::connect(control_pipe_name)
            .map_err(|e| miette::miette!("{e}"))?;
        let mut data_pipe = NamedPipe::connect(data_pipe_name)
            .map_err(|e| miette::miette!("{e}"))?;

        let mut scraper = Scraper::new(freeze_command, Coord::new(cols, rows));
        scraper.reset_tracking(&mut data_pipe, SendClearFlag::OmitClear, window);

        let decoder = ConsoleInput::default();
        if flags.dump_input_map() {
            decoder.dump_input_map();
        }

        // Restore default Ctrl-C handling (inherited by the child), then
        // register a do-nothing handler for the agent itself.
        unsafe {
            SetConsoleCtrlHandler(None, 0);
            SetConsoleCtrlHandler(Some(console_ctrl_handler), 1);
        }

        Ok(Self {
            console,
            scraper,
            decoder,
            control_pipe,
            data_pipe,
            child: None,
            child_exit_code: -1,
            closing_data_pipe: false,
        })
    }

    pub async fn run(&mut self) -> miette::Result<()> {
        let mut tick = tokio::time::interval(Duration::from_millis(POLL_INTERVAL_MS));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            self.control_pipe.service_io();
            self.data_pipe.service_io();

            if self.control_pipe.is_closed() {
                tracing::debug!("control pipe closed; agent shutting down");
                break;
            }
            self.poll_control_pipe();
            self.poll_data_pipe();
            if self.control_pipe.is_closed() {
                break;
            }
            if self.closing_data_pipe && self.data_pipe.is_closed() {
                tracing::debug!("data pipe finished after child exit");
                break;
            }

            let wake = tokio::select! {
                _ = self.control_pipe.ready(), if self.control_pipe.wants_io() => Wake::Pipe,
                _ = self.data_pipe.ready(), if self.data_pipe.wants_io() => Wake::Pipe,
                _ = tick.tick() => Wake::Tick,
            };
            if matches!(wake, Wake::Tick) {
                self.on_poll_timeout();
            }
        }

        // Best-effort final scrape so the client sees the child's last
        // output.
        if !self.data_pipe.is_closed() {
            let _ = self.scraper.sync_console_content_and_size(
                &mut self.console,
                &mut self.data_pipe,
                false,
            );
            // Best-effort flush: give the peer a moment to take the bytes,
            // then drop whatever is left.
            let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
            while self.data_pipe.bytes_to_send() > 0 && !self.data_pipe.is_closed() {
                let wait = tokio::time::timeout_at(deadline, self.data_pipe.ready());
                if wait.await.is_err() {
                    break;
                }
                self.data_pipe.service_io();
            }
        }
        Ok(())
    }

    /// Drain complete control packets; each produces exactly one reply.
    fn poll_control_pipe(&mut self) {
        loop {
            let mut size_bytes = [0u8; 4];
            if self.control_pipe.peek(&mut size_bytes) < 4 {
                break;
            }
            let packet_size = i32::from_le_bytes(size_bytes).max(0) as usize;
            let total_size = 4 + packet_size;
            if self.control_pipe.bytes_available() < total_size {
                // Grow the cap so a large StartProcess packet can land.
                if self.control_pipe.read_buffer_size() < total_size {
                    self.control_pipe.set_read_buffer_size(total_size);
                }
                break;
            }
            let packet = self.control_pipe.read(total_size);
            let reply = self.handle_packet(&packet[4..]);
            self.control_pipe.write(&reply.to_le_bytes());
        }
    }

    fn handle_packet(&mut self, payload: &[u8]) -> i32 {
        match parse_packet(payload) {
            Ok(AgentMsg::Ping) => 0,
            Ok(AgentMsg::StartProcess {
                program,
                cmdline,
                cwd,
                env,
                desktop,
            }) => self.handle_start_process(&program, &cmdline, &cwd, &env, &desktop),
            Ok(AgentMsg::SetSize { cols, rows }) => {
                match self.scraper.resize_window(
                    &mut self.console,
                    &mut self.data_pipe,
                    cols,
                    rows,
                ) {
                    Ok(rect) => self.decoder.set_mouse_window_rect(rect),
                    Err(error) => tracing::warn!(%error, "resize failed"),
                }
                0
            }
            Ok(AgentMsg::GetExitCode) => self.child_exit_code,
            Ok(AgentMsg::GetProcessId) => match &self.child {
                Some(child) => child.pid() as i32,
                None => -1,
            },
            Ok(AgentMsg::SetConsoleMode { mode }) => {
                self.scraper.set_console_mode(mode);
                0
            }
            Err(error) => {
                tracing::debug!(%error, "unrecognized control packet");
                -1
            }
        }
    }

    fn handle_start_process(
        &mut self,
        program: &[u16],
        cmdline: &[u16],
        cwd: &[u16],
        env: &[u16],
        desktop: &[u16],
    ) -> i32 {
        if self.child.is_some() {
            tracing::warn!("StartProcess while child is alive");
            return START_PROCESS_BUSY;
        }
        match ChildProcess::spawn(program, cmdline, cwd, env, desktop) {
            Ok(child) => {
                self.child = Some(child);
                0
            }
            Err(error) => error.code as i32,
        }
    }

    /// Bytes on the data pipe feed the decoder; the pipe itself doubles as
    /// the DSR sender.
    fn poll_data_pipe(&mut self) {
        let input = self.data_pipe.read_all();
        if !input.is_empty() {
            // Split borrows: decoder, console and data pipe are disjoint.
            let Self {
                decoder,
                console,
                data_pipe,
                ..
            } = self;
            decoder.write_input(&input, console, data_pipe);
        }

        if self.closing_data_pipe
            && !self.data_pipe.is_closed()
            && self.data_pipe.bytes_to_send() == 0
        {
            tracing::debug!("closing data pipe after data is sent");
            self.data_pipe.close_pipe();
        }
    }

    fn on_poll_timeout(&mut self) {
        // Give the decoder a chance to flush an incomplete escape
        // sequence (e.g. a bare ESC press).
        self.decoder.flush_incomplete_escape_code(&mut self.console);

        // Check for child exit before scraping so the final output still
        // gets collected below.
        if let Some(child) = &self.child {
            if let Some(code) = child.poll_exit() {
                tracing::debug!(code, "child exited");
                self.child_exit_code = code;
                self.child = None;
                self.closing_data_pipe = true;
            }
        }

        if !self.data_pipe.is_closed() {
            match self.scraper.sync_console_content_and_size(
                &mut self.console,
                &mut self.data_pipe,
                false,
            ) {
                Ok(window) => self.decoder.set_mouse_window_rect(window),
                Err(error) => tracing::warn!(%error, "scrape skipped this tick"),
            }
        }

        if self.closing_data_pipe
            && !self.data_pipe.is_closed()
            && self.data_pipe.bytes_to_send() == 0
        {
            tracing::debug!("closing data pipe after child exit");
            self.data_pipe.close_pipe();
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        tracing::debug!("agent exiting");
        self.console.post_close_message();
    }
}
