// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Child-process creation and exit polling.
//!
//! The child is created inside the agent's (hidden) console, inheriting no
//! handles. Its process handle is polled every tick and closed exactly
//! once, after the exit code has been captured.

use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, HANDLE,
                                     WAIT_OBJECT_0};
use windows_sys::Win32::System::Threading::{CreateProcessW, GetExitCodeProcess,
                                            WaitForSingleObject,
                                            CREATE_UNICODE_ENVIRONMENT,
                                            PROCESS_INFORMATION, STARTUPINFOW};

/// Failure to start the child; the raw OS error code is the RPC reply.
#[derive(Debug, thiserror::Error)]
#[error("CreateProcessW failed (os error {code})")]
pub struct SpawnError {
    pub code: u32,
}

#[derive(Debug)]
pub struct ChildProcess {
    handle: HANDLE,
    pid: u32,
}

// The handle is only touched from the loop thread.
impl ChildProcess {
    /// Start the child. All string arguments arrive as un-terminated
    /// UTF-16; empty ones turn into NULL (inherit/default). `env` is a
    /// doubly-NUL-terminated block when present.
    pub fn spawn(
        program: &[u16],
        cmdline: &[u16],
        cwd: &[u16],
        env: &[u16],
        desktop: &[u16],
    ) -> Result<Self, SpawnError> {
        let program_arg = to_null_terminated(program);
        let cwd_arg = to_null_terminated(cwd);
        let desktop_arg = to_null_terminated(desktop);
        // CreateProcessW may scribble on the command line; give it its own
        // buffer.
        let mut cmdline_buf = to_null_terminated(cmdline);
        // The environment block carries its own double terminator.
        let env_arg: Option<Vec<u16>> = (!env.is_empty()).then(|| env.to_vec());

        let mut sui: STARTUPINFOW = unsafe { std::mem::zeroed() };
        sui.cb = std::mem::size_of::<STARTUPINFOW>() as u32;
        let mut desktop_buf = desktop_arg;
        sui.lpDesktop = match &mut desktop_buf {
            Some(buf) => buf.as_mut_ptr(),
            None => std::ptr::null_mut(),
        };
        let mut pi: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };

        let success = unsafe {
            CreateProcessW(
                program_arg
                    .as_ref()
                    .map_or(std::ptr::null(), |buf| buf.as_ptr()),
                cmdline_buf
                    .as_mut()
                    .map_or(std::ptr::null_mut(), |buf| buf.as_mut_ptr()),
                std::ptr::null(),
                std::ptr::null(),
                0,
                CREATE_UNICODE_ENVIRONMENT,
                env_arg
                    .as_ref()
                    .map_or(std::ptr::null(), |buf| buf.as_ptr().cast()),
                cwd_arg
                    .as_ref()
                    .map_or(std::ptr::null(), |buf| buf.as_ptr()),
                &sui,
                &mut pi,
            )
        };

        if success == 0 {
            let code = unsafe { GetLastError() };
            tracing::debug!(code, "CreateProcess failed");
            return Err(SpawnError { code });
        }

        tracing::debug!(pid = pi.dwProcessId, "CreateProcess succeeded");
        unsafe { CloseHandle(pi.hThread) };
        Ok(Self {
            handle: pi.hProcess,
            pid: pi.dwProcessId,
        })
    }

    #[must_use]
    pub fn pid(&self) -> u32 { self.pid }

    /// Non-blocking exit check; `Some(code)` once the child has exited.
    #[must_use]
    pub fn poll_exit(&self) -> Option<i32> {
        if unsafe { WaitForSingleObject(self.handle, 0) } != WAIT_OBJECT_0 {
            return None;
        }
        let mut code: u32 = 0;
        if unsafe { GetExitCodeProcess(self.handle, &mut code) } == 0 {
            tracing::debug!("GetExitCodeProcess failed");
            return Some(-1);
        }
        Some(code as i32)
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.handle) };
    }
}

fn to_null_terminated(units: &[u16]) -> Option<Vec<u16>> {
    if units.is_empty() {
        return None;
    }
    let mut buf = units.to_vec();
    buf.push(0);
    Some(buf)
}
