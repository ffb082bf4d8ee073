// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! [`ConsoleApi`] over the live Win32 console.
//!
//! One instance owns the `CONOUT$` handle for the currently active screen
//! buffer. The agent drops and reopens the instance every tick because the
//! child may have switched the active buffer with
//! `SetConsoleActiveScreenBuffer` at any time.

use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, GENERIC_READ,
                                     GENERIC_WRITE, HANDLE, HWND,
                                     INVALID_HANDLE_VALUE};
use windows_sys::Win32::Storage::FileSystem::{CreateFileW, FILE_SHARE_READ,
                                              FILE_SHARE_WRITE, OPEN_EXISTING};
use windows_sys::Win32::System::Console::{FillConsoleOutputAttribute,
                                          FillConsoleOutputCharacterW,
                                          GenerateConsoleCtrlEvent, GetConsoleMode,
                                          GetConsoleScreenBufferInfo,
                                          GetConsoleTitleW, GetConsoleWindow,
                                          GetStdHandle, ReadConsoleOutputW,
                                          SetConsoleCursorPosition,
                                          SetConsoleScreenBufferSize,
                                          SetConsoleTextAttribute, SetConsoleTitleW,
                                          SetConsoleWindowInfo, WriteConsoleInputW,
                                          WriteConsoleOutputW, CHAR_INFO, CHAR_INFO_0,
                                          CONSOLE_SCREEN_BUFFER_INFO, COORD,
                                          CTRL_C_EVENT, ENABLE_MOUSE_INPUT,
                                          ENABLE_PROCESSED_INPUT,
                                          ENABLE_QUICK_EDIT_MODE, INPUT_RECORD,
                                          INPUT_RECORD_0, KEY_EVENT_RECORD,
                                          KEY_EVENT_RECORD_0, MOUSE_EVENT_RECORD,
                                          SMALL_RECT, STD_INPUT_HANDLE};
use windows_sys::Win32::System::SystemInformation::{GetVersionExW, OSVERSIONINFOW};
use windows_sys::Win32::UI::WindowsAndMessaging::{PostMessageW, SendMessageW,
                                                  ShowWindow, SW_HIDE, WM_CHAR,
                                                  WM_CLOSE, WM_SYSCOMMAND};

use super::{ConsoleApi, ConsoleError, ConsoleResult, FreezeCommand};
use crate::core::{Cell, Coord, Rect, ScreenBufferInfo};
use crate::input::records::{InputRecord, KeyEvent as KeyRecord,
                            MouseEvent as MouseRecord};

/// True from Windows 8 (6.2) on, regardless of how the executable is
/// manifested.
fn is_windows8_or_greater() -> bool {
    let mut info: OSVERSIONINFOW = unsafe { std::mem::zeroed() };
    info.dwOSVersionInfoSize = std::mem::size_of::<OSVERSIONINFOW>() as u32;
    if unsafe { GetVersionExW(&mut info) } == 0 {
        return false;
    }
    info.dwMajorVersion > 6 || (info.dwMajorVersion == 6 && info.dwMinorVersion >= 2)
}

fn last_error(operation: &'static str) -> ConsoleError {
    ConsoleError::new(operation, unsafe { GetLastError() })
}

fn to_coord(c: Coord) -> COORD { COORD { X: c.x, Y: c.y } }

/// The host uses inclusive edges for window rectangles.
fn to_small_rect(r: Rect) -> SMALL_RECT {
    SMALL_RECT {
        Left: r.left,
        Top: r.top,
        Right: r.right(),
        Bottom: r.bottom(),
    }
}

fn from_small_rect(r: &SMALL_RECT) -> Rect {
    Rect::new(r.Left, r.Top, r.Right - r.Left + 1, r.Bottom - r.Top + 1)
}

fn wide_null(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

#[derive(Debug)]
pub struct Win32Console {
    conin: HANDLE,
    conout: HANDLE,
    title_work_buf: Vec<u16>,
    large_reads: bool,
}

impl Win32Console {
    pub fn open() -> ConsoleResult<Self> {
        let conin = unsafe { GetStdHandle(STD_INPUT_HANDLE) };
        let conout = Self::open_conout()?;
        Ok(Self {
            conin,
            conout,
            title_work_buf: vec![0; 16],
            large_reads: is_windows8_or_greater(),
        })
    }

    fn open_conout() -> ConsoleResult<HANDLE> {
        let name = wide_null("CONOUT$");
        let handle = unsafe {
            CreateFileW(
                name.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                std::ptr::null(),
                OPEN_EXISTING,
                0,
                std::ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(last_error("CreateFileW(CONOUT$)"));
        }
        Ok(handle)
    }

    fn hwnd(&self) -> HWND { unsafe { GetConsoleWindow() } }

    /// Hide the console window (skipped when `WINPTY_SHOW_CONSOLE` is set).
    pub fn hide_window(&self) {
        let hwnd = self.hwnd();
        if !hwnd.is_null() {
            unsafe { ShowWindow(hwnd, SW_HIDE) };
        }
    }

    fn input_mode(&self) -> u32 {
        let mut mode: u32 = 0;
        if unsafe { GetConsoleMode(self.conin, &mut mode) } == 0 {
            tracing::debug!("GetConsoleMode failed: {}", unsafe { GetLastError() });
        }
        mode
    }
}

impl Drop for Win32Console {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.conout) };
    }
}

impl ConsoleApi for Win32Console {
    fn reopen(&mut self) -> ConsoleResult<()> {
        let next = Self::open_conout()?;
        unsafe { CloseHandle(self.conout) };
        self.conout = next;
        Ok(())
    }

    fn buffer_info(&mut self) -> ConsoleResult<ScreenBufferInfo> {
        let mut info: CONSOLE_SCREEN_BUFFER_INFO = unsafe { std::mem::zeroed() };
        if unsafe { GetConsoleScreenBufferInfo(self.conout, &mut info) } == 0 {
            return Err(last_error("GetConsoleScreenBufferInfo"));
        }
        Ok(ScreenBufferInfo {
            buffer_size: Coord::new(info.dwSize.X, info.dwSize.Y),
            window: from_small_rect(&info.srWindow),
            cursor: Coord::new(info.dwCursorPosition.X, info.dwCursorPosition.Y),
            attributes: info.wAttributes,
        })
    }

    fn resize_buffer(&mut self, size: Coord) -> ConsoleResult<()> {
        if unsafe { SetConsoleScreenBufferSize(self.conout, to_coord(size)) } == 0 {
            return Err(last_error("SetConsoleScreenBufferSize"));
        }
        Ok(())
    }

    fn move_window(&mut self, rect: Rect) -> ConsoleResult<()> {
        let sr = to_small_rect(rect);
        if unsafe { SetConsoleWindowInfo(self.conout, 1, &sr) } == 0 {
            return Err(last_error("SetConsoleWindowInfo"));
        }
        Ok(())
    }

    fn set_cursor_position(&mut self, pos: Coord) -> ConsoleResult<()> {
        if unsafe { SetConsoleCursorPosition(self.conout, to_coord(pos)) } == 0 {
            return Err(last_error("SetConsoleCursorPosition"));
        }
        Ok(())
    }

    fn set_text_attribute(&mut self, attributes: u16) -> ConsoleResult<()> {
        if unsafe { SetConsoleTextAttribute(self.conout, attributes) } == 0 {
            return Err(last_error("SetConsoleTextAttribute"));
        }
        Ok(())
    }

    fn clear_lines(
        &mut self,
        row: i16,
        count: i16,
        info: &ScreenBufferInfo,
    ) -> ConsoleResult<()> {
        let length = u32::from(info.buffer_size.x as u16) * u32::from(count as u16);
        let origin = to_coord(Coord::new(0, row));
        let mut actual: u32 = 0;
        if unsafe {
            FillConsoleOutputCharacterW(self.conout, b' ' as u16, length, origin,
                                        &mut actual)
        } == 0
            || actual != length
        {
            return Err(last_error("FillConsoleOutputCharacterW"));
        }
        if unsafe {
            FillConsoleOutputAttribute(self.conout, info.attributes, length, origin,
                                       &mut actual)
        } == 0
            || actual != length
        {
            return Err(last_error("FillConsoleOutputAttribute"));
        }
        Ok(())
    }

    fn read(&mut self, rect: Rect, data: &mut [Cell]) -> ConsoleResult<()> {
        debug_assert_eq!(data.len(), rect.width as usize * rect.height as usize);
        let mut cells: Vec<CHAR_INFO> = vec![
            CHAR_INFO {
                Char: CHAR_INFO_0 { UnicodeChar: 0 },
                Attributes: 0,
            };
            data.len()
        ];
        let mut region = to_small_rect(rect);
        if unsafe {
            ReadConsoleOutputW(
                self.conout,
                cells.as_mut_ptr(),
                to_coord(Coord::new(rect.width, rect.height)),
                COORD { X: 0, Y: 0 },
                &mut region,
            )
        } == 0
        {
            return Err(last_error("ReadConsoleOutputW"));
        }
        for (dst, src) in data.iter_mut().zip(&cells) {
            *dst = Cell::new(unsafe { src.Char.UnicodeChar }, src.Attributes);
        }
        Ok(())
    }

    fn write(&mut self, rect: Rect, data: &[Cell]) -> ConsoleResult<()> {
        debug_assert_eq!(data.len(), rect.width as usize * rect.height as usize);
        let cells: Vec<CHAR_INFO> = data
            .iter()
            .map(|cell| CHAR_INFO {
                Char: CHAR_INFO_0 {
                    UnicodeChar: cell.unit,
                },
                Attributes: cell.attributes,
            })
            .collect();
        let mut region = to_small_rect(rect);
        if unsafe {
            WriteConsoleOutputW(
                self.conout,
                cells.as_ptr(),
                to_coord(Coord::new(rect.width, rect.height)),
                COORD { X: 0, Y: 0 },
                &mut region,
            )
        } == 0
        {
            return Err(last_error("WriteConsoleOutputW"));
        }
        Ok(())
    }

    fn write_input(&mut self, records: &[InputRecord]) -> ConsoleResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let native: Vec<INPUT_RECORD> = records.iter().map(to_input_record).collect();
        let mut written: u32 = 0;
        if unsafe {
            WriteConsoleInputW(self.conin, native.as_ptr(), native.len() as u32,
                               &mut written)
        } == 0
        {
            return Err(last_error("WriteConsoleInputW"));
        }
        Ok(())
    }

    fn title(&mut self) -> ConsoleResult<String> {
        // GetConsoleTitleW is tricky. On XP it returns the truncated length
        // and does not NUL-terminate an empty title; on Vista and Windows 7
        // the size argument is misread as a byte count rather than a
        // wchar count. Growing the buffer until (count + 1) * 2 elements
        // fit satisfies every variant.
        loop {
            let count = unsafe {
                GetConsoleTitleW(self.title_work_buf.as_mut_ptr(),
                                 self.title_work_buf.len() as u32)
            } as usize;
            let needed = (count + 1) * 2;
            if self.title_work_buf.len() < needed {
                self.title_work_buf.resize(needed, 0);
                continue;
            }
            return Ok(String::from_utf16_lossy(&self.title_work_buf[..count]));
        }
    }

    fn set_title(&mut self, title: &str) -> ConsoleResult<()> {
        let wide = wide_null(title);
        if unsafe { SetConsoleTitleW(wide.as_ptr()) } == 0 {
            return Err(last_error("SetConsoleTitleW"));
        }
        Ok(())
    }

    fn processed_input_mode(&mut self) -> bool {
        self.input_mode() & ENABLE_PROCESSED_INPUT == ENABLE_PROCESSED_INPUT
    }

    fn mouse_input_enabled(&mut self) -> bool {
        let mode = self.input_mode();
        mode & ENABLE_MOUSE_INPUT != 0 && mode & ENABLE_QUICK_EDIT_MODE == 0
    }

    fn generate_ctrl_c_event(&mut self) {
        let ret = unsafe { GenerateConsoleCtrlEvent(CTRL_C_EVENT, 0) };
        tracing::debug!(ret, "GenerateConsoleCtrlEvent");
    }

    fn post_close_message(&mut self) {
        let hwnd = self.hwnd();
        if !hwnd.is_null() {
            unsafe { PostMessageW(hwnd, WM_CLOSE, 0, 0) };
        }
    }

    fn send_sys_command(&mut self, command: FreezeCommand) {
        unsafe {
            SendMessageW(self.hwnd(), WM_SYSCOMMAND,
                         command.syscommand() as usize, 0)
        };
    }

    fn send_escape(&mut self) {
        unsafe { SendMessageW(self.hwnd(), WM_CHAR, 27, 0x0001_0001) };
    }

    fn supports_large_reads(&self) -> bool { self.large_reads }
}

fn to_input_record(record: &InputRecord) -> INPUT_RECORD {
    match record {
        InputRecord::Key(key) => to_key_record(key),
        InputRecord::Mouse(mouse) => to_mouse_record(mouse),
    }
}

const KEY_EVENT_TYPE: u16 = 0x0001;
const MOUSE_EVENT_TYPE: u16 = 0x0002;

fn to_key_record(key: &KeyRecord) -> INPUT_RECORD {
    INPUT_RECORD {
        EventType: KEY_EVENT_TYPE,
        Event: INPUT_RECORD_0 {
            KeyEvent: KEY_EVENT_RECORD {
                bKeyDown: i32::from(key.key_down),
                wRepeatCount: key.repeat_count,
                wVirtualKeyCode: key.virtual_key,
                wVirtualScanCode: key.scan_code,
                uChar: KEY_EVENT_RECORD_0 {
                    UnicodeChar: key.unicode_char,
                },
                dwControlKeyState: key.control_key_state,
            },
        },
    }
}

fn to_mouse_record(mouse: &MouseRecord) -> INPUT_RECORD {
    INPUT_RECORD {
        EventType: MOUSE_EVENT_TYPE,
        Event: INPUT_RECORD_0 {
            MouseEvent: MOUSE_EVENT_RECORD {
                dwMousePosition: to_coord(mouse.position),
                dwButtonState: mouse.button_state,
                dwControlKeyState: mouse.control_key_state,
                dwEventFlags: mouse.event_flags,
            },
        },
    }
}
