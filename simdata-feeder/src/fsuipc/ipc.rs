//! FSUIPC IPC transport.
//!
//! On Windows this speaks the FSUIPC window-message protocol: read
//! requests are laid out in a named file mapping, the mapping's atom is
//! sent to the `UIPCMAIN` window, and FSUIPC fills the data in place.
//! Everywhere else the interface does not exist and [`FsuipcIpc::probe`]
//! fails.

#[cfg(windows)]
pub use self::windows::FsuipcIpc;

#[cfg(not(windows))]
pub use self::unsupported::FsuipcIpc;

/// Upper bound FSUIPC accepts for one request block.
pub const MAX_BLOCK: usize = 0x7F00;

/// Read header: `dwId`, `dwOffset`, `nBytes`, `pDest` (4 bytes each).
pub const READ_HEADER: usize = 16;

/// Bytes a batch occupies in the mapping, including the zero terminator.
pub fn block_size(requests: &[(u32, simdata_core::Encoding)]) -> usize {
    requests
        .iter()
        .map(|(_, enc)| READ_HEADER + enc.size())
        .sum::<usize>()
        + 4
}

#[cfg(windows)]
mod windows {
    use std::ffi::CString;
    use std::ptr;
    use std::sync::atomic::{AtomicU32, Ordering};

    use winapi::shared::minwindef::{DWORD, LPARAM, UINT, WPARAM};
    use winapi::shared::windef::HWND;
    use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
    use winapi::um::memoryapi::{MapViewOfFile, UnmapViewOfFile, FILE_MAP_WRITE};
    use winapi::um::processthreadsapi::GetCurrentProcessId;
    use winapi::um::winbase::{CreateFileMappingA, GlobalAddAtomA, GlobalDeleteAtom};
    use winapi::um::winnt::{HANDLE, PAGE_READWRITE};
    use winapi::um::winuser::{FindWindowExA, RegisterWindowMessageA, SendMessageTimeoutA, SMTO_BLOCK};

    use simdata_core::{Encoding, RawValue, Result, SimDataError};

    use super::{block_size, MAX_BLOCK, READ_HEADER};
    use crate::fsuipc::OffsetLink;

    const WINDOW_CLASS: &str = "UIPCMAIN";
    const MESSAGE_NAME: &str = "FsasmLib:IPC";
    const READ_ID: DWORD = 1;
    const MESSAGE_SUCCESS: usize = 1;
    const SEND_TIMEOUT_MS: UINT = 2000;

    static MAPPING_SEQ: AtomicU32 = AtomicU32::new(0);

    fn vendor(msg: impl Into<String>) -> SimDataError {
        SimDataError::Vendor(msg.into())
    }

    fn cstr(s: &str) -> Result<CString> {
        CString::new(s).map_err(|e| vendor(e.to_string()))
    }

    struct Session {
        window: HWND,
        message: UINT,
        atom: u16,
        mapping: HANDLE,
        view: *mut u8,
    }

    /// Live link to a running FSUIPC instance.
    pub struct FsuipcIpc {
        session: Option<Session>,
        requests: Vec<(u32, Encoding)>,
    }

    // Window and mapping handles are process-wide; the link is used from
    // one thread at a time.
    unsafe impl Send for FsuipcIpc {}

    impl FsuipcIpc {
        pub fn probe() -> Result<Self> {
            Ok(FsuipcIpc {
                session: None,
                requests: Vec::new(),
            })
        }

        fn session(&self) -> Result<&Session> {
            self.session.as_ref().ok_or_else(|| vendor("link not open"))
        }
    }

    impl OffsetLink for FsuipcIpc {
        fn open(&mut self, requests: &[(u32, Encoding)]) -> Result<()> {
            self.close();
            if block_size(requests) > MAX_BLOCK {
                return Err(vendor("offset batch exceeds FSUIPC block size"));
            }

            let class = cstr(WINDOW_CLASS)?;
            let window = unsafe {
                FindWindowExA(ptr::null_mut(), ptr::null_mut(), class.as_ptr(), ptr::null())
            };
            if window.is_null() {
                return Err(vendor("FSUIPC window not found"));
            }

            let message = unsafe { RegisterWindowMessageA(cstr(MESSAGE_NAME)?.as_ptr()) };
            if message == 0 {
                return Err(vendor("RegisterWindowMessage failed"));
            }

            let seq = MAPPING_SEQ.fetch_add(1, Ordering::Relaxed);
            let name = cstr(&format!(
                "{MESSAGE_NAME}:{:X}:{:X}",
                unsafe { GetCurrentProcessId() },
                seq
            ))?;

            let atom = unsafe { GlobalAddAtomA(name.as_ptr()) };
            if atom == 0 {
                return Err(vendor("GlobalAddAtom failed"));
            }

            let mapping = unsafe {
                CreateFileMappingA(
                    INVALID_HANDLE_VALUE,
                    ptr::null_mut(),
                    PAGE_READWRITE,
                    0,
                    (MAX_BLOCK + 256) as DWORD,
                    name.as_ptr(),
                )
            };
            if mapping.is_null() {
                unsafe { GlobalDeleteAtom(atom) };
                return Err(vendor("CreateFileMapping failed"));
            }

            let view = unsafe { MapViewOfFile(mapping, FILE_MAP_WRITE, 0, 0, 0) } as *mut u8;
            if view.is_null() {
                unsafe {
                    CloseHandle(mapping);
                    GlobalDeleteAtom(atom);
                }
                return Err(vendor("MapViewOfFile failed"));
            }

            self.session = Some(Session {
                window,
                message,
                atom,
                mapping,
                view,
            });
            self.requests = requests.to_vec();
            Ok(())
        }

        fn read(&mut self) -> Result<Vec<RawValue>> {
            let session = self.session()?;
            let block = unsafe { std::slice::from_raw_parts_mut(session.view, MAX_BLOCK) };

            let mut pos = 0;
            for (offset, enc) in &self.requests {
                block[pos..pos + 4].copy_from_slice(&READ_ID.to_le_bytes());
                block[pos + 4..pos + 8].copy_from_slice(&offset.to_le_bytes());
                block[pos + 8..pos + 12].copy_from_slice(&(enc.size() as DWORD).to_le_bytes());
                block[pos + 12..pos + 16].fill(0);
                pos += READ_HEADER;
                block[pos..pos + enc.size()].fill(0);
                pos += enc.size();
            }
            block[pos..pos + 4].fill(0);

            let mut result: usize = 0;
            let sent = unsafe {
                SendMessageTimeoutA(
                    session.window,
                    session.message,
                    session.atom as WPARAM,
                    0 as LPARAM,
                    SMTO_BLOCK,
                    SEND_TIMEOUT_MS,
                    &mut result,
                )
            };
            if sent == 0 {
                return Err(vendor("FSUIPC did not answer within timeout"));
            }
            if result != MESSAGE_SUCCESS {
                return Err(vendor(format!("FSUIPC rejected request ({result})")));
            }

            let mut values = Vec::with_capacity(self.requests.len());
            let mut pos = 0;
            for (offset, enc) in &self.requests {
                pos += READ_HEADER;
                let raw = enc
                    .decode(&block[pos..pos + enc.size()])
                    .ok_or_else(|| vendor(format!("short data at {offset:#06X}")))?;
                values.push(raw);
                pos += enc.size();
            }
            Ok(values)
        }

        fn close(&mut self) {
            if let Some(s) = self.session.take() {
                unsafe {
                    UnmapViewOfFile(s.view as *const _);
                    CloseHandle(s.mapping);
                    GlobalDeleteAtom(s.atom);
                }
            }
        }
    }

    impl Drop for FsuipcIpc {
        fn drop(&mut self) {
            self.close();
        }
    }
}

#[cfg(not(windows))]
mod unsupported {
    use simdata_core::{Encoding, RawValue, Result, SimDataError};

    use crate::fsuipc::OffsetLink;

    /// Placeholder link for hosts without the FSUIPC IPC interface.
    pub struct FsuipcIpc {
        _private: (),
    }

    impl FsuipcIpc {
        pub fn probe() -> Result<Self> {
            Err(SimDataError::Vendor(
                "FSUIPC IPC requires Windows".into(),
            ))
        }
    }

    impl OffsetLink for FsuipcIpc {
        fn open(&mut self, _requests: &[(u32, Encoding)]) -> Result<()> {
            Err(SimDataError::Vendor("FSUIPC IPC requires Windows".into()))
        }

        fn read(&mut self) -> Result<Vec<RawValue>> {
            Err(SimDataError::Vendor("FSUIPC IPC requires Windows".into()))
        }

        fn close(&mut self) {}
    }
}
