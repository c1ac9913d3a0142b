//! Runtime binding to `SimConnect.dll` via `libloading`.
//!
//! The library is loaded once by [`SimConnectDll::load`]; a missing DLL
//! (any non-Windows host, or no simulator SDK installed) makes the
//! SimConnect source unavailable. All nine SimVars are registered as
//! FLOAT64 in one data definition and requested once per fetch.

use std::ffi::{c_char, c_void, CString};
use std::ptr;
use std::thread;
use std::time::{Duration, Instant};

use libloading::Library;

use simdata_core::{Result, SimDataError};

use super::{SimVar, SimVarLink};

/// How long a fetch waits for the requested data before calling it stale.
pub const STALE_WINDOW: Duration = Duration::from_millis(2000);

const DISPATCH_POLL: Duration = Duration::from_millis(10);

const LIBRARY_NAME: &str = "SimConnect.dll";
const CLIENT_NAME: &str = "simdata";

const S_OK: i32 = 0;
const DEFINE_ID: u32 = 1;
const OBJECT_ID_USER: u32 = 0;
const UNUSED: u32 = 0xFFFF_FFFF;
const DATATYPE_FLOAT64: u32 = 4;
const PERIOD_ONCE: u32 = 1;

const RECV_ID_EXCEPTION: u32 = 1;
const RECV_ID_QUIT: u32 = 3;
const RECV_ID_SIMOBJECT_DATA: u32 = 8;

/// `SIMCONNECT_RECV_SIMOBJECT_DATA` up to `dwData` (packed, 10 DWORDs).
const SIMOBJECT_DATA_HEADER: usize = 40;
const REQUEST_ID_AT: usize = 12;

type Handle = *mut c_void;

type OpenFn =
    unsafe extern "system" fn(*mut Handle, *const c_char, *mut c_void, u32, *mut c_void, u32) -> i32;
type CloseFn = unsafe extern "system" fn(Handle) -> i32;
type AddToDataDefinitionFn =
    unsafe extern "system" fn(Handle, u32, *const c_char, *const c_char, u32, f32, u32) -> i32;
type RequestDataOnSimObjectFn =
    unsafe extern "system" fn(Handle, u32, u32, u32, u32, u32, u32, u32, u32) -> i32;
type GetNextDispatchFn = unsafe extern "system" fn(Handle, *mut *mut u8, *mut u32) -> i32;

struct Api {
    open: OpenFn,
    close: CloseFn,
    add_to_data_definition: AddToDataDefinitionFn,
    request_data: RequestDataOnSimObjectFn,
    get_next_dispatch: GetNextDispatchFn,
}

/// Loaded SimConnect client library plus at most one open session.
pub struct SimConnectDll {
    api: Api,
    handle: Option<Handle>,
    var_count: usize,
    request_id: u32,
    // Keeps the function pointers in `api` valid.
    _lib: Library,
}

// The session handle is only touched by the thread that owns the adapter.
unsafe impl Send for SimConnectDll {}

fn vendor(msg: impl Into<String>) -> SimDataError {
    SimDataError::Vendor(msg.into())
}

impl SimConnectDll {
    pub fn load() -> Result<Self> {
        let lib = unsafe { Library::new(LIBRARY_NAME) }
            .map_err(|e| vendor(format!("{LIBRARY_NAME} not loadable: {e}")))?;

        let api = unsafe {
            Api {
                open: *lib
                    .get::<OpenFn>(b"SimConnect_Open\0")
                    .map_err(|e| vendor(e.to_string()))?,
                close: *lib
                    .get::<CloseFn>(b"SimConnect_Close\0")
                    .map_err(|e| vendor(e.to_string()))?,
                add_to_data_definition: *lib
                    .get::<AddToDataDefinitionFn>(b"SimConnect_AddToDataDefinition\0")
                    .map_err(|e| vendor(e.to_string()))?,
                request_data: *lib
                    .get::<RequestDataOnSimObjectFn>(b"SimConnect_RequestDataOnSimObject\0")
                    .map_err(|e| vendor(e.to_string()))?,
                get_next_dispatch: *lib
                    .get::<GetNextDispatchFn>(b"SimConnect_GetNextDispatch\0")
                    .map_err(|e| vendor(e.to_string()))?,
            }
        };

        Ok(SimConnectDll {
            api,
            handle: None,
            var_count: 0,
            request_id: 0,
            _lib: lib,
        })
    }

    fn register(&self, handle: Handle, vars: &[SimVar]) -> Result<()> {
        for var in vars {
            let name = CString::new(var.name).map_err(|e| vendor(e.to_string()))?;
            let units = CString::new(var.units).map_err(|e| vendor(e.to_string()))?;
            let hr = unsafe {
                (self.api.add_to_data_definition)(
                    handle,
                    DEFINE_ID,
                    name.as_ptr(),
                    units.as_ptr(),
                    DATATYPE_FLOAT64,
                    0.0,
                    UNUSED,
                )
            };
            if hr != S_OK {
                return Err(vendor(format!("AddToDataDefinition({}) = {hr:#x}", var.name)));
            }
        }
        Ok(())
    }

    /// Copy the FLOAT64 block out of a SIMOBJECT_DATA message.
    fn decode_data(&self, msg: &[u8]) -> Vec<Option<f64>> {
        (0..self.var_count)
            .map(|i| {
                let at = SIMOBJECT_DATA_HEADER + i * 8;
                msg.get(at..at + 8)
                    .and_then(|b| b.try_into().ok())
                    .map(f64::from_le_bytes)
            })
            .collect()
    }
}

fn read_u32(msg: &[u8], at: usize) -> Option<u32> {
    msg.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
}

impl SimVarLink for SimConnectDll {
    fn open(&mut self, vars: &[SimVar]) -> Result<()> {
        self.close();

        let name = CString::new(CLIENT_NAME).map_err(|e| vendor(e.to_string()))?;
        let mut handle: Handle = ptr::null_mut();
        let hr = unsafe {
            (self.api.open)(&mut handle, name.as_ptr(), ptr::null_mut(), 0, ptr::null_mut(), 0)
        };
        if hr != S_OK || handle.is_null() {
            return Err(vendor(format!("SimConnect_Open = {hr:#x}")));
        }

        if let Err(e) = self.register(handle, vars) {
            unsafe { (self.api.close)(handle) };
            return Err(e);
        }
        self.handle = Some(handle);
        self.var_count = vars.len();
        Ok(())
    }

    fn fetch(&mut self) -> Result<Vec<Option<f64>>> {
        let handle = self.handle.ok_or_else(|| vendor("session not open"))?;
        self.request_id = self.request_id.wrapping_add(1);
        let request_id = self.request_id;

        let hr = unsafe {
            (self.api.request_data)(
                handle,
                request_id,
                DEFINE_ID,
                OBJECT_ID_USER,
                PERIOD_ONCE,
                0,
                0,
                0,
                0,
            )
        };
        if hr != S_OK {
            return Err(vendor(format!("RequestDataOnSimObject = {hr:#x}")));
        }

        let deadline = Instant::now() + STALE_WINDOW;
        loop {
            if Instant::now() >= deadline {
                return Err(vendor("no data within staleness window"));
            }

            let mut data: *mut u8 = ptr::null_mut();
            let mut len: u32 = 0;
            let hr = unsafe { (self.api.get_next_dispatch)(handle, &mut data, &mut len) };

            if hr == S_OK && !data.is_null() && len >= 12 {
                // Valid until the next GetNextDispatch call on this handle.
                let msg = unsafe { std::slice::from_raw_parts(data as *const u8, len as usize) };
                match read_u32(msg, 8) {
                    Some(RECV_ID_SIMOBJECT_DATA)
                        if read_u32(msg, REQUEST_ID_AT) == Some(request_id) =>
                    {
                        return Ok(self.decode_data(msg));
                    }
                    Some(RECV_ID_QUIT) => return Err(vendor("simulator quit")),
                    Some(RECV_ID_EXCEPTION) => {
                        tracing::debug!(exception = ?read_u32(msg, 12), "SimConnect exception");
                    }
                    _ => {}
                }
                continue;
            }
            thread::sleep(DISPATCH_POLL);
        }
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            unsafe { (self.api.close)(handle) };
        }
    }
}

impl Drop for SimConnectDll {
    fn drop(&mut self) {
        self.close();
    }
}
