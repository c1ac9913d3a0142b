//! simdata-feeder: Telemetry sources and the background poller.
//!
//! Sources:
//! - `SimConnectAdapter`: named SimVar requests through `SimConnect.dll`
//! - `FsuipcAdapter`:     raw offset reads through the FSUIPC IPC interface
//! - `MockSource`:        synthetic flight, opt-in
//!
//! The `Poller` owns the sources and writes into a shared `ReadingStore`.

pub mod fsuipc;
pub mod mock;
pub mod poller;
pub mod simconnect;
pub mod source;

pub use fsuipc::{FsuipcAdapter, OffsetLink};
pub use mock::MockSource;
pub use poller::{default_sources, CycleOutcome, Poller, PollerHandle, PollerState};
pub use simconnect::{SimConnectAdapter, SimVar, SimVarLink};
pub use source::TelemetrySource;
