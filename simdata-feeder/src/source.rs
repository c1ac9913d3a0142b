//! Telemetry source contract shared by every adapter.

use simdata_core::{Reading, Source};

/// One vendor interface bridged to the canonical [`Reading`].
///
/// Failures are reported through the return values, never by panicking:
/// the poller's cycle is a flat decision over `available`, `connect` and
/// `read`.
pub trait TelemetrySource: Send {
    /// Provenance tag stamped on readings from this source.
    fn source(&self) -> Source;

    /// Whether the vendor interface exists on this machine.
    ///
    /// Fixed at construction; no side effects.
    fn available(&self) -> bool;

    /// Open a live handle if there isn't one. Returns the connected state.
    ///
    /// Idempotent while connected.
    fn connect(&mut self) -> bool;

    /// A complete reading, or `None` on any failure.
    ///
    /// A failed read drops the connection so the next `connect` retries
    /// instead of reusing a dead handle.
    fn read(&mut self) -> Option<Reading>;
}
