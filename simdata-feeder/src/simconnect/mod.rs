//! SimConnect source: named SimVar requests against a live session.
//!
//! Every SimVar is requested each read. A single missing or non-finite
//! value invalidates the whole reading.

use simdata_core::{Field, Reading, Result, Source};

use crate::source::TelemetrySource;

mod dll;

pub use dll::SimConnectDll;

/// One named simulation variable and the units it is requested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimVar {
    pub field: Field,
    pub name: &'static str,
    pub units: &'static str,
}

/// SimVars feeding the canonical fields, in definition order.
pub const SIMVARS: [SimVar; 9] = [
    SimVar { field: Field::AltitudeFt, name: "PLANE ALTITUDE", units: "feet" },
    SimVar { field: Field::HeadingDeg, name: "PLANE HEADING DEGREES TRUE", units: "degrees" },
    SimVar { field: Field::AirspeedKt, name: "AIRSPEED INDICATED", units: "knots" },
    SimVar { field: Field::VerticalSpeedFpm, name: "VERTICAL SPEED", units: "feet per minute" },
    SimVar { field: Field::Latitude, name: "PLANE LATITUDE", units: "degrees" },
    SimVar { field: Field::Longitude, name: "PLANE LONGITUDE", units: "degrees" },
    SimVar { field: Field::PitchDeg, name: "PLANE PITCH DEGREES", units: "degrees" },
    SimVar { field: Field::BankDeg, name: "PLANE BANK DEGREES", units: "degrees" },
    SimVar { field: Field::FuelTotalGal, name: "FUEL TOTAL QUANTITY", units: "gallons" },
];

/// Session-level access to a SimConnect-style API.
pub trait SimVarLink: Send {
    /// Open a session and register `vars` for later fetches.
    fn open(&mut self, vars: &[SimVar]) -> Result<()>;

    /// Current value of every registered var, `None` where stale or missing.
    fn fetch(&mut self) -> Result<Vec<Option<f64>>>;

    fn close(&mut self);
}

/// Variant A adapter.
pub struct SimConnectAdapter<L: SimVarLink = SimConnectDll> {
    link: Option<L>,
    connected: bool,
}

impl SimConnectAdapter<SimConnectDll> {
    /// Probe for `SimConnect.dll` once. Absent library means unavailable
    /// for the rest of the process.
    pub fn probe() -> Self {
        match SimConnectDll::load() {
            Ok(dll) => {
                tracing::info!("SimConnect library found");
                SimConnectAdapter::with_link(dll)
            }
            Err(e) => {
                tracing::info!(reason = %e, "SimConnect unavailable");
                SimConnectAdapter::unavailable()
            }
        }
    }
}

impl<L: SimVarLink> SimConnectAdapter<L> {
    pub fn with_link(link: L) -> Self {
        SimConnectAdapter {
            link: Some(link),
            connected: false,
        }
    }

    pub fn unavailable() -> Self {
        SimConnectAdapter {
            link: None,
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn demote(&mut self) {
        self.connected = false;
        if let Some(link) = self.link.as_mut() {
            link.close();
        }
    }
}

impl<L: SimVarLink> TelemetrySource for SimConnectAdapter<L> {
    fn source(&self) -> Source {
        Source::SimConnect
    }

    fn available(&self) -> bool {
        self.link.is_some()
    }

    fn connect(&mut self) -> bool {
        if self.connected {
            return true;
        }
        let Some(link) = self.link.as_mut() else {
            return false;
        };
        match link.open(&SIMVARS) {
            Ok(()) => {
                tracing::info!("SimConnect session opened");
                self.connected = true;
            }
            Err(e) => tracing::debug!(error = %e, "SimConnect connect failed"),
        }
        self.connected
    }

    fn read(&mut self) -> Option<Reading> {
        if !self.connected {
            return None;
        }
        let link = self.link.as_mut()?;

        let values = match link.fetch() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "SimConnect read failed");
                self.demote();
                return None;
            }
        };

        match build_reading(&values) {
            Some(reading) => Some(reading),
            None => {
                tracing::debug!("SimConnect returned incomplete data");
                self.demote();
                None
            }
        }
    }
}

/// Fail closed: every var must be present and finite.
fn build_reading(values: &[Option<f64>]) -> Option<Reading> {
    if values.len() != SIMVARS.len() {
        return None;
    }
    let mut reading = Reading::zeroed(Source::SimConnect);
    for (var, value) in SIMVARS.iter().zip(values) {
        let v = value.filter(|v| v.is_finite())?;
        reading.set(var.field, v);
    }
    Some(reading)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Script {
        opens: usize,
        closes: usize,
        open_fails: bool,
        fetches: Vec<Result<Vec<Option<f64>>>>,
    }

    #[derive(Clone, Default)]
    struct FakeLink(Arc<Mutex<Script>>);

    impl SimVarLink for FakeLink {
        fn open(&mut self, vars: &[SimVar]) -> Result<()> {
            assert_eq!(vars.len(), 9);
            let mut s = self.0.lock().unwrap();
            s.opens += 1;
            if s.open_fails {
                return Err(simdata_core::SimDataError::Vendor("no sim".into()));
            }
            Ok(())
        }

        fn fetch(&mut self) -> Result<Vec<Option<f64>>> {
            let mut s = self.0.lock().unwrap();
            if s.fetches.is_empty() {
                return Err(simdata_core::SimDataError::Vendor("empty script".into()));
            }
            s.fetches.remove(0)
        }

        fn close(&mut self) {
            self.0.lock().unwrap().closes += 1;
        }
    }

    fn full(v: f64) -> Vec<Option<f64>> {
        (0..9).map(|i| Some(v + i as f64)).collect()
    }

    #[test]
    fn test_unavailable_never_connects() {
        let mut a = SimConnectAdapter::<FakeLink>::unavailable();
        assert!(!a.available());
        assert!(!a.connect());
        assert!(a.read().is_none());
    }

    #[test]
    fn test_connect_idempotent() {
        let link = FakeLink::default();
        let mut a = SimConnectAdapter::with_link(link.clone());
        assert!(a.available());
        assert!(a.connect());
        assert!(a.connect());
        assert_eq!(link.0.lock().unwrap().opens, 1);
    }

    #[test]
    fn test_connect_failure_is_false() {
        let link = FakeLink::default();
        link.0.lock().unwrap().open_fails = true;
        let mut a = SimConnectAdapter::with_link(link.clone());
        assert!(!a.connect());
        assert!(!a.connect());
        assert_eq!(link.0.lock().unwrap().opens, 2);
    }

    #[test]
    fn test_read_maps_fields() {
        let link = FakeLink::default();
        link.0.lock().unwrap().fetches.push(Ok(full(100.0)));
        let mut a = SimConnectAdapter::with_link(link);
        assert!(a.connect());
        let r = a.read().unwrap();
        assert_eq!(r.source, Source::SimConnect);
        assert_eq!(r.altitude_ft, 100.0);
        assert_eq!(r.heading_deg, 101.0);
        assert_eq!(r.fuel_total_gal, 108.0);
    }

    #[test]
    fn test_single_missing_value_fails_whole_read() {
        let link = FakeLink::default();
        let mut values = full(1.0);
        values[4] = None;
        link.0.lock().unwrap().fetches.push(Ok(values));
        let mut a = SimConnectAdapter::with_link(link.clone());
        assert!(a.connect());
        assert!(a.read().is_none());
        assert!(!a.is_connected());
        assert_eq!(link.0.lock().unwrap().closes, 1);
    }

    #[test]
    fn test_nan_counts_as_missing() {
        let mut values = full(1.0);
        values[0] = Some(f64::NAN);
        assert!(build_reading(&values).is_none());
    }

    #[test]
    fn test_read_failure_forces_reconnect() {
        let link = FakeLink::default();
        {
            let mut s = link.0.lock().unwrap();
            s.fetches
                .push(Err(simdata_core::SimDataError::Vendor("pipe closed".into())));
            s.fetches.push(Ok(full(5.0)));
        }
        let mut a = SimConnectAdapter::with_link(link.clone());
        assert!(a.connect());
        assert!(a.read().is_none());
        assert!(!a.is_connected());

        assert!(a.connect());
        assert_eq!(link.0.lock().unwrap().opens, 2);
        assert_eq!(a.read().unwrap().altitude_ft, 5.0);
    }
}
