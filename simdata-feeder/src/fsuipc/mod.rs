//! FSUIPC source: a batch of raw values at fixed memory offsets.
//!
//! Offsets, encodings and scaling come from the [`Catalog`]. A failed
//! batch read invalidates the whole reading and forces a reconnect.

use simdata_core::{Catalog, Encoding, RawValue, Reading, Result, Source};

use crate::source::TelemetrySource;

pub mod ipc;

pub use ipc::FsuipcIpc;

/// Offset-level access to an FSUIPC-style shared memory interface.
pub trait OffsetLink: Send {
    /// Connect and prepare the `(offset, encoding)` batch read by [`OffsetLink::read`].
    fn open(&mut self, requests: &[(u32, Encoding)]) -> Result<()>;

    /// One raw value per prepared request, in request order.
    fn read(&mut self) -> Result<Vec<RawValue>>;

    fn close(&mut self);
}

/// Variant B adapter.
pub struct FsuipcAdapter<L: OffsetLink = FsuipcIpc> {
    link: Option<L>,
    catalog: Catalog,
    connected: bool,
}

impl FsuipcAdapter<FsuipcIpc> {
    /// Probe the platform IPC interface once.
    pub fn probe(catalog: Catalog) -> Self {
        match FsuipcIpc::probe() {
            Ok(ipc) => {
                tracing::info!(fields = catalog.len(), "FSUIPC interface present");
                FsuipcAdapter::with_link(ipc, catalog)
            }
            Err(e) => {
                tracing::info!(reason = %e, "FSUIPC unavailable");
                FsuipcAdapter::unavailable(catalog)
            }
        }
    }
}

impl<L: OffsetLink> FsuipcAdapter<L> {
    pub fn with_link(link: L, catalog: Catalog) -> Self {
        FsuipcAdapter {
            link: Some(link),
            catalog,
            connected: false,
        }
    }

    pub fn unavailable(catalog: Catalog) -> Self {
        FsuipcAdapter {
            link: None,
            catalog,
            connected: false,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
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

impl<L: OffsetLink> TelemetrySource for FsuipcAdapter<L> {
    fn source(&self) -> Source {
        Source::Fsuipc
    }

    fn available(&self) -> bool {
        self.link.is_some()
    }

    fn connect(&mut self) -> bool {
        if self.connected {
            return true;
        }
        let requests = self.catalog.requests();
        let Some(link) = self.link.as_mut() else {
            return false;
        };
        match link.open(&requests) {
            Ok(()) => {
                tracing::info!(offsets = requests.len(), "FSUIPC link opened");
                self.connected = true;
            }
            Err(e) => tracing::debug!(error = %e, "FSUIPC connect failed"),
        }
        self.connected
    }

    fn read(&mut self) -> Option<Reading> {
        if !self.connected {
            return None;
        }
        let link = self.link.as_mut()?;

        let raws = match link.read() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "FSUIPC read failed");
                self.demote();
                return None;
            }
        };

        let reading = self.catalog.decode(&raws, Source::Fsuipc);
        if reading.is_none() {
            tracing::warn!(
                expected = self.catalog.len(),
                got = raws.len(),
                "FSUIPC batch does not match catalog"
            );
            self.demote();
        }
        reading
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use simdata_core::SimDataError;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Script {
        opens: usize,
        closes: usize,
        prepared: Vec<(u32, Encoding)>,
        reads: Vec<Result<Vec<RawValue>>>,
    }

    #[derive(Clone, Default)]
    struct FakeLink(Arc<Mutex<Script>>);

    impl OffsetLink for FakeLink {
        fn open(&mut self, requests: &[(u32, Encoding)]) -> Result<()> {
            let mut s = self.0.lock().unwrap();
            s.opens += 1;
            s.prepared = requests.to_vec();
            Ok(())
        }

        fn read(&mut self) -> Result<Vec<RawValue>> {
            let mut s = self.0.lock().unwrap();
            if s.reads.is_empty() {
                return Err(SimDataError::Vendor("empty script".into()));
            }
            s.reads.remove(0)
        }

        fn close(&mut self) {
            self.0.lock().unwrap().closes += 1;
        }
    }

    fn altitude_batch(raw_alt: i64) -> Vec<RawValue> {
        let mut v = vec![RawValue::Int(0); 9];
        v[0] = RawValue::Int(raw_alt);
        v
    }

    #[test]
    fn test_connect_prepares_catalog_batch() {
        let link = FakeLink::default();
        let mut a = FsuipcAdapter::with_link(link.clone(), Catalog::defaults());
        assert!(a.connect());
        let s = link.0.lock().unwrap();
        assert_eq!(s.prepared.len(), 9);
        assert_eq!(s.prepared[0], (0x0570, Encoding::I64));
        assert_eq!(s.prepared[2], (0x02BC, Encoding::U16));
    }

    #[test]
    fn test_read_applies_scale() {
        let link = FakeLink::default();
        link.0.lock().unwrap().reads.push(Ok(altitude_batch(229376)));
        let mut a = FsuipcAdapter::with_link(link, Catalog::defaults());
        assert!(a.connect());
        let r = a.read().unwrap();
        assert_eq!(r.altitude_ft, 3.5);
        assert_eq!(r.source, Source::Fsuipc);
    }

    #[test]
    fn test_read_failure_demotes_and_reconnects() {
        let link = FakeLink::default();
        {
            let mut s = link.0.lock().unwrap();
            s.reads.push(Err(SimDataError::Vendor("timeout".into())));
            s.reads.push(Ok(altitude_batch(65536)));
        }
        let mut a = FsuipcAdapter::with_link(link.clone(), Catalog::defaults());
        assert!(a.connect());
        assert!(a.read().is_none());
        assert!(!a.is_connected());
        assert!(a.read().is_none(), "no read while disconnected");

        assert!(a.connect());
        assert_eq!(link.0.lock().unwrap().opens, 2);
        assert_eq!(link.0.lock().unwrap().closes, 1);
        assert_eq!(a.read().unwrap().altitude_ft, 1.0);
    }

    #[test]
    fn test_short_batch_is_failure() {
        let link = FakeLink::default();
        link.0.lock().unwrap().reads.push(Ok(vec![RawValue::Int(1)]));
        let mut a = FsuipcAdapter::with_link(link, Catalog::defaults());
        assert!(a.connect());
        assert!(a.read().is_none());
        assert!(!a.is_connected());
    }

    #[test]
    fn test_unavailable() {
        let mut a = FsuipcAdapter::<FakeLink>::unavailable(Catalog::defaults());
        assert!(!a.available());
        assert!(!a.connect());
        assert!(a.read().is_none());
    }
}
