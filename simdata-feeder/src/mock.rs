//! Synthetic flight for running the dashboard without a simulator.

use std::time::Instant;

use simdata_core::{Reading, Source};

use crate::source::TelemetrySource;

/// Slow orbit near 31.25N 121.50E with gentle climbs and banks.
pub struct MockSource {
    started: Instant,
}

impl MockSource {
    pub fn new() -> Self {
        MockSource {
            started: Instant::now(),
        }
    }

    /// Reading `elapsed` seconds into the synthetic flight.
    pub fn reading_at(elapsed: f64) -> Reading {
        let mut r = Reading::zeroed(Source::Mock);
        r.altitude_ft = 3500.0 + 800.0 * (elapsed / 8.0).sin();
        r.heading_deg = (elapsed * 6.0) % 360.0;
        r.airspeed_kt = 120.0 + 25.0 * (elapsed / 5.0).sin();
        r.vertical_speed_fpm = 400.0 * (elapsed / 4.0).sin();
        r.latitude = 31.25 + 0.05 * (elapsed / 15.0).sin();
        r.longitude = 121.50 + 0.05 * (elapsed / 15.0).cos();
        r.pitch_deg = 2.5 * (elapsed / 6.0).sin();
        r.bank_deg = 10.0 * (elapsed / 7.0).sin();
        r.fuel_total_gal = 56.0 - elapsed / 1200.0;
        r
    }
}

impl Default for MockSource {
    fn default() -> Self {
        MockSource::new()
    }
}

impl TelemetrySource for MockSource {
    fn source(&self) -> Source {
        Source::Mock
    }

    fn available(&self) -> bool {
        true
    }

    fn connect(&mut self) -> bool {
        true
    }

    fn read(&mut self) -> Option<Reading> {
        Some(MockSource::reading_at(self.started.elapsed().as_secs_f64()))
    }
}
