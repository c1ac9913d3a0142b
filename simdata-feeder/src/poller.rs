//! Background poller: arbitrates between sources and feeds the store.
//!
//! One long-lived thread runs for the life of the process. `start` and
//! `stop` only flip the running flag; while armed the thread idles on a
//! short tick so a `start` is picked up quickly.
//!
//! Each running cycle tries the sources in priority order (SimConnect,
//! FSUIPC, then the optional mock). The first complete reading wins and is
//! published; if none produces one the store gets an `unavailable` marker
//! with the previous numbers kept.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use simdata_core::config::PollerConfig;
use simdata_core::{Catalog, ReadingStore, Source};

use crate::fsuipc::FsuipcAdapter;
use crate::mock::MockSource;
use crate::simconnect::SimConnectAdapter;
use crate::source::TelemetrySource;

/// Externally visible poller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    ArmedIdle,
    Running,
}

/// Result of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Published(Source),
    Unavailable,
}

/// Probe the vendor interfaces once and return them in priority order.
pub fn default_sources(catalog: Catalog, mock: bool) -> Vec<Box<dyn TelemetrySource>> {
    let mut sources: Vec<Box<dyn TelemetrySource>> = vec![
        Box::new(SimConnectAdapter::probe()),
        Box::new(FsuipcAdapter::probe(catalog)),
    ];
    if mock {
        sources.push(Box::new(MockSource::new()));
    }
    sources
}

pub struct Poller {
    store: Arc<ReadingStore>,
    sources: Vec<Box<dyn TelemetrySource>>,
    config: PollerConfig,
    warmed_up: bool,
    last: Option<CycleOutcome>,
}

impl Poller {
    /// `sources` are tried in the given order every cycle.
    pub fn new(
        store: Arc<ReadingStore>,
        sources: Vec<Box<dyn TelemetrySource>>,
        config: PollerConfig,
    ) -> Self {
        Poller {
            store,
            sources,
            config,
            warmed_up: false,
            last: None,
        }
    }

    pub fn store(&self) -> &Arc<ReadingStore> {
        &self.store
    }

    pub fn sources(&self) -> impl Iterator<Item = &dyn TelemetrySource> {
        self.sources.iter().map(|s| s.as_ref())
    }

    /// One connect attempt per available source, in priority order.
    pub fn warm_up(&mut self) {
        for source in self.sources.iter_mut().filter(|s| s.available()) {
            let connected = source.connect();
            tracing::info!(source = %source.source(), connected, "Warm-up connect");
        }
        self.warmed_up = true;
    }

    /// Run one read-and-publish step.
    pub fn cycle(&mut self) -> CycleOutcome {
        let mut outcome = CycleOutcome::Unavailable;
        for source in self.sources.iter_mut() {
            if !source.available() || !source.connect() {
                continue;
            }
            if let Some(reading) = source.read() {
                outcome = CycleOutcome::Published(reading.source);
                self.store.publish(reading);
                break;
            }
        }

        if outcome == CycleOutcome::Unavailable {
            self.store.mark_unavailable();
        }

        if self.last != Some(outcome) {
            match outcome {
                CycleOutcome::Published(source) => {
                    tracing::info!(%source, "Receiving telemetry")
                }
                CycleOutcome::Unavailable => tracing::warn!("No telemetry source available"),
            }
            self.last = Some(outcome);
        }
        outcome
    }

    /// Move the poller onto its own thread, armed but idle.
    pub fn spawn(self) -> io::Result<PollerHandle> {
        let control = Arc::new(Control {
            running: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });

        let thread = {
            let control = Arc::clone(&control);
            thread::Builder::new()
                .name("simdata-poller".into())
                .spawn(move || self.run(&control))?
        };

        Ok(PollerHandle {
            control,
            thread: Some(thread),
        })
    }

    fn run(mut self, control: &Control) {
        tracing::info!(
            sources = self.sources.len(),
            interval_ms = self.config.interval_ms,
            "Poller thread started"
        );

        while !control.shutdown.load(Ordering::SeqCst) {
            if !control.running.load(Ordering::SeqCst) {
                thread::park_timeout(self.config.idle_tick());
                continue;
            }

            if !self.warmed_up {
                self.warm_up();
            }

            let started = Instant::now();
            let outcome = self.cycle();
            let elapsed = started.elapsed();
            if elapsed > self.config.interval() * 2 {
                tracing::warn!(elapsed_ms = elapsed.as_millis() as u64, "Slow poll cycle");
            }

            let pause = match outcome {
                CycleOutcome::Published(_) => self.config.interval(),
                CycleOutcome::Unavailable => self.config.backoff(),
            };
            thread::park_timeout(pause);
        }

        tracing::info!("Poller thread stopped");
    }
}

struct Control {
    running: AtomicBool,
    shutdown: AtomicBool,
}

/// Control surface for the poller thread.
pub struct PollerHandle {
    control: Arc<Control>,
    thread: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Armed-Idle -> Running.
    pub fn start(&self) {
        if !self.control.running.swap(true, Ordering::SeqCst) {
            tracing::info!("Polling started");
            self.wake();
        }
    }

    /// Running -> Armed-Idle. The thread keeps running.
    pub fn stop(&self) {
        if self.control.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Polling stopped");
            self.wake();
        }
    }

    pub fn state(&self) -> PollerState {
        if self.control.running.load(Ordering::SeqCst) {
            PollerState::Running
        } else {
            PollerState::ArmedIdle
        }
    }

    /// End the thread and wait for it. Only for process teardown.
    pub fn shutdown(&mut self) {
        self.control.running.store(false, Ordering::SeqCst);
        self.control.shutdown.store(true, Ordering::SeqCst);
        self.wake();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Poller thread panicked");
            }
        }
    }

    fn wake(&self) {
        if let Some(thread) = &self.thread {
            thread.thread().unpark();
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
