//! simdata-server: HTTP export of simulator telemetry.
//!
//! The binary wires a [`simdata_feeder::Poller`] to a shared
//! [`simdata_core::ReadingStore`] and serves it through [`web`].

pub mod logging;
pub mod net;
pub mod web;
