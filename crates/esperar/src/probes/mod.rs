//! Concrete probes for the three surfaces a suite watches: HTTP APIs,
//! a read replica, and a rendered UI.
//!
//! Each probe is a thin sampler over a narrow transport trait, so tests
//! drive them with in-memory fakes and production wires in real clients.

pub mod api;
pub mod db;
pub mod ui;
