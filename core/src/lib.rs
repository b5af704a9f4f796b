//! Request-serving node scheduler, sizer and autoscaler core.
//!
//! `logic` holds every pure decision function; `controllers` wires those
//! decisions onto a live `kube::Client`. See `controllers` module docs for
//! why the split matters.

pub mod backoff;
pub mod cache;
pub mod config;
pub mod controllers;
pub mod error;
pub mod logic;
pub mod metrics;
