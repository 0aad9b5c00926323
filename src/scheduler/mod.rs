//! Scheduler sidecar: translates JSON records a crawler writes to two
//! named pipes into rate-limited Pipeline/Search creations.
//!
//! Runs as a second container in a Search's crawler Pod (see
//! `crate::search::resources::build_pod`). `fifo` owns pipe creation and
//! the read-reopen loop, `dispatcher` owns the one-record-at-a-time
//! creation logic per pipe, and `sidecar` wires both together and watches
//! for the completion sentinel.

pub mod dispatcher;
pub mod fifo;
pub mod sidecar;

pub use sidecar::run;
