//! Ocular: a Kubernetes operator that orchestrates security scans of
//! static software assets.
//!
//! A Pipeline is a one-shot download → scan → extract → upload execution.
//! A Search is a long-running crawler that discovers Targets and
//! dispatches Pipelines (and nested Searches) for them via a scheduler
//! sidecar. See the `pipeline` and `search` modules for the two engines,
//! `crd` for the custom resources they operate on, and `validation` for
//! the resource-model checks shared by both.

pub mod config;
pub mod controller;
pub mod crd;
pub mod cron_search;
pub mod error;
pub mod extractor;
pub mod gateway;
pub mod pipeline;
pub mod scheduler;
pub mod search;
pub mod telemetry;
pub mod validation;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
