//! Search Engine: long-running crawler executions that dispatch child
//! Pipelines and Searches via the scheduler sidecar.

pub mod reconciler;
pub mod resources;
