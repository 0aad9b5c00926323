//! Operator REST surface: health and metrics only. A CRD CRUD surface and
//! authentication middleware belong to a different system and are not
//! implemented by this operator.

mod handlers;
mod server;

pub use server::run_server;
