//! A load-generation harness for S3-compatible object storage.
//!
//! A run executes a fixed number of operations of a single kind (upload or
//! download) with a fixed payload size, partitioned round-robin across a
//! configurable number of concurrent workers, and reports aggregate timing.
//!
//! The execution engine in [`runner`] only depends on the
//! [`ObjectStore`](client::ObjectStore) put/get primitives, so it can be
//! driven against any S3-compatible endpoint (or a test double).
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod client;
pub mod config;
pub mod payload;
pub mod report;
pub mod runner;

pub use crate::config::{ClientConfig, Operation, RunConfig};
pub use crate::report::RunReport;
pub use crate::runner::run;
