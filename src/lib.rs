//! Aggregated workload store
//!
//! Fronts several independently stored workload kinds with one CRUD and
//! watch surface. See [`workload`] for the aggregation layer and
//! [`credentials`] for the registry credential handling applied on Create.

pub mod config;
pub mod credentials;
pub mod error;
pub mod memory;
pub mod workload;

pub use error::{Error, Result};
pub use workload::{AggregateStore, Record, RequestContext, WorkloadKind};
