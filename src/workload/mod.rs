//! Workload aggregation layer
//!
//! This module exposes several independently stored workload kinds
//! (deployments, daemon sets, jobs, ...) as one logical collection.
//! Records are addressed by composite ids of the form `<kind>:<local-id>`,
//! so callers never need to know which collection holds a record.
//!
//! # Architecture
//!
//! - [`kind`] - The closed set of workload kinds
//! - [`id`] - Composite id encoding and decoding
//! - [`record`] - The document type exchanged with collections
//! - [`collection`] - Contract implemented by each backing collection
//! - [`registry`] - Binding table from kind token to collection
//! - [`fanout`] - Concurrent List/Watch over every collection
//! - [`defaults`] - Create-time kind inference and field defaults
//! - [`store`] - The [`AggregateStore`] tying it all together
//!
//! # Example
//!
//! ```ignore
//! use workload_aggregate::workload::{AggregateStore, BindingTable, QueryOptions, RequestContext};
//!
//! async fn list_all(store: &AggregateStore) -> workload_aggregate::Result<usize> {
//!     let items = store.list(&RequestContext::new(), &QueryOptions::default()).await?;
//!     Ok(items.len())
//! }
//! ```

pub mod collection;
pub mod defaults;
pub mod fanout;
pub mod id;
pub mod kind;
pub mod record;
pub mod registry;
mod store;

pub use collection::{Collection, QueryOptions, RecordStream, RequestContext, ResourceFilter};
pub use defaults::SELECTOR_LABEL;
pub use fanout::DisconnectPolicy;
pub use id::{join_type_and_id, split_type_and_id};
pub use kind::WorkloadKind;
pub use record::Record;
pub use registry::{BindingTable, Schema};
pub use store::{AggregateStore, USER_STORAGE_CONTEXT};
