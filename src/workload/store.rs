//! Aggregate store
//!
//! One logical workload collection over every bound kind. Single-record
//! calls are routed by the kind token of the composite id, List and Watch
//! fan out to every kind, and Create picks a kind from the payload and
//! applies defaults first.

use super::collection::{QueryOptions, RecordStream, RequestContext};
use super::defaults;
use super::fanout::{self, DisconnectPolicy};
use super::id::split_type_and_id;
use super::kind::WorkloadKind;
use super::record::Record;
use super::registry::{BindingTable, Schema};
use crate::credentials::{self, CredentialCatalog, EmptyCatalog};
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::Instrument;

/// Storage context the aggregate belongs to
pub const USER_STORAGE_CONTEXT: &str = "user";

/// Workload store fronting one collection per kind
pub struct AggregateStore {
    table: BindingTable,
    catalog: Arc<dyn CredentialCatalog>,
    disconnect_policy: DisconnectPolicy,
}

impl AggregateStore {
    /// Create a store with no registry credentials
    pub fn new(table: BindingTable) -> Self {
        Self {
            table,
            catalog: Arc::new(EmptyCatalog),
            disconnect_policy: DisconnectPolicy::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CredentialCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_disconnect_policy(mut self, policy: DisconnectPolicy) -> Self {
        self.disconnect_policy = policy;
        self
    }

    pub fn context(&self) -> &'static str {
        USER_STORAGE_CONTEXT
    }

    pub fn table(&self) -> &BindingTable {
        &self.table
    }

    /// Resolve a composite id to its schema and local id
    pub fn resolve<'a>(&self, id: &'a str) -> Result<(&Schema, &'a str)> {
        let (kind, local_id) = split_type_and_id(id);
        let schema = self
            .table
            .get(kind)
            .ok_or_else(|| Error::NotFound(kind.to_lowercase()))?;
        Ok((schema, local_id))
    }

    pub async fn by_id(&self, ctx: &RequestContext, id: &str) -> Result<Record> {
        let (schema, local_id) = self.resolve(id)?;
        schema
            .store
            .by_id(ctx, schema.kind, local_id)
            .instrument(ctx.span().clone())
            .await
    }

    pub async fn update(&self, ctx: &RequestContext, data: Record, id: &str) -> Result<Record> {
        let (schema, local_id) = self.resolve(id)?;
        schema
            .store
            .update(ctx, schema.kind, data, local_id)
            .instrument(ctx.span().clone())
            .await
    }

    pub async fn delete(&self, ctx: &RequestContext, id: &str) -> Result<Record> {
        let (schema, local_id) = self.resolve(id)?;
        schema
            .store
            .delete(ctx, schema.kind, local_id)
            .instrument(ctx.span().clone())
            .await
    }

    /// Merged listing of every kind
    pub async fn list(&self, ctx: &RequestContext, opts: &QueryOptions) -> Result<Vec<Record>> {
        fanout::list_all(&self.table, ctx, opts).await
    }

    /// Merged change stream of every kind.
    ///
    /// The stream ending means the watch is over; callers re-subscribe to
    /// start again.
    pub async fn watch(&self, ctx: &RequestContext, opts: &QueryOptions) -> Result<RecordStream> {
        Ok(fanout::watch_all(
            &self.table,
            ctx,
            opts,
            self.disconnect_policy,
        ))
    }

    /// Create a workload.
    ///
    /// Steps run in order: kind inference, selector, kind defaults, pull
    /// secrets, then the kind's own Create.
    pub async fn create(&self, ctx: &RequestContext, data: Record) -> Result<Record> {
        self.create_in_span(ctx, data)
            .instrument(ctx.span().clone())
            .await
    }

    async fn create_in_span(&self, ctx: &RequestContext, mut data: Record) -> Result<Record> {
        let kind = defaults::infer_kind(&self.table, &data)?;
        let schema = self.schema(kind)?;

        defaults::set_selector(kind, &mut data);
        defaults::set_workload_specific_defaults(kind, &mut data);
        credentials::set_pull_secrets(self.catalog.as_ref(), ctx, &mut data).await;

        tracing::debug!(kind = %kind, "creating workload");
        schema.store.create(ctx, kind, data).await
    }

    fn schema(&self, kind: WorkloadKind) -> Result<&Schema> {
        self.table
            .schema(kind)
            .ok_or_else(|| Error::NotFound(kind.key().to_string()))
    }
}
