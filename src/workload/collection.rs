//! Backing collection contract
//!
//! Every workload kind is stored by its own collection. The aggregate only
//! talks to collections through [`Collection`], passing a [`RequestContext`]
//! that carries cancellation, the calling project and the tracing span.

use super::kind::WorkloadKind;
use super::record::{value_to_string, Record};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

/// Live change stream of a collection
pub type RecordStream = BoxStream<'static, Record>;

/// Per-request state handed to every collection call
#[derive(Debug, Clone)]
pub struct RequestContext {
    cancel: CancellationToken,
    project_id: Option<String>,
    span: tracing::Span,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            project_id: None,
            span: tracing::info_span!("workload_request"),
        }
    }

    /// Scope credential lookups to a project
    pub fn with_project(mut self, project_id: &str) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }

    /// Bind the request to an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Derived context whose cancellation also fires when the parent's does
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            project_id: self.project_id.clone(),
            span: self.span.clone(),
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Equality filter on a record field (dot-notation path)
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceFilter {
    pub field: String,
    pub values: Vec<String>,
}

impl ResourceFilter {
    pub fn new(field: &str, values: Vec<String>) -> Self {
        Self {
            field: field.to_string(),
            values,
        }
    }

    /// Parse `field=value[,value...]`
    pub fn parse(expr: &str) -> Option<Self> {
        let (field, values) = expr.split_once('=')?;
        if field.is_empty() {
            return None;
        }
        Some(Self::new(
            field,
            values.split(',').map(|v| v.to_string()).collect(),
        ))
    }

    pub fn matches(&self, record: &Record) -> bool {
        record
            .lookup(&self.field)
            .map(value_to_string)
            .is_some_and(|value| self.values.contains(&value))
    }
}

/// Query options forwarded untouched to every collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub filters: Vec<ResourceFilter>,
}

impl QueryOptions {
    pub fn with_filter(mut self, filter: ResourceFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// True when every filter matches
    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }
}

/// Storage for one workload kind
#[async_trait]
pub trait Collection: Send + Sync {
    /// Fetch one record by its local id
    async fn by_id(&self, ctx: &RequestContext, kind: WorkloadKind, id: &str) -> Result<Record>;

    async fn list(
        &self,
        ctx: &RequestContext,
        kind: WorkloadKind,
        opts: &QueryOptions,
    ) -> Result<Vec<Record>>;

    /// Subscribe to changes. `Ok(None)` means there is nothing to watch.
    /// Streams should end once the context is cancelled.
    async fn watch(
        &self,
        ctx: &RequestContext,
        kind: WorkloadKind,
        opts: &QueryOptions,
    ) -> Result<Option<RecordStream>>;

    async fn create(&self, ctx: &RequestContext, kind: WorkloadKind, data: Record)
        -> Result<Record>;

    async fn update(
        &self,
        ctx: &RequestContext,
        kind: WorkloadKind,
        data: Record,
        id: &str,
    ) -> Result<Record>;

    async fn delete(&self, ctx: &RequestContext, kind: WorkloadKind, id: &str) -> Result<Record>;
}
