//! Binding table - kind token to backing collection
//!
//! Built once when the aggregate is constructed and read-only afterwards.
//! Also indexes the create-time hint fields (`<schemaId>Config`) of every
//! bound kind.

use super::collection::Collection;
use super::kind::WorkloadKind;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A bound kind and the collection that stores it
#[derive(Clone)]
pub struct Schema {
    pub kind: WorkloadKind,
    pub store: Arc<dyn Collection>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema").field("kind", &self.kind).finish_non_exhaustive()
    }
}

/// Lowercase kind key -> schema, plus hint field -> kind
#[derive(Debug)]
pub struct BindingTable {
    schemas: BTreeMap<&'static str, Schema>,
    field_to_kind: BTreeMap<String, WorkloadKind>,
}

impl BindingTable {
    /// Build the table.
    ///
    /// Fails if a kind is bound twice or the primary kind is missing, since
    /// Create falls back to the primary kind.
    pub fn new<I>(bindings: I) -> Result<Self>
    where
        I: IntoIterator<Item = (WorkloadKind, Arc<dyn Collection>)>,
    {
        let mut schemas = BTreeMap::new();
        let mut field_to_kind = BTreeMap::new();

        for (kind, store) in bindings {
            if schemas.insert(kind.key(), Schema { kind, store }).is_some() {
                return Err(Error::Config(format!("kind {} bound twice", kind)));
            }
            field_to_kind.insert(kind.config_field(), kind);
        }

        if !schemas.contains_key(WorkloadKind::PRIMARY.key()) {
            return Err(Error::Config(format!(
                "primary kind {} is not bound",
                WorkloadKind::PRIMARY
            )));
        }

        tracing::debug!(kinds = schemas.len(), "built workload binding table");

        Ok(Self {
            schemas,
            field_to_kind,
        })
    }

    /// Look up a kind token, case-insensitively
    pub fn get(&self, token: &str) -> Option<&Schema> {
        self.schemas.get(token.to_lowercase().as_str())
    }

    pub fn schema(&self, kind: WorkloadKind) -> Option<&Schema> {
        self.schemas.get(kind.key())
    }

    /// All bound schemas
    pub fn schemas(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.values()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Kind selected by a create-time hint field, if that kind is bound
    pub fn kind_for_field(&self, field: &str) -> Option<WorkloadKind> {
        self.field_to_kind.get(field).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCollection;

    fn store() -> Arc<dyn Collection> {
        Arc::new(MemoryCollection::new())
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = BindingTable::new([
            (WorkloadKind::Deployment, store()),
            (WorkloadKind::CronJob, store()),
        ])
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("CronJob").unwrap().kind, WorkloadKind::CronJob);
        assert_eq!(table.get("cronjob").unwrap().kind, WorkloadKind::CronJob);
        assert!(table.get("job").is_none());
        assert!(table.get("").is_none());
    }

    #[test]
    fn test_hint_fields_follow_bound_kinds() {
        let table = BindingTable::new([
            (WorkloadKind::Deployment, store()),
            (WorkloadKind::CronJob, store()),
        ])
        .unwrap();

        assert_eq!(table.kind_for_field("cronJobConfig"), Some(WorkloadKind::CronJob));
        assert_eq!(table.kind_for_field("jobConfig"), None);
        assert_eq!(table.kind_for_field("deploymentConfig"), Some(WorkloadKind::Deployment));
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let err = BindingTable::new([
            (WorkloadKind::Deployment, store()),
            (WorkloadKind::Deployment, store()),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_primary_rejected() {
        let err = BindingTable::new([(WorkloadKind::Job, store())]).unwrap_err();
        assert!(err.to_string().contains("deployment"));
    }
}
