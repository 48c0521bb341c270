//! In-memory workload collections
//!
//! A [`Collection`] keeping records in a map and broadcasting every change
//! to watchers, a fixed [`CredentialCatalog`], and the YAML fixture format
//! the command line seeds them from.

use crate::credentials::{CredentialCatalog, RegistryCredential};
use crate::error::{Error, Result};
use crate::workload::{
    join_type_and_id, AggregateStore, BindingTable, Collection, DisconnectPolicy, QueryOptions,
    Record, RecordStream, RequestContext, WorkloadKind,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;

/// Buffered change events per collection before slow watchers lag
const EVENT_BUFFER: usize = 64;

/// Workload collection held in memory
pub struct MemoryCollection {
    records: RwLock<BTreeMap<String, Record>>,
    events: broadcast::Sender<Record>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            records: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    /// Collection pre-populated with `records` of `kind`
    pub fn from_records(kind: WorkloadKind, records: Vec<Record>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for mut record in records {
            let local_id = local_id(&record)?;
            stamp(kind, &local_id, &mut record);
            map.insert(local_id, record);
        }

        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Ok(Self {
            records: RwLock::new(map),
            events,
        })
    }

    fn publish(&self, record: &Record) {
        // No receivers is fine
        let _ = self.events.send(record.clone());
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

/// Local id of a payload: `<namespaceId>:<name>`, or `<name>` without a
/// namespace
fn local_id(data: &Record) -> Result<String> {
    let name = data.get_string("name");
    if name.is_empty() {
        return Err(anyhow::anyhow!("workload name is required").into());
    }

    let namespace = data.get_string("namespaceId");
    if namespace.is_empty() {
        Ok(name)
    } else {
        Ok(format!("{}:{}", namespace, name))
    }
}

/// Stamp the aggregate-facing identity onto a stored record
fn stamp(kind: WorkloadKind, local_id: &str, record: &mut Record) {
    record.insert("id", join_type_and_id(kind.key(), local_id));
    record.insert("type", kind.schema_id());
    if !record.is_set("uuid") {
        record.insert("uuid", uuid::Uuid::new_v4().to_string());
    }
    if !record.is_set("created") {
        record.insert("created", chrono::Utc::now().to_rfc3339());
    }
}

fn missing(kind: WorkloadKind, id: &str) -> Error {
    anyhow::anyhow!("{} {} not found", kind, id).into()
}

#[async_trait]
impl Collection for MemoryCollection {
    async fn by_id(&self, _ctx: &RequestContext, kind: WorkloadKind, id: &str) -> Result<Record> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| missing(kind, id))
    }

    async fn list(
        &self,
        _ctx: &RequestContext,
        _kind: WorkloadKind,
        opts: &QueryOptions,
    ) -> Result<Vec<Record>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|record| opts.matches(record))
            .cloned()
            .collect())
    }

    async fn watch(
        &self,
        ctx: &RequestContext,
        kind: WorkloadKind,
        opts: &QueryOptions,
    ) -> Result<Option<RecordStream>> {
        let rx = self.events.subscribe();
        let cancel = ctx.cancellation().clone();
        let opts = opts.clone();

        let stream = futures::stream::unfold((rx, cancel, opts), move |(mut rx, cancel, opts)| async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    received = rx.recv() => match received {
                        Ok(record) if opts.matches(&record) => {
                            return Some((record, (rx, cancel, opts)));
                        },
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(kind = %kind, skipped, "watcher lagged, events dropped");
                        },
                        Err(RecvError::Closed) => return None,
                    },
                }
            }
        });

        Ok(Some(stream.boxed()))
    }

    async fn create(&self, _ctx: &RequestContext, kind: WorkloadKind, mut data: Record) -> Result<Record> {
        let local_id = local_id(&data)?;
        let mut records = self.records.write().await;
        if records.contains_key(&local_id) {
            return Err(anyhow::anyhow!("{} {} already exists", kind, local_id).into());
        }

        stamp(kind, &local_id, &mut data);
        records.insert(local_id, data.clone());
        drop(records);

        self.publish(&data);
        Ok(data)
    }

    async fn update(
        &self,
        _ctx: &RequestContext,
        kind: WorkloadKind,
        data: Record,
        id: &str,
    ) -> Result<Record> {
        let mut records = self.records.write().await;
        let Some(existing) = records.get_mut(id) else {
            return Err(missing(kind, id));
        };

        existing.merge(data);
        stamp(kind, id, existing);
        let updated = existing.clone();
        drop(records);

        self.publish(&updated);
        Ok(updated)
    }

    async fn delete(&self, _ctx: &RequestContext, kind: WorkloadKind, id: &str) -> Result<Record> {
        let removed = self
            .records
            .write()
            .await
            .remove(id)
            .ok_or_else(|| missing(kind, id))?;

        let mut event = removed.clone();
        event.insert("state", "removed");
        self.publish(&event);
        Ok(removed)
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Credential catalog with fixed contents.
///
/// Credentials owned by a project are only returned for requests scoped to
/// that project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryCatalog {
    #[serde(default)]
    pub namespaced: Vec<RegistryCredential>,
    #[serde(default)]
    pub global: Vec<RegistryCredential>,
}

#[async_trait]
impl CredentialCatalog for MemoryCatalog {
    async fn namespaced_credentials(
        &self,
        ctx: &RequestContext,
    ) -> anyhow::Result<Vec<RegistryCredential>> {
        Ok(visible(&self.namespaced, ctx))
    }

    async fn credentials(&self, ctx: &RequestContext) -> anyhow::Result<Vec<RegistryCredential>> {
        Ok(visible(&self.global, ctx))
    }
}

fn visible(creds: &[RegistryCredential], ctx: &RequestContext) -> Vec<RegistryCredential> {
    creds
        .iter()
        .filter(|cred| cred.visible_to(ctx.project_id()))
        .cloned()
        .collect()
}

// =============================================================================
// Fixtures
// =============================================================================

/// Seed data: workloads per kind plus registry credentials
///
/// ```yaml
/// workloads:
///   deployment:
///     - { namespaceId: default, name: web, containers: [{ image: nginx }] }
///   cronJob:
///     - { namespaceId: default, name: nightly }
/// credentials:
///   global:
///     - { name: hub, registries: { index.docker.io: {} } }
///     - { name: team, projectId: p-1, registries: { quay.io: {} } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub workloads: BTreeMap<WorkloadKind, Vec<Record>>,
    #[serde(default)]
    pub credentials: MemoryCatalog,
}

impl Fixture {
    /// Parse YAML (or JSON) fixture text
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Bind every workload kind to an in-memory collection seeded from the
    /// fixture
    pub fn into_store(self, policy: DisconnectPolicy) -> Result<AggregateStore> {
        let mut workloads = self.workloads;
        let mut bindings: Vec<(WorkloadKind, Arc<dyn Collection>)> = Vec::new();

        for kind in WorkloadKind::ALL {
            let records = workloads.remove(&kind).unwrap_or_default();
            let store: Arc<dyn Collection> = Arc::new(MemoryCollection::from_records(kind, records)?);
            bindings.push((kind, store));
        }

        Ok(AggregateStore::new(BindingTable::new(bindings)?)
            .with_catalog(Arc::new(self.credentials))
            .with_disconnect_policy(policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_create_stamps_identity() {
        let store = MemoryCollection::new();
        let ctx = RequestContext::new();
        let created = store
            .create(&ctx, WorkloadKind::CronJob, record(json!({"namespaceId": "ns1", "name": "nightly"})))
            .await
            .unwrap();

        assert_eq!(created.get_str("id"), Some("cronjob:ns1:nightly"));
        assert_eq!(created.get_str("type"), Some("cronJob"));
        assert!(created.is_set("uuid"));
        assert!(created.is_set("created"));

        let fetched = store.by_id(&ctx, WorkloadKind::CronJob, "ns1:nightly").await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_requires_unique_name() {
        let store = MemoryCollection::new();
        let ctx = RequestContext::new();
        let data = record(json!({"name": "web"}));
        store.create(&ctx, WorkloadKind::Deployment, data.clone()).await.unwrap();
        assert!(store.create(&ctx, WorkloadKind::Deployment, data).await.is_err());
        assert!(store
            .create(&ctx, WorkloadKind::Deployment, record(json!({"scale": 1})))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_update_merges_and_delete_removes() {
        let store = MemoryCollection::new();
        let ctx = RequestContext::new();
        let kind = WorkloadKind::Deployment;
        store
            .create(&ctx, kind, record(json!({"namespaceId": "ns", "name": "web", "scale": 1})))
            .await
            .unwrap();

        let updated = store
            .update(&ctx, kind, record(json!({"scale": 3, "id": "bogus"})), "ns:web")
            .await
            .unwrap();
        assert_eq!(updated.get_string("scale"), "3");
        assert_eq!(updated.get_str("id"), Some("deployment:ns:web"));
        assert_eq!(updated.get_str("name"), Some("web"));

        store.delete(&ctx, kind, "ns:web").await.unwrap();
        assert!(store.by_id(&ctx, kind, "ns:web").await.is_err());
        assert!(store.delete(&ctx, kind, "ns:web").await.is_err());
        assert!(store.update(&ctx, kind, Record::new(), "ns:web").await.is_err());
    }

    #[tokio::test]
    async fn test_watch_relays_changes_until_cancelled() {
        let store = MemoryCollection::new();
        let ctx = RequestContext::new();
        let kind = WorkloadKind::Deployment;
        let mut events = store
            .watch(&ctx, kind, &QueryOptions::default())
            .await
            .unwrap()
            .unwrap();

        store.create(&ctx, kind, record(json!({"name": "web"}))).await.unwrap();
        store.delete(&ctx, kind, "web").await.unwrap();

        let created = events.next().await.unwrap();
        assert_eq!(created.get_str("name"), Some("web"));
        let removed = events.next().await.unwrap();
        assert_eq!(removed.get_str("state"), Some("removed"));

        ctx.cancellation().cancel();
        assert!(events.next().await.is_none());
    }

    #[test]
    fn test_fixture_parses_kinds_and_credentials() {
        let fixture = Fixture::from_yaml(
            r#"
workloads:
  deployment:
    - { namespaceId: default, name: web }
  cronJob:
    - { namespaceId: default, name: nightly }
credentials:
  global:
    - name: hub
      registries:
        index.docker.io: {}
"#,
        )
        .unwrap();

        assert_eq!(fixture.workloads[&WorkloadKind::Deployment].len(), 1);
        assert_eq!(fixture.workloads[&WorkloadKind::CronJob].len(), 1);
        assert_eq!(fixture.credentials.global[0].name, "hub");
        assert!(fixture.credentials.namespaced.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_scopes_credentials_by_project() {
        let fixture = Fixture::from_yaml(
            r#"
credentials:
  namespaced:
    - { name: team-a-hub, projectId: p-a, registries: { index.docker.io: {} } }
  global:
    - { name: shared, registries: { quay.io: {} } }
    - { name: team-b-private, projectId: p-b, registries: { myregistry.io: {} } }
"#,
        )
        .unwrap();
        let catalog = fixture.credentials;
        let names = |creds: Vec<RegistryCredential>| -> Vec<String> {
            creds.into_iter().map(|c| c.name).collect()
        };

        let ctx = RequestContext::new().with_project("p-a");
        assert_eq!(names(catalog.namespaced_credentials(&ctx).await.unwrap()), ["team-a-hub"]);
        assert_eq!(names(catalog.credentials(&ctx).await.unwrap()), ["shared"]);

        let ctx = RequestContext::new().with_project("p-b");
        assert!(catalog.namespaced_credentials(&ctx).await.unwrap().is_empty());
        assert_eq!(
            names(catalog.credentials(&ctx).await.unwrap()),
            ["shared", "team-b-private"]
        );

        let unscoped = RequestContext::new();
        assert!(catalog.namespaced_credentials(&unscoped).await.unwrap().is_empty());
        assert_eq!(names(catalog.credentials(&unscoped).await.unwrap()), ["shared"]);
    }

    #[test]
    fn test_fixture_rejects_unknown_kind() {
        let err = Fixture::from_yaml("workloads:\n  pod: []\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_fixture_store_lists_every_kind() {
        let fixture = Fixture::from_yaml(
            "workloads:\n  deployment:\n    - { name: a }\n  job:\n    - { name: b }\n",
        )
        .unwrap();
        let store = fixture.into_store(DisconnectPolicy::TearDown).unwrap();
        assert_eq!(store.table().len(), WorkloadKind::ALL.len());

        let items = store
            .list(&RequestContext::new(), &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }
}
