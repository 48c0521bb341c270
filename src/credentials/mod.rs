//! Registry credentials
//!
//! Create attaches pull secrets to a workload by matching the registry
//! domain of each container image against the credentials the project
//! knows about.
//!
//! # Module Structure
//!
//! - [`image`] - Registry domain resolution for image references
//!
//! The credential catalog itself is external; it is consumed through
//! [`CredentialCatalog`]. A [`PullSecretIndex`] is built fresh for every
//! Create call and never cached.

pub mod image;

use crate::workload::{Record, RequestContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Payload field holding pull secret references
pub const IMAGE_PULL_SECRETS_FIELD: &str = "imagePullSecrets";

/// A stored registry credential: its name and the registry domains it
/// authenticates against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryCredential {
    pub name: String,
    /// Owning project; `None` for credentials shared by every project
    #[serde(default, rename = "projectId", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Registry domain -> opaque credential marker
    #[serde(default)]
    pub registries: BTreeMap<String, Value>,
}

impl RegistryCredential {
    pub fn new(name: &str, domains: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            project_id: None,
            registries: domains
                .iter()
                .map(|domain| (domain.to_string(), Value::Object(Default::default())))
                .collect(),
        }
    }

    /// Restrict the credential to one project
    pub fn in_project(mut self, project_id: &str) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }

    /// Whether a request scoped to `project_id` may use this credential
    pub fn visible_to(&self, project_id: Option<&str>) -> bool {
        match &self.project_id {
            None => true,
            Some(owner) => project_id == Some(owner.as_str()),
        }
    }
}

/// Reference to a pull secret, serialized as `{"name": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretReference {
    pub name: String,
}

/// Read-only source of registry credentials
#[async_trait]
pub trait CredentialCatalog: Send + Sync {
    /// Credentials scoped to a namespace
    async fn namespaced_credentials(&self, ctx: &RequestContext)
        -> anyhow::Result<Vec<RegistryCredential>>;

    /// Project-wide credentials
    async fn credentials(&self, ctx: &RequestContext) -> anyhow::Result<Vec<RegistryCredential>>;
}

/// Catalog with no credentials
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCatalog;

#[async_trait]
impl CredentialCatalog for EmptyCatalog {
    async fn namespaced_credentials(
        &self,
        _ctx: &RequestContext,
    ) -> anyhow::Result<Vec<RegistryCredential>> {
        Ok(Vec::new())
    }

    async fn credentials(&self, _ctx: &RequestContext) -> anyhow::Result<Vec<RegistryCredential>> {
        Ok(Vec::new())
    }
}

/// Registry domain -> secrets that authenticate against it
#[derive(Debug, Default)]
pub struct PullSecretIndex {
    domains: HashMap<String, Vec<SecretReference>>,
}

impl PullSecretIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from both catalog queries.
    ///
    /// Namespaced credentials go in first, global ones are appended. A
    /// failing query contributes nothing.
    pub async fn load(catalog: &dyn CredentialCatalog, ctx: &RequestContext) -> Self {
        let mut index = Self::new();

        match catalog.namespaced_credentials(ctx).await {
            Ok(creds) => creds.iter().for_each(|cred| index.store(cred)),
            Err(e) => tracing::warn!(error = %e, "failed to list namespaced registry credentials"),
        }

        match catalog.credentials(ctx).await {
            Ok(creds) => creds.iter().for_each(|cred| index.store(cred)),
            Err(e) => tracing::warn!(error = %e, "failed to list registry credentials"),
        }

        index
    }

    /// Add `cred` under every domain it covers
    pub fn store(&mut self, cred: &RegistryCredential) {
        for domain in cred.registries.keys() {
            self.domains
                .entry(domain.clone())
                .or_default()
                .push(SecretReference {
                    name: cred.name.clone(),
                });
        }
    }

    pub fn get(&self, domain: &str) -> &[SecretReference] {
        self.domains.get(domain).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// Attach pull secrets matching the payload's container images.
///
/// Skipped when the payload already has `imagePullSecrets` or no containers.
/// Secrets are appended per container in order, without deduplication; the
/// field is only written when at least one secret matched.
pub async fn set_pull_secrets(
    catalog: &dyn CredentialCatalog,
    ctx: &RequestContext,
    data: &mut Record,
) {
    if data.is_set(IMAGE_PULL_SECRETS_FIELD) {
        return;
    }

    let containers = data.get_records("containers");
    if containers.is_empty() {
        return;
    }

    let index = PullSecretIndex::load(catalog, ctx).await;
    let mut secrets: Vec<SecretReference> = Vec::new();

    for container in &containers {
        let image = container.get_string("image");
        if image.is_empty() {
            continue;
        }
        let domain = image::registry_domain(&image);
        secrets.extend_from_slice(index.get(&domain));
    }

    if secrets.is_empty() {
        return;
    }

    tracing::debug!(count = secrets.len(), "attaching image pull secrets");
    match serde_json::to_value(&secrets) {
        Ok(value) => {
            data.insert(IMAGE_PULL_SECRETS_FIELD, value);
        },
        Err(e) => tracing::warn!(error = %e, "failed to encode image pull secrets"),
    }
}
