//! Workload kinds
//!
//! The closed set of workload flavors the aggregate can front. Each kind has
//! a schema id as shown to callers, a lowercase binding key and a
//! create-time hint field (`<schemaId>Config`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A workload kind backed by its own collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkloadKind {
    Deployment,
    ReplicaSet,
    ReplicationController,
    DaemonSet,
    StatefulSet,
    Job,
    CronJob,
}

impl WorkloadKind {
    /// Every kind, in declaration order
    pub const ALL: [WorkloadKind; 7] = [
        WorkloadKind::Deployment,
        WorkloadKind::ReplicaSet,
        WorkloadKind::ReplicationController,
        WorkloadKind::DaemonSet,
        WorkloadKind::StatefulSet,
        WorkloadKind::Job,
        WorkloadKind::CronJob,
    ];

    /// Kind used by Create when the payload carries no hint field
    pub const PRIMARY: WorkloadKind = WorkloadKind::Deployment;

    /// Schema id as exposed to callers
    pub fn schema_id(&self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::ReplicaSet => "replicaSet",
            Self::ReplicationController => "replicationController",
            Self::DaemonSet => "daemonSet",
            Self::StatefulSet => "statefulSet",
            Self::Job => "job",
            Self::CronJob => "cronJob",
        }
    }

    /// Lowercase binding key; this is the kind token in composite ids
    pub fn key(&self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::ReplicaSet => "replicaset",
            Self::ReplicationController => "replicationcontroller",
            Self::DaemonSet => "daemonset",
            Self::StatefulSet => "statefulset",
            Self::Job => "job",
            Self::CronJob => "cronjob",
        }
    }

    /// Payload field whose presence selects this kind on Create
    pub fn config_field(&self) -> String {
        format!("{}Config", self.schema_id())
    }

    /// Batch kinds never get a synthesized selector and restart on failure
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Job | Self::CronJob)
    }

    /// Case-insensitive lookup of a kind token
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.to_lowercase();
        Self::ALL.into_iter().find(|kind| kind.key() == token)
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema_id())
    }
}
