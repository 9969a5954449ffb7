//! Boundary to the search cluster.
//!
//! [`ClusterGateway`] is everything the lifecycle orchestrator needs from
//! the cluster. [`crate::elasticsearch::EsClient`] implements it over HTTP.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::mapping::MappingNode;

/// Primary shard count of every created index.
pub const SHARD_COUNT: u32 = 3;

/// Shard and replica counts applied to newly created indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexPolicy {
    pub shards: u32,
    pub replicas: u32,
}

impl IndexPolicy {
    /// One replica fewer than the number of data nodes.
    pub fn from_health(health: &ClusterHealth) -> Self {
        Self {
            shards: SHARD_COUNT,
            replicas: health.number_of_data_nodes.saturating_sub(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClusterHealth {
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub number_of_nodes: u32,
    pub number_of_data_nodes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasActionKind {
    Add,
    Remove,
    /// Delete the listed indices as part of the alias update
    RemoveIndex,
}

/// One action of an alias update. All actions of one update call are applied
/// atomically by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasAction {
    pub kind: AliasActionKind,
    pub indices: Vec<String>,
    pub alias: String,
}

impl AliasAction {
    pub fn add(index: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            kind: AliasActionKind::Add,
            indices: vec![index.into()],
            alias: alias.into(),
        }
    }

    pub fn remove(indices: Vec<String>, alias: impl Into<String>) -> Self {
        Self {
            kind: AliasActionKind::Remove,
            indices,
            alias: alias.into(),
        }
    }

    pub fn remove_index(indices: Vec<String>) -> Self {
        Self {
            kind: AliasActionKind::RemoveIndex,
            indices,
            alias: String::new(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self.kind {
            AliasActionKind::Add => json!({
                "add": { "indices": self.indices, "alias": self.alias }
            }),
            AliasActionKind::Remove => json!({
                "remove": { "indices": self.indices, "alias": self.alias }
            }),
            AliasActionKind::RemoveIndex => json!({
                "remove_index": { "indices": self.indices }
            }),
        }
    }
}

/// Counters reported by a completed reindex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReindexSummary {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub updated: u64,
}

/// Live mappings of every concrete index behind an alias or index name.
pub type LiveMappings = BTreeMap<String, MappingNode>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{operation} {target}: transport error: {source}")]
    Transport {
        operation: &'static str,
        target: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{operation} {target}: rejected with status {status}: {body}")]
    Rejected {
        operation: &'static str,
        target: String,
        status: u16,
        body: String,
    },

    #[error("{operation} {target}: not acknowledged")]
    NotAcknowledged {
        operation: &'static str,
        target: String,
    },

    #[error("{operation} {target}: no result within {timeout:?}")]
    TimedOut {
        operation: &'static str,
        target: String,
        timeout: Duration,
    },

    #[error("{operation} {target}: unexpected response: {detail}")]
    Malformed {
        operation: &'static str,
        target: String,
        detail: String,
    },
}

impl GatewayError {
    pub fn operation(&self) -> &'static str {
        match self {
            GatewayError::Transport { operation, .. }
            | GatewayError::Rejected { operation, .. }
            | GatewayError::NotAcknowledged { operation, .. }
            | GatewayError::TimedOut { operation, .. }
            | GatewayError::Malformed { operation, .. } => operation,
        }
    }
}

/// Cluster operations used to reconcile indices.
///
/// Every call reads or writes live cluster state; implementations must not
/// cache. An unacknowledged write is reported as
/// [`GatewayError::NotAcknowledged`].
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    async fn alias_exists(&self, alias: &str) -> Result<bool, GatewayError>;

    async fn index_exists(&self, index: &str) -> Result<bool, GatewayError>;

    async fn create_index(
        &self,
        index: &str,
        mapping: &MappingNode,
        policy: IndexPolicy,
    ) -> Result<(), GatewayError>;

    async fn delete_index(&self, index: &str) -> Result<(), GatewayError>;

    /// Clone `source` into a new index `target`. The source must be frozen.
    async fn clone_index(
        &self,
        source: &str,
        target: &str,
        timeout: Duration,
    ) -> Result<(), GatewayError>;

    /// Block writes on an index.
    async fn freeze_index(&self, index: &str, timeout: Duration) -> Result<(), GatewayError>;

    async fn unfreeze_index(&self, index: &str, timeout: Duration) -> Result<(), GatewayError>;

    async fn get_mapping(&self, alias: &str) -> Result<LiveMappings, GatewayError>;

    /// Add fields to the mapping of every index behind `alias`. Existing
    /// fields cannot change kind; the cluster rejects such updates.
    async fn put_mapping_additive(
        &self,
        alias: &str,
        mapping: &MappingNode,
    ) -> Result<(), GatewayError>;

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), GatewayError>;

    async fn get_indices_for_alias(&self, alias: &str) -> Result<Vec<String>, GatewayError>;

    /// Copy all documents of `source` into `dest`, blocking until done.
    async fn reindex(
        &self,
        source: &str,
        dest: &str,
        script: Option<&str>,
        timeout: Duration,
    ) -> Result<ReindexSummary, GatewayError>;

    async fn cluster_health(&self) -> Result<ClusterHealth, GatewayError>;
}
