use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::{Event, Node, Pod, Service, Taint};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::configs::cluster::ClusterNetwork;
use crate::db::clusters::{Cluster, ClusterFilter, NewCluster};
use crate::k8s::quantity::parse_quantity;
use crate::k8s::registry::{ConnectionRegistry, RegistryError, decode_credential};
use crate::k8s::{ConnectionHandle, K8sError, PodPhase};
use crate::services::{ConnectClusterError, connect_cluster};
use crate::store::{CredentialStore, StoreError};
use clusterdeck_config::SerializableSecretString;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Error)]
pub enum ClusterServiceError {
    /// The request is malformed. The message is returned to the caller.
    #[error("{0}")]
    Validation(String),

    /// No cluster record has this id.
    #[error("The cluster with id {0} was not found")]
    ClusterNotFound(i64),

    /// The credential store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The cluster connection could not be initialized or resolved.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The cluster's API server returned an error.
    #[error("The cluster API request failed: {0}")]
    Upstream(#[from] K8sError),
}

impl From<ConnectClusterError> for ClusterServiceError {
    fn from(err: ConnectClusterError) -> Self {
        match err {
            ConnectClusterError::ClusterNotFound(id) => ClusterServiceError::ClusterNotFound(id),
            ConnectClusterError::Store(err) => ClusterServiceError::Store(err),
            ConnectClusterError::Registry(err) => ClusterServiceError::Registry(err),
        }
    }
}

/// Changes applied by [`ClusterService::update_cluster`]. A missing
/// credential keeps the stored one.
#[derive(Debug, Clone)]
pub struct ClusterUpdate {
    pub name: String,
    pub cn_name: String,
    pub cluster_type: String,
    pub api_server: String,
    pub kube_config: Option<SerializableSecretString>,
    pub enabled: bool,
    pub version: String,
    pub region: String,
    pub zones: Vec<String>,
    pub subnets: Vec<String>,
    pub network: ClusterNetwork,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClusterQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub cluster_type: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClusterListing {
    pub clusters: Vec<Cluster>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub used: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCounts {
    pub ready: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodCounts {
    pub running: i64,
    pub total: i64,
}

/// Aggregated capacity of a cluster.
///
/// `cpu` is in millicores and `memory` in bytes. `total` sums the nodes'
/// capacity and `used` their allocatable amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetrics {
    pub cpu: ResourceUsage,
    pub memory: ResourceUsage,
    pub nodes: NodeCounts,
    pub pods: PodCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvolvedObject {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEvent {
    #[serde(rename = "type")]
    pub type_: String,
    pub reason: String,
    pub message: String,
    pub last_timestamp: String,
    pub involved_object: InvolvedObject,
}

impl From<Event> for ClusterEvent {
    fn from(event: Event) -> Self {
        let last_timestamp = event
            .last_timestamp
            .map(|time| time.0)
            .or(event.event_time.map(|time| time.0))
            .map(format_timestamp)
            .unwrap_or_default();

        ClusterEvent {
            type_: event.type_.unwrap_or_default(),
            reason: event.reason.unwrap_or_default(),
            message: event.message.unwrap_or_default(),
            last_timestamp,
            involved_object: InvolvedObject {
                kind: event.involved_object.kind.unwrap_or_default(),
                name: event.involved_object.name.unwrap_or_default(),
            },
        }
    }
}

fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Cluster records and the live views of the clusters they point at.
pub struct ClusterService {
    store: Arc<dyn CredentialStore>,
    registry: Arc<ConnectionRegistry>,
}

impl ClusterService {
    pub fn new(store: Arc<dyn CredentialStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    pub async fn create_cluster(&self, cluster: &NewCluster) -> Result<i64, ClusterServiceError> {
        validate_cluster(cluster)?;
        let cluster_id = self.store.create_cluster(cluster).await?;
        info!(cluster_id, name = %cluster.name, "cluster registered");

        Ok(cluster_id)
    }

    pub async fn read_cluster(&self, cluster_id: i64) -> Result<Cluster, ClusterServiceError> {
        self.store
            .read_cluster(cluster_id)
            .await?
            .ok_or(ClusterServiceError::ClusterNotFound(cluster_id))
    }

    pub async fn list_clusters(
        &self,
        query: ClusterQuery,
    ) -> Result<ClusterListing, ClusterServiceError> {
        let page = query.page.unwrap_or(1);
        let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 {
            return Err(ClusterServiceError::Validation(
                "page must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ClusterServiceError::Validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let offset = (page - 1)
            .checked_mul(page_size)
            .ok_or_else(|| ClusterServiceError::Validation("page is out of range".to_string()))?;

        let filter = ClusterFilter {
            cluster_type: query.cluster_type,
            region: query.region,
            limit: page_size,
            offset,
        };
        let result = self.store.list_clusters(&filter).await?;

        Ok(ClusterListing {
            clusters: result.clusters,
            total: result.total,
            page,
            page_size,
        })
    }

    /// Updates a cluster record. The live connection is evicted when the
    /// credential or the API endpoint changes.
    pub async fn update_cluster(
        &self,
        cluster_id: i64,
        update: ClusterUpdate,
    ) -> Result<Cluster, ClusterServiceError> {
        let current = self.read_cluster(cluster_id).await?;

        let kube_config = update.kube_config.unwrap_or(current.kube_config.clone());
        let cluster = NewCluster {
            name: update.name,
            cn_name: update.cn_name,
            cluster_type: update.cluster_type,
            api_server: update.api_server,
            kube_config,
            enabled: update.enabled,
            version: update.version,
            region: update.region,
            zones: update.zones,
            subnets: update.subnets,
            network: update.network,
        };
        validate_cluster(&cluster)?;

        let connection_changed = cluster.api_server != current.api_server
            || cluster.kube_config.expose_secret() != current.kube_config.expose_secret();

        if !self.store.update_cluster(cluster_id, &cluster).await? {
            return Err(ClusterServiceError::ClusterNotFound(cluster_id));
        }
        if connection_changed {
            self.registry.evict(cluster_id);
        }

        self.read_cluster(cluster_id).await
    }

    pub async fn delete_cluster(&self, cluster_id: i64) -> Result<(), ClusterServiceError> {
        if !self.store.delete_cluster(cluster_id).await? {
            return Err(ClusterServiceError::ClusterNotFound(cluster_id));
        }
        self.registry.evict(cluster_id);
        info!(cluster_id, "cluster deleted");

        Ok(())
    }

    /// Reports whether the cluster can be reached. Connection failures are
    /// reported as a status, not as an error.
    pub async fn get_status(&self, cluster_id: i64) -> Result<ClusterStatus, ClusterServiceError> {
        let client = match connect_cluster(self.store.as_ref(), &self.registry, cluster_id).await {
            Ok(client) => client,
            Err(ConnectClusterError::Registry(err)) => {
                warn!(cluster_id, error = %err, "cluster connection cannot be initialized");
                return Ok(ClusterStatus::Error);
            }
            Err(err) => return Err(err.into()),
        };

        match client.list_nodes().await {
            Ok(_) => Ok(ClusterStatus::Connected),
            Err(err) => {
                warn!(cluster_id, error = %err, "cluster is unreachable");
                Ok(ClusterStatus::Disconnected)
            }
        }
    }

    pub async fn get_metrics(&self, cluster_id: i64) -> Result<ClusterMetrics, ClusterServiceError> {
        let client = self.connect(cluster_id).await?;
        let nodes = client.list_nodes().await?;
        let pods = client.list_pods(None).await?;

        Ok(summarize(&nodes, &pods))
    }

    pub async fn get_events(&self, cluster_id: i64) -> Result<Vec<ClusterEvent>, ClusterServiceError> {
        let client = self.connect(cluster_id).await?;
        let events = client.list_events().await?;

        Ok(events.into_iter().map(ClusterEvent::from).collect())
    }

    pub async fn list_nodes(&self, cluster_id: i64) -> Result<Vec<Node>, ClusterServiceError> {
        let client = self.connect(cluster_id).await?;
        Ok(client.list_nodes().await?)
    }

    pub async fn list_pods(
        &self,
        cluster_id: i64,
        namespace: Option<&str>,
    ) -> Result<Vec<Pod>, ClusterServiceError> {
        let client = self.connect(cluster_id).await?;
        Ok(client.list_pods(namespace).await?)
    }

    pub async fn list_services(
        &self,
        cluster_id: i64,
        namespace: Option<&str>,
    ) -> Result<Vec<Service>, ClusterServiceError> {
        let client = self.connect(cluster_id).await?;
        Ok(client.list_services(namespace).await?)
    }

    /// Replaces every label of a node.
    pub async fn replace_node_labels(
        &self,
        cluster_id: i64,
        node_name: &str,
        labels: BTreeMap<String, String>,
    ) -> Result<Node, ClusterServiceError> {
        self.edit_node(cluster_id, node_name, |node| {
            node.metadata.labels = Some(labels);
        })
        .await
    }

    pub async fn delete_node_label(
        &self,
        cluster_id: i64,
        node_name: &str,
        key: &str,
    ) -> Result<Node, ClusterServiceError> {
        self.edit_node(cluster_id, node_name, |node| {
            if let Some(labels) = node.metadata.labels.as_mut() {
                labels.remove(key);
            }
        })
        .await
    }

    /// Replaces every taint of a node.
    pub async fn replace_node_taints(
        &self,
        cluster_id: i64,
        node_name: &str,
        taints: Vec<Taint>,
    ) -> Result<Node, ClusterServiceError> {
        self.edit_node(cluster_id, node_name, |node| {
            node.spec.get_or_insert_with(Default::default).taints = Some(taints);
        })
        .await
    }

    /// Removes the taints with the given key.
    pub async fn delete_node_taint(
        &self,
        cluster_id: i64,
        node_name: &str,
        key: &str,
    ) -> Result<Node, ClusterServiceError> {
        self.edit_node(cluster_id, node_name, |node| {
            if let Some(taints) = node.spec.as_mut().and_then(|spec| spec.taints.as_mut()) {
                taints.retain(|taint| taint.key != key);
            }
        })
        .await
    }

    /// Reads a node, applies `edit` and writes the whole node back. The
    /// write does not check the resource version, the last writer wins.
    async fn edit_node<F>(
        &self,
        cluster_id: i64,
        node_name: &str,
        edit: F,
    ) -> Result<Node, ClusterServiceError>
    where
        F: FnOnce(&mut Node),
    {
        let client = self.connect(cluster_id).await?;
        let mut node = client.get_node(node_name).await?;
        edit(&mut node);
        node.metadata.resource_version = None;

        Ok(client.replace_node(&node).await?)
    }

    async fn connect(&self, cluster_id: i64) -> Result<ConnectionHandle, ClusterServiceError> {
        Ok(connect_cluster(self.store.as_ref(), &self.registry, cluster_id).await?)
    }
}

fn validate_cluster(cluster: &NewCluster) -> Result<(), ClusterServiceError> {
    if cluster.name.trim().is_empty() {
        return Err(ClusterServiceError::Validation(
            "name must not be empty".to_string(),
        ));
    }
    if cluster.api_server.trim().is_empty() {
        return Err(ClusterServiceError::Validation(
            "api_server must not be empty".to_string(),
        ));
    }
    if cluster.kube_config.is_blank() {
        return Err(ClusterServiceError::Validation(
            "kube_config must not be empty".to_string(),
        ));
    }
    decode_credential(cluster.kube_config.expose_secret())?;

    Ok(())
}

/// Aggregates node capacity, node readiness and pod phases.
///
/// Quantities that cannot be parsed are logged and left out of the sums.
pub fn summarize(nodes: &[Node], pods: &[Pod]) -> ClusterMetrics {
    let mut metrics = ClusterMetrics::default();

    for node in nodes {
        let node_name = node.metadata.name.as_deref().unwrap_or_default();
        let Some(status) = node.status.as_ref() else {
            metrics.nodes.total += 1;
            continue;
        };

        if let Some(capacity) = status.capacity.as_ref() {
            let cpu = resource_amount(node_name, capacity.get("cpu"), true);
            let memory = resource_amount(node_name, capacity.get("memory"), false);
            metrics.cpu.total = metrics.cpu.total.saturating_add(cpu);
            metrics.memory.total = metrics.memory.total.saturating_add(memory);
        }
        if let Some(allocatable) = status.allocatable.as_ref() {
            let cpu = resource_amount(node_name, allocatable.get("cpu"), true);
            let memory = resource_amount(node_name, allocatable.get("memory"), false);
            metrics.cpu.used = metrics.cpu.used.saturating_add(cpu);
            metrics.memory.used = metrics.memory.used.saturating_add(memory);
        }

        let ready = status.conditions.as_ref().is_some_and(|conditions| {
            conditions
                .iter()
                .any(|condition| condition.type_ == "Ready" && condition.status == "True")
        });
        metrics.nodes.total += 1;
        if ready {
            metrics.nodes.ready += 1;
        }
    }

    for pod in pods {
        metrics.pods.total += 1;
        if PodPhase::from(pod) == PodPhase::Running {
            metrics.pods.running += 1;
        }
    }

    metrics
}

fn resource_amount(
    node_name: &str,
    quantity: Option<&k8s_openapi::apimachinery::pkg::api::resource::Quantity>,
    milli: bool,
) -> i64 {
    let Some(quantity) = quantity else {
        return 0;
    };

    let amount = parse_quantity(&quantity.0).ok().and_then(|parsed| {
        if milli {
            parsed.milli_value()
        } else {
            parsed.value()
        }
    });

    match amount {
        Some(amount) => amount,
        None => {
            warn!(node = node_name, quantity = %quantity.0, "skipping unreadable node quantity");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(name: &str, cpu: (&str, &str), memory: (&str, &str), ready: &str) -> Node {
        serde_json::from_value(json!({
            "metadata": { "name": name },
            "status": {
                "capacity": { "cpu": cpu.0, "memory": memory.0 },
                "allocatable": { "cpu": cpu.1, "memory": memory.1 },
                "conditions": [{ "type": "Ready", "status": ready }]
            }
        }))
        .unwrap()
    }

    fn pod(name: &str, phase: &str) -> Pod {
        serde_json::from_value(json!({
            "metadata": { "name": name },
            "status": { "phase": phase }
        }))
        .unwrap()
    }

    #[test]
    fn summarize_sums_capacity_and_counts() {
        let nodes = vec![
            node("a", ("2", "1000m"), ("4Gi", "3Gi"), "True"),
            node("b", ("2000m", "1"), ("4Gi", "3Gi"), "True"),
        ];
        let pods = vec![
            pod("x", "Running"),
            pod("y", "Running"),
            pod("z", "Pending"),
        ];

        let metrics = summarize(&nodes, &pods);

        assert_eq!(metrics.cpu, ResourceUsage { used: 2000, total: 4000 });
        assert_eq!(
            metrics.memory,
            ResourceUsage {
                used: 6 * 1024 * 1024 * 1024,
                total: 8 * 1024 * 1024 * 1024
            }
        );
        assert_eq!(metrics.nodes, NodeCounts { ready: 2, total: 2 });
        assert_eq!(metrics.pods, PodCounts { running: 2, total: 3 });
    }

    #[test]
    fn summarize_skips_unreadable_quantities_and_counts_unready_nodes() {
        let nodes = vec![
            node("a", ("lots", "1"), ("1Ki", "1Ki"), "False"),
            serde_json::from_value(json!({ "metadata": { "name": "bare" } })).unwrap(),
        ];

        let metrics = summarize(&nodes, &[]);

        assert_eq!(metrics.cpu, ResourceUsage { used: 1000, total: 0 });
        assert_eq!(metrics.memory, ResourceUsage { used: 1024, total: 1024 });
        assert_eq!(metrics.nodes, NodeCounts { ready: 0, total: 2 });
        assert_eq!(metrics.pods, PodCounts::default());
    }

    #[test]
    fn summarize_saturates_instead_of_overflowing() {
        let nodes = vec![
            node("a", ("4P", "4P"), ("4Ei", "4Ei"), "True"),
            node("b", ("4P", "4P"), ("4Ei", "4Ei"), "True"),
            node("c", ("4P", "4P"), ("4Ei", "4Ei"), "True"),
        ];

        let metrics = summarize(&nodes, &[]);

        assert_eq!(metrics.cpu.total, i64::MAX);
        assert_eq!(metrics.memory.used, i64::MAX);
        assert_eq!(metrics.nodes, NodeCounts { ready: 3, total: 3 });
    }

    #[test]
    fn events_are_projected_with_rfc3339_timestamps() {
        let event: Event = serde_json::from_value(json!({
            "metadata": { "name": "web.1", "namespace": "default" },
            "type": "Warning",
            "reason": "BackOff",
            "message": "Back-off restarting failed container",
            "lastTimestamp": "2024-05-01T10:00:00Z",
            "involvedObject": { "kind": "Pod", "name": "web-0" }
        }))
        .unwrap();

        let projected = ClusterEvent::from(event);

        assert_eq!(
            serde_json::to_value(&projected).unwrap(),
            json!({
                "type": "Warning",
                "reason": "BackOff",
                "message": "Back-off restarting failed container",
                "lastTimestamp": "2024-05-01T10:00:00Z",
                "involvedObject": { "kind": "Pod", "name": "web-0" }
            })
        );
    }

    #[test]
    fn events_without_timestamps_have_an_empty_timestamp() {
        let event: Event = serde_json::from_value(json!({
            "metadata": { "name": "web.2" },
            "involvedObject": {}
        }))
        .unwrap();

        let projected = ClusterEvent::from(event);

        assert_eq!(projected.last_timestamp, "");
        assert_eq!(projected.involved_object, InvolvedObject::default());
    }
}
