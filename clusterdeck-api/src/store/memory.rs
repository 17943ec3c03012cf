use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::clusters::{Cluster, ClusterFilter, NewCluster};
use crate::db::workloads::{NewWorkload, Workload, WorkloadFilter, WorkloadKey};
use crate::store::{ClusterPage, CredentialStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    last_cluster_id: i64,
    clusters: BTreeMap<i64, Cluster>,
    last_workload_id: i64,
    workloads: BTreeMap<i64, Workload>,
}

impl Inner {
    fn workload_id(&self, key: &WorkloadKey) -> Option<i64> {
        self.workloads
            .iter()
            .find(|(_, workload)| &workload.key == key)
            .map(|(id, _)| *id)
    }
}

/// A [`CredentialStore`] that keeps records in process memory.
///
/// Ids are assigned from 1 in insertion order, listings are ordered by id,
/// like the Postgres implementation.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn create_cluster(&self, cluster: &NewCluster) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.last_cluster_id += 1;
        let id = inner.last_cluster_id;

        let now = Utc::now();
        inner.clusters.insert(
            id,
            Cluster {
                id,
                name: cluster.name.clone(),
                cn_name: cluster.cn_name.clone(),
                cluster_type: cluster.cluster_type.clone(),
                api_server: cluster.api_server.clone(),
                kube_config: cluster.kube_config.clone(),
                enabled: cluster.enabled,
                version: cluster.version.clone(),
                region: cluster.region.clone(),
                zones: cluster.zones.clone(),
                subnets: cluster.subnets.clone(),
                network: cluster.network.clone(),
                created_at: now,
                updated_at: now,
            },
        );

        Ok(id)
    }

    async fn read_cluster(&self, cluster_id: i64) -> Result<Option<Cluster>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.clusters.get(&cluster_id).cloned())
    }

    async fn update_cluster(
        &self,
        cluster_id: i64,
        cluster: &NewCluster,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(stored) = inner.clusters.get_mut(&cluster_id) else {
            return Ok(false);
        };

        stored.name = cluster.name.clone();
        stored.cn_name = cluster.cn_name.clone();
        stored.cluster_type = cluster.cluster_type.clone();
        stored.api_server = cluster.api_server.clone();
        stored.kube_config = cluster.kube_config.clone();
        stored.enabled = cluster.enabled;
        stored.version = cluster.version.clone();
        stored.region = cluster.region.clone();
        stored.zones = cluster.zones.clone();
        stored.subnets = cluster.subnets.clone();
        stored.network = cluster.network.clone();
        stored.updated_at = Utc::now();

        Ok(true)
    }

    async fn delete_cluster(&self, cluster_id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.clusters.remove(&cluster_id).is_some())
    }

    async fn list_clusters(&self, filter: &ClusterFilter) -> Result<ClusterPage, StoreError> {
        let inner = self.inner.lock().await;
        let matching: Vec<&Cluster> = inner
            .clusters
            .values()
            .filter(|cluster| filter.matches(cluster))
            .collect();

        let total = matching.len() as i64;
        let clusters = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect();

        Ok(ClusterPage { clusters, total })
    }

    async fn create_workload(&self, workload: &NewWorkload) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.workload_id(&workload.key).is_some() {
            return Err(StoreError::DuplicateWorkload(workload.key.clone()));
        }

        inner.last_workload_id += 1;
        let id = inner.last_workload_id;

        let now = Utc::now();
        inner.workloads.insert(
            id,
            Workload {
                id,
                key: workload.key.clone(),
                replicas: workload.replicas,
                containers: workload.containers.clone(),
                labels: workload.labels.clone(),
                annotations: workload.annotations.clone(),
                status: workload.status.clone(),
                created_at: now,
                updated_at: now,
            },
        );

        Ok(id)
    }

    async fn read_workload(&self, key: &WorkloadKey) -> Result<Option<Workload>, StoreError> {
        let inner = self.inner.lock().await;
        let workload = inner
            .workload_id(key)
            .and_then(|id| inner.workloads.get(&id))
            .cloned();

        Ok(workload)
    }

    async fn update_workload(&self, workload: &NewWorkload) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(id) = inner.workload_id(&workload.key) else {
            return Ok(false);
        };
        let Some(stored) = inner.workloads.get_mut(&id) else {
            return Ok(false);
        };

        stored.replicas = workload.replicas;
        stored.containers = workload.containers.clone();
        stored.labels = workload.labels.clone();
        stored.annotations = workload.annotations.clone();
        stored.status = workload.status.clone();
        stored.updated_at = Utc::now();

        Ok(true)
    }

    async fn delete_workload(&self, key: &WorkloadKey) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let removed = match inner.workload_id(key) {
            Some(id) => inner.workloads.remove(&id).is_some(),
            None => false,
        };

        Ok(removed)
    }

    async fn list_workloads(
        &self,
        cluster_id: i64,
        filter: &WorkloadFilter,
    ) -> Result<Vec<Workload>, StoreError> {
        let inner = self.inner.lock().await;
        let workloads = inner
            .workloads
            .values()
            .filter(|workload| workload.key.cluster_id == cluster_id && filter.matches(&workload.key))
            .cloned()
            .collect();

        Ok(workloads)
    }
}
