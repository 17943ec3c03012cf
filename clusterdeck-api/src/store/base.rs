use async_trait::async_trait;
use thiserror::Error;

use crate::db::clusters::{Cluster, ClusterFilter, ClustersDbError, NewCluster};
use crate::db::workloads::{NewWorkload, Workload, WorkloadFilter, WorkloadKey, WorkloadsDbError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Clusters(#[from] ClustersDbError),

    #[error(transparent)]
    Workloads(#[from] WorkloadsDbError),

    #[error("The workload {0} already exists")]
    DuplicateWorkload(WorkloadKey),
}

/// One window of a filtered cluster listing.
#[derive(Debug, Clone)]
pub struct ClusterPage {
    pub clusters: Vec<Cluster>,
    /// Number of clusters matching the filter, ignoring the window.
    pub total: i64,
}

/// CRUD access to cluster records and the local workload mirror.
///
/// Update and delete operations return `false` when the record does not
/// exist.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create_cluster(&self, cluster: &NewCluster) -> Result<i64, StoreError>;

    async fn read_cluster(&self, cluster_id: i64) -> Result<Option<Cluster>, StoreError>;

    async fn update_cluster(&self, cluster_id: i64, cluster: &NewCluster)
    -> Result<bool, StoreError>;

    async fn delete_cluster(&self, cluster_id: i64) -> Result<bool, StoreError>;

    async fn list_clusters(&self, filter: &ClusterFilter) -> Result<ClusterPage, StoreError>;

    /// Fails with [`StoreError::DuplicateWorkload`] when a workload with the
    /// same key is already stored.
    async fn create_workload(&self, workload: &NewWorkload) -> Result<i64, StoreError>;

    async fn read_workload(&self, key: &WorkloadKey) -> Result<Option<Workload>, StoreError>;

    async fn update_workload(&self, workload: &NewWorkload) -> Result<bool, StoreError>;

    async fn delete_workload(&self, key: &WorkloadKey) -> Result<bool, StoreError>;

    async fn list_workloads(
        &self,
        cluster_id: i64,
        filter: &WorkloadFilter,
    ) -> Result<Vec<Workload>, StoreError>;
}
