use async_trait::async_trait;
use sqlx::PgPool;

use crate::db;
use crate::db::clusters::{Cluster, ClusterFilter, NewCluster};
use crate::db::utils::is_unique_violation;
use crate::db::workloads::{NewWorkload, Workload, WorkloadFilter, WorkloadKey, WorkloadsDbError};
use crate::store::{ClusterPage, CredentialStore, StoreError};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PostgresStore {
    async fn create_cluster(&self, cluster: &NewCluster) -> Result<i64, StoreError> {
        Ok(db::clusters::create_cluster(&self.pool, cluster).await?)
    }

    async fn read_cluster(&self, cluster_id: i64) -> Result<Option<Cluster>, StoreError> {
        Ok(db::clusters::read_cluster(&self.pool, cluster_id).await?)
    }

    async fn update_cluster(
        &self,
        cluster_id: i64,
        cluster: &NewCluster,
    ) -> Result<bool, StoreError> {
        let id = db::clusters::update_cluster(&self.pool, cluster_id, cluster).await?;
        Ok(id.is_some())
    }

    async fn delete_cluster(&self, cluster_id: i64) -> Result<bool, StoreError> {
        let id = db::clusters::delete_cluster(&self.pool, cluster_id).await?;
        Ok(id.is_some())
    }

    async fn list_clusters(&self, filter: &ClusterFilter) -> Result<ClusterPage, StoreError> {
        let mut txn = self.pool.begin().await.map_err(db::clusters::ClustersDbError::from)?;
        let total = db::clusters::count_clusters(&mut *txn, filter).await?;
        let clusters = db::clusters::read_clusters(&mut *txn, filter).await?;
        txn.commit().await.map_err(db::clusters::ClustersDbError::from)?;

        Ok(ClusterPage { clusters, total })
    }

    async fn create_workload(&self, workload: &NewWorkload) -> Result<i64, StoreError> {
        match db::workloads::create_workload(&self.pool, workload).await {
            Ok(id) => Ok(id),
            Err(WorkloadsDbError::Database(err)) if is_unique_violation(&err) => {
                Err(StoreError::DuplicateWorkload(workload.key.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn read_workload(&self, key: &WorkloadKey) -> Result<Option<Workload>, StoreError> {
        Ok(db::workloads::read_workload(&self.pool, key).await?)
    }

    async fn update_workload(&self, workload: &NewWorkload) -> Result<bool, StoreError> {
        let id = db::workloads::update_workload(&self.pool, workload).await?;
        Ok(id.is_some())
    }

    async fn delete_workload(&self, key: &WorkloadKey) -> Result<bool, StoreError> {
        let id = db::workloads::delete_workload(&self.pool, key).await?;
        Ok(id.is_some())
    }

    async fn list_workloads(
        &self,
        cluster_id: i64,
        filter: &WorkloadFilter,
    ) -> Result<Vec<Workload>, StoreError> {
        Ok(db::workloads::read_cluster_workloads(&self.pool, cluster_id, filter).await?)
    }
}
