use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::configs::workload::WorkloadKind;
use crate::db::workloads::{NewWorkload, Workload, WorkloadFilter, WorkloadKey};
use crate::k8s::manifest::{ManifestError, build_workload_object};
use crate::k8s::registry::{ConnectionRegistry, RegistryError};
use crate::k8s::{ConnectionHandle, K8sError};
use crate::services::{ConnectClusterError, connect_cluster};
use crate::store::{CredentialStore, StoreError};

#[derive(Debug, Error)]
pub enum WorkloadServiceError {
    /// The request is malformed. The message is returned to the caller.
    #[error("{0}")]
    Validation(String),

    /// The operation does not apply to the workload kind, e.g. scaling a
    /// DaemonSet.
    #[error("{0}")]
    UnsupportedOperation(String),

    /// No cluster record has this id.
    #[error("The cluster with id {0} was not found")]
    ClusterNotFound(i64),

    /// No stored workload matches the key.
    #[error("The workload {0} was not found")]
    WorkloadNotFound(WorkloadKey),

    /// A workload with the same key is already stored.
    #[error("The workload {0} already exists")]
    DuplicateWorkload(WorkloadKey),

    /// The workload could not be turned into a Kubernetes object.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

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

impl From<ConnectClusterError> for WorkloadServiceError {
    fn from(err: ConnectClusterError) -> Self {
        match err {
            ConnectClusterError::ClusterNotFound(id) => WorkloadServiceError::ClusterNotFound(id),
            ConnectClusterError::Store(err) => WorkloadServiceError::Store(err),
            ConnectClusterError::Registry(err) => WorkloadServiceError::Registry(err),
        }
    }
}

/// Workloads on managed clusters and their local mirror.
///
/// Remote and local writes are not transactional. When the remote call
/// succeeds and the local write fails, the error is returned and the
/// remote object is left in place.
pub struct WorkloadService {
    store: Arc<dyn CredentialStore>,
    registry: Arc<ConnectionRegistry>,
}

impl WorkloadService {
    pub fn new(store: Arc<dyn CredentialStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Creates the workload on its cluster, then stores it.
    pub async fn create_workload(
        &self,
        mut workload: NewWorkload,
    ) -> Result<Workload, WorkloadServiceError> {
        validate_workload(&workload)?;
        if self.store.read_workload(&workload.key).await?.is_some() {
            return Err(WorkloadServiceError::DuplicateWorkload(workload.key));
        }

        let object = build_workload_object(&workload)?;
        let client = self.connect(workload.key.cluster_id).await?;
        let created = client.create_workload(&object).await?;
        info!(workload = %workload.key, "workload created on cluster");

        workload.status = created.status();
        self.store.create_workload(&workload).await?;

        self.read_stored(&workload.key).await
    }

    /// Replaces the workload on its cluster, then updates the stored copy.
    pub async fn update_workload(
        &self,
        mut workload: NewWorkload,
    ) -> Result<Workload, WorkloadServiceError> {
        validate_workload(&workload)?;
        self.read_stored(&workload.key).await?;

        let object = build_workload_object(&workload)?;
        let client = self.connect(workload.key.cluster_id).await?;
        let replaced = client.replace_workload(&object).await?;
        info!(workload = %workload.key, "workload updated on cluster");

        workload.status = replaced.status();
        if !self.store.update_workload(&workload).await? {
            return Err(WorkloadServiceError::WorkloadNotFound(workload.key));
        }

        self.read_stored(&workload.key).await
    }

    /// Deletes the workload from its cluster and from the store.
    ///
    /// Afterwards the connection of the whole cluster is evicted, so the
    /// next request for any workload of that cluster reconnects.
    pub async fn delete_workload(&self, key: &WorkloadKey) -> Result<(), WorkloadServiceError> {
        let client = self.connect(key.cluster_id).await?;
        match client
            .delete_workload(key.kind, &key.namespace, &key.name)
            .await
        {
            Ok(()) => info!(workload = %key, "workload deleted from cluster"),
            Err(err) if err.is_not_found() => {
                warn!(workload = %key, "workload was already absent from cluster");
            }
            Err(err) => return Err(err.into()),
        }

        if !self.store.delete_workload(key).await? {
            warn!(workload = %key, "deleted workload had no stored record");
        }

        self.registry.evict(key.cluster_id);

        Ok(())
    }

    /// Sets the replica count of a Deployment or StatefulSet.
    pub async fn scale_workload(
        &self,
        key: &WorkloadKey,
        replicas: i32,
    ) -> Result<(), WorkloadServiceError> {
        if !key.kind.supports_replicas() {
            return Err(WorkloadServiceError::UnsupportedOperation(format!(
                "{} workloads cannot be scaled",
                key.kind
            )));
        }
        if replicas < 0 {
            return Err(WorkloadServiceError::Validation(
                "replicas must not be negative".to_string(),
            ));
        }

        let client = self.connect(key.cluster_id).await?;
        let mut object = client
            .get_workload(key.kind, &key.namespace, &key.name)
            .await?;
        object.set_replicas(replicas)?;
        let scaled = client.replace_workload(&object).await?;
        info!(workload = %key, replicas, "workload scaled");

        match self.store.read_workload(key).await? {
            Some(stored) => {
                let workload = NewWorkload {
                    key: stored.key,
                    replicas,
                    containers: stored.containers,
                    labels: stored.labels,
                    annotations: stored.annotations,
                    status: scaled.status(),
                };
                self.store.update_workload(&workload).await?;
            }
            None => warn!(workload = %key, "scaled workload has no stored record"),
        }

        Ok(())
    }

    pub async fn list_workloads(
        &self,
        cluster_id: i64,
        filter: &WorkloadFilter,
    ) -> Result<Vec<Workload>, WorkloadServiceError> {
        if self.store.read_cluster(cluster_id).await?.is_none() {
            return Err(WorkloadServiceError::ClusterNotFound(cluster_id));
        }

        Ok(self.store.list_workloads(cluster_id, filter).await?)
    }

    /// Reads a stored workload. The status of Deployments is refreshed from
    /// the cluster and saved before returning.
    pub async fn read_workload(&self, key: &WorkloadKey) -> Result<Workload, WorkloadServiceError> {
        let stored = self.read_stored(key).await?;
        if stored.key.kind != WorkloadKind::Deployment {
            return Ok(stored);
        }

        let client = self.connect(key.cluster_id).await?;
        let live = client
            .get_workload(key.kind, &key.namespace, &key.name)
            .await?;

        let workload = NewWorkload {
            key: stored.key,
            replicas: stored.replicas,
            containers: stored.containers,
            labels: stored.labels,
            annotations: stored.annotations,
            status: live.status(),
        };
        self.store.update_workload(&workload).await?;

        self.read_stored(key).await
    }

    async fn read_stored(&self, key: &WorkloadKey) -> Result<Workload, WorkloadServiceError> {
        self.store
            .read_workload(key)
            .await?
            .ok_or_else(|| WorkloadServiceError::WorkloadNotFound(key.clone()))
    }

    async fn connect(&self, cluster_id: i64) -> Result<ConnectionHandle, WorkloadServiceError> {
        Ok(connect_cluster(self.store.as_ref(), &self.registry, cluster_id).await?)
    }
}

fn validate_workload(workload: &NewWorkload) -> Result<(), WorkloadServiceError> {
    let invalid = |message: &str| Err(WorkloadServiceError::Validation(message.to_string()));

    if workload.key.name.trim().is_empty() {
        return invalid("name must not be empty");
    }
    if workload.key.namespace.trim().is_empty() {
        return invalid("namespace must not be empty");
    }
    if workload.replicas < 0 {
        return invalid("replicas must not be negative");
    }
    if workload.containers.0.is_empty() {
        return invalid("at least one container is required");
    }
    for container in &workload.containers.0 {
        if container.name.trim().is_empty() {
            return invalid("every container needs a name");
        }
        if container.image.trim().is_empty() {
            return invalid("every container needs an image");
        }
    }

    Ok(())
}
