//! Operations behind the HTTP routes.
//!
//! Both services read cluster records from the [`CredentialStore`] and go
//! through the [`ConnectionRegistry`] for anything that needs the live
//! cluster.

use secrecy::ExposeSecret;
use thiserror::Error;

use crate::k8s::ConnectionHandle;
use crate::k8s::registry::{ConnectionRegistry, RegistryError};
use crate::store::{CredentialStore, StoreError};

pub mod clusters;
pub mod workloads;

#[derive(Debug, Error)]
pub enum ConnectClusterError {
    #[error("The cluster with id {0} was not found")]
    ClusterNotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Connects to a stored cluster.
///
/// The connection is rebuilt from the stored credential on every call, then
/// resolved from the registry, so a credential changed since the last call
/// takes effect immediately.
pub async fn connect_cluster(
    store: &dyn CredentialStore,
    registry: &ConnectionRegistry,
    cluster_id: i64,
) -> Result<ConnectionHandle, ConnectClusterError> {
    let cluster = store
        .read_cluster(cluster_id)
        .await?
        .ok_or(ConnectClusterError::ClusterNotFound(cluster_id))?;

    registry
        .initialize(cluster_id, cluster.kube_config.expose_secret())
        .await?;

    Ok(registry.resolve(cluster_id)?)
}
