use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Node, Pod, Service};
use kube::config::{Kubeconfig, KubeconfigError};
use std::sync::Arc;
use thiserror::Error;

use crate::configs::workload::WorkloadKind;
use crate::k8s::manifest::WorkloadObject;

/// Errors returned by a managed cluster's API server, or while shaping the
/// objects exchanged with it.
#[derive(Debug, Error)]
pub enum K8sError {
    /// An object could not be converted to or from its JSON form.
    #[error("An error occurred in serde when dealing with K8s: {0}")]
    Serde(#[from] serde_json::error::Error),

    /// The API server rejected the request or could not be reached.
    #[error("An error occurred with kube when dealing with K8s: {0}")]
    Kube(#[from] kube::Error),
}

impl K8sError {
    /// Returns true when the API server answered 404 for the addressed object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, K8sError::Kube(kube::Error::Api(response)) if response.code == 404)
    }
}

/// Phase reported in a pod's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<&str> for PodPhase {
    fn from(value: &str) -> Self {
        match value {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

impl From<&Pod> for PodPhase {
    fn from(pod: &Pod) -> Self {
        pod.status
            .as_ref()
            .and_then(|status| status.phase.as_deref())
            .map(PodPhase::from)
            .unwrap_or(PodPhase::Unknown)
    }
}

/// The slice of a cluster's API used by the services.
///
/// Every call is attempted exactly once. Failures are returned to the
/// caller, nothing is retried.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Lists every node of the cluster.
    async fn list_nodes(&self) -> Result<Vec<Node>, K8sError>;

    /// Reads one node by name.
    async fn get_node(&self, name: &str) -> Result<Node, K8sError>;

    /// Writes `node` back unconditionally. Concurrent edits of the same node
    /// overwrite each other.
    async fn replace_node(&self, node: &Node) -> Result<Node, K8sError>;

    /// Lists pods of `namespace`, or of every namespace when `None`.
    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>, K8sError>;

    /// Lists services of `namespace`, or of every namespace when `None`.
    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>, K8sError>;

    /// Lists events of every namespace.
    async fn list_events(&self) -> Result<Vec<Event>, K8sError>;

    /// Creates `object` in the namespace named by its metadata.
    async fn create_workload(&self, object: &WorkloadObject) -> Result<WorkloadObject, K8sError>;

    /// Replaces the live object of the same kind, namespace and name.
    async fn replace_workload(&self, object: &WorkloadObject) -> Result<WorkloadObject, K8sError>;

    /// Reads the live workload of `kind` named `name` in `namespace`.
    async fn get_workload(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadObject, K8sError>;

    /// Deletes the workload. Its pods are removed by the cluster.
    async fn delete_workload(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), K8sError>;
}

/// A ready to use client bound to one cluster's credential.
pub type ConnectionHandle = Arc<dyn ClusterClient>;

/// Errors raised while building a client from a kubeconfig.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The kubeconfig does not describe a usable context.
    #[error("the kubeconfig cannot be turned into a client configuration: {0}")]
    Configuration(#[from] KubeconfigError),

    /// The HTTP client for the context could not be created.
    #[error("the cluster client cannot be built: {0}")]
    ClientConstruction(#[from] kube::Error),
}

/// Builds a [`ConnectionHandle`] from a parsed kubeconfig.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self, kubeconfig: Kubeconfig) -> Result<ConnectionHandle, ConnectError>;
}
