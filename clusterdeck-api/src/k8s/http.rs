use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Event, Node, Pod, Service};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

use crate::config::KubeClientConfig;
use crate::configs::workload::WorkloadKind;
use crate::k8s::manifest::WorkloadObject;
use crate::k8s::{ClusterClient, ClusterConnector, ConnectError, ConnectionHandle, K8sError};

/// Builds [`KubeClusterClient`]s from kubeconfig documents.
#[derive(Debug, Clone)]
pub struct KubeConnector {
    config: KubeClientConfig,
}

impl KubeConnector {
    pub fn new(config: KubeClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, kubeconfig: Kubeconfig) -> Result<ConnectionHandle, ConnectError> {
        let mut config =
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        config.connect_timeout = Some(self.config.connect_timeout());
        config.read_timeout = Some(self.config.read_timeout());

        debug!(cluster_url = %config.cluster_url, "building cluster client");
        let client = Client::try_from(config)?;

        Ok(Arc::new(KubeClusterClient::new(client)))
    }
}

/// [`ClusterClient`] talking to an API server through [`kube`].
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced_or_all<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    async fn create<K>(&self, object: &K, namespace: &str) -> Result<K, K8sError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&PostParams::default(), object).await?)
    }

    async fn replace<K>(&self, object: &K, namespace: &str, name: &str) -> Result<K, K8sError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.replace(name, &PostParams::default(), object).await?)
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<K, K8sError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn delete<K>(&self, namespace: &str, name: &str) -> Result<(), K8sError>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_nodes(&self) -> Result<Vec<Node>, K8sError> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_node(&self, name: &str) -> Result<Node, K8sError> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn replace_node(&self, node: &Node) -> Result<Node, K8sError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let name = node.metadata.name.as_deref().unwrap_or_default();
        Ok(api.replace(name, &PostParams::default(), node).await?)
    }

    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>, K8sError> {
        let api: Api<Pod> = self.namespaced_or_all(namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>, K8sError> {
        let api: Api<Service> = self.namespaced_or_all(namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_events(&self) -> Result<Vec<Event>, K8sError> {
        let api: Api<Event> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn create_workload(&self, object: &WorkloadObject) -> Result<WorkloadObject, K8sError> {
        let namespace = object.namespace();
        let created = match object {
            WorkloadObject::Deployment(deployment) => {
                WorkloadObject::Deployment(self.create(deployment, namespace).await?)
            }
            WorkloadObject::StatefulSet(stateful_set) => {
                WorkloadObject::StatefulSet(self.create(stateful_set, namespace).await?)
            }
            WorkloadObject::DaemonSet(daemon_set) => {
                WorkloadObject::DaemonSet(self.create(daemon_set, namespace).await?)
            }
        };

        Ok(created)
    }

    async fn replace_workload(&self, object: &WorkloadObject) -> Result<WorkloadObject, K8sError> {
        let namespace = object.namespace();
        let name = object.name();
        let replaced = match object {
            WorkloadObject::Deployment(deployment) => {
                WorkloadObject::Deployment(self.replace(deployment, namespace, name).await?)
            }
            WorkloadObject::StatefulSet(stateful_set) => {
                WorkloadObject::StatefulSet(self.replace(stateful_set, namespace, name).await?)
            }
            WorkloadObject::DaemonSet(daemon_set) => {
                WorkloadObject::DaemonSet(self.replace(daemon_set, namespace, name).await?)
            }
        };

        Ok(replaced)
    }

    async fn get_workload(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadObject, K8sError> {
        let object = match kind {
            WorkloadKind::Deployment => {
                WorkloadObject::Deployment(self.get::<Deployment>(namespace, name).await?)
            }
            WorkloadKind::StatefulSet => {
                WorkloadObject::StatefulSet(self.get::<StatefulSet>(namespace, name).await?)
            }
            WorkloadKind::DaemonSet => {
                WorkloadObject::DaemonSet(self.get::<DaemonSet>(namespace, name).await?)
            }
        };

        Ok(object)
    }

    async fn delete_workload(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), K8sError> {
        match kind {
            WorkloadKind::Deployment => self.delete::<Deployment>(namespace, name).await,
            WorkloadKind::StatefulSet => self.delete::<StatefulSet>(namespace, name).await,
            WorkloadKind::DaemonSet => self.delete::<DaemonSet>(namespace, name).await,
        }
    }
}
