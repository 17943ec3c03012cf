use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clusterdeck_api::configs::workload::WorkloadKind;
use clusterdeck_api::k8s::manifest::WorkloadObject;
use clusterdeck_api::k8s::{
    ClusterClient, ClusterConnector, ConnectError, ConnectionHandle, K8sError,
};
use k8s_openapi::api::apps::v1::DeploymentStatus;
use k8s_openapi::api::core::v1::{Event, Node, Pod, Service};
use kube::config::Kubeconfig;
use kube::core::ErrorResponse;
use serde_json::json;

type WorkloadId = (WorkloadKind, String, String);

/// Objects held by a fake cluster.
#[derive(Default)]
pub struct ClusterState {
    pub nodes: Vec<Node>,
    pub pods: Vec<Pod>,
    pub services: Vec<Service>,
    pub events: Vec<Event>,
    pub workloads: HashMap<WorkloadId, WorkloadObject>,
    /// Makes every call fail as if the API server could not be reached.
    pub unreachable: bool,
}

/// A fake cluster shared between the test and the clients connected to it.
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MockCluster {
    pub fn update<F: FnOnce(&mut ClusterState)>(&self, f: F) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.state
            .lock()
            .unwrap()
            .nodes
            .iter()
            .find(|node| node.metadata.name.as_deref() == Some(name))
            .cloned()
    }

    pub fn workload(&self, kind: WorkloadKind, namespace: &str, name: &str) -> Option<WorkloadObject> {
        self.state
            .lock()
            .unwrap()
            .workloads
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }
}

fn api_error(code: u16, reason: &str) -> K8sError {
    K8sError::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("mock cluster answered {reason}"),
        reason: reason.to_string(),
        code,
    }))
}

fn workload_id(object: &WorkloadObject) -> WorkloadId {
    (
        object.kind(),
        object.namespace().to_string(),
        object.name().to_string(),
    )
}

/// Fills in the status of Deployments as if the rollout had completed.
fn rolled_out(mut object: WorkloadObject) -> WorkloadObject {
    if let WorkloadObject::Deployment(deployment) = &mut object {
        let replicas = deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1);
        deployment.status = Some(DeploymentStatus {
            replicas: Some(replicas),
            ready_replicas: Some(replicas),
            available_replicas: Some(replicas),
            updated_replicas: Some(replicas),
            ..Default::default()
        });
    }

    object
}

pub struct MockClusterClient {
    cluster: MockCluster,
}

impl MockClusterClient {
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut ClusterState) -> Result<T, K8sError>,
    ) -> Result<T, K8sError> {
        let mut state = self.cluster.state.lock().unwrap();
        if state.unreachable {
            return Err(api_error(503, "ServiceUnavailable"));
        }
        f(&mut state)
    }
}

fn in_namespace<T: kube::Resource + Clone>(objects: &[T], namespace: Option<&str>) -> Vec<T> {
    objects
        .iter()
        .filter(|object| namespace.is_none() || object.meta().namespace.as_deref() == namespace)
        .cloned()
        .collect()
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn list_nodes(&self) -> Result<Vec<Node>, K8sError> {
        self.with_state(|state| Ok(state.nodes.clone()))
    }

    async fn get_node(&self, name: &str) -> Result<Node, K8sError> {
        self.with_state(|state| {
            state
                .nodes
                .iter()
                .find(|node| node.metadata.name.as_deref() == Some(name))
                .cloned()
                .ok_or_else(|| api_error(404, "NotFound"))
        })
    }

    async fn replace_node(&self, node: &Node) -> Result<Node, K8sError> {
        self.with_state(|state| {
            let stored = state
                .nodes
                .iter_mut()
                .find(|stored| stored.metadata.name == node.metadata.name)
                .ok_or_else(|| api_error(404, "NotFound"))?;
            *stored = node.clone();
            Ok(node.clone())
        })
    }

    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>, K8sError> {
        self.with_state(|state| Ok(in_namespace(&state.pods, namespace)))
    }

    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>, K8sError> {
        self.with_state(|state| Ok(in_namespace(&state.services, namespace)))
    }

    async fn list_events(&self) -> Result<Vec<Event>, K8sError> {
        self.with_state(|state| Ok(state.events.clone()))
    }

    async fn create_workload(&self, object: &WorkloadObject) -> Result<WorkloadObject, K8sError> {
        self.with_state(|state| {
            let id = workload_id(object);
            if state.workloads.contains_key(&id) {
                return Err(api_error(409, "AlreadyExists"));
            }
            state.workloads.insert(id, object.clone());
            Ok(object.clone())
        })
    }

    async fn replace_workload(&self, object: &WorkloadObject) -> Result<WorkloadObject, K8sError> {
        self.with_state(|state| {
            let stored = state
                .workloads
                .get_mut(&workload_id(object))
                .ok_or_else(|| api_error(404, "NotFound"))?;
            *stored = object.clone();
            Ok(object.clone())
        })
    }

    async fn get_workload(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadObject, K8sError> {
        self.with_state(|state| {
            state
                .workloads
                .get(&(kind, namespace.to_string(), name.to_string()))
                .cloned()
                .map(rolled_out)
                .ok_or_else(|| api_error(404, "NotFound"))
        })
    }

    async fn delete_workload(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), K8sError> {
        self.with_state(|state| {
            state
                .workloads
                .remove(&(kind, namespace.to_string(), name.to_string()))
                .map(|_| ())
                .ok_or_else(|| api_error(404, "NotFound"))
        })
    }
}

/// Connects kubeconfigs to [`MockCluster`]s, keyed by current context.
#[derive(Default)]
pub struct MockConnector {
    clusters: Mutex<HashMap<String, MockCluster>>,
    connections: Mutex<usize>,
}

impl MockConnector {
    /// Returns the fake cluster reached through `context`, creating it on
    /// first use.
    pub fn cluster(&self, context: &str) -> MockCluster {
        self.clusters
            .lock()
            .unwrap()
            .entry(context.to_string())
            .or_default()
            .clone()
    }

    pub fn connections(&self) -> usize {
        *self.connections.lock().unwrap()
    }
}

#[async_trait]
impl ClusterConnector for MockConnector {
    async fn connect(&self, kubeconfig: Kubeconfig) -> Result<ConnectionHandle, ConnectError> {
        let context = kubeconfig.current_context.unwrap_or_default();
        let cluster = self.cluster(&context);
        *self.connections.lock().unwrap() += 1;

        Ok(Arc::new(MockClusterClient { cluster }))
    }
}

pub fn node(name: &str, cpu: (&str, &str), memory: (&str, &str), ready: bool) -> Node {
    serde_json::from_value(json!({
        "metadata": { "name": name, "labels": { "kubernetes.io/hostname": name } },
        "spec": {
            "taints": [
                { "key": "dedicated", "value": "infra", "effect": "NoSchedule" }
            ]
        },
        "status": {
            "capacity": { "cpu": cpu.0, "memory": memory.0 },
            "allocatable": { "cpu": cpu.1, "memory": memory.1 },
            "conditions": [
                { "type": "Ready", "status": if ready { "True" } else { "False" } }
            ]
        }
    }))
    .unwrap()
}

pub fn pod(namespace: &str, name: &str, phase: &str) -> Pod {
    serde_json::from_value(json!({
        "metadata": { "name": name, "namespace": namespace },
        "status": { "phase": phase }
    }))
    .unwrap()
}

pub fn service(namespace: &str, name: &str) -> Service {
    serde_json::from_value(json!({
        "metadata": { "name": name, "namespace": namespace },
        "spec": { "type": "ClusterIP", "ports": [{ "port": 80 }] }
    }))
    .unwrap()
}

pub fn event(reason: &str, kind: &str, name: &str, last_timestamp: &str) -> Event {
    serde_json::from_value(json!({
        "metadata": { "name": format!("{name}.{reason}"), "namespace": "default" },
        "type": "Normal",
        "reason": reason,
        "message": format!("{reason} {name}"),
        "lastTimestamp": last_timestamp,
        "involvedObject": { "kind": kind, "name": name }
    }))
    .unwrap()
}
