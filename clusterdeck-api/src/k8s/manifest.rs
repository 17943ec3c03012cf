use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::configs::workload::{
    Container, StringMap, WorkloadCondition, WorkloadKind, WorkloadStatus,
};
use crate::db::workloads::NewWorkload;
use crate::k8s::quantity::{QuantityError, parse_quantity};

/// Label put on the pod template when a workload has no labels of its own.
const DEFAULT_SELECTOR_LABEL: &str = "app";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("the workload manifest cannot be built: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid {field} of container `{container}`: {source}")]
    InvalidQuantity {
        container: String,
        field: &'static str,
        source: QuantityError,
    },

    #[error("{0} workloads have no replica count")]
    ReplicasNotSupported(WorkloadKind),
}

/// A workload object as exchanged with a cluster's API server.
#[derive(Debug, Clone)]
pub enum WorkloadObject {
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    DaemonSet(DaemonSet),
}

impl WorkloadObject {
    pub fn kind(&self) -> WorkloadKind {
        match self {
            WorkloadObject::Deployment(_) => WorkloadKind::Deployment,
            WorkloadObject::StatefulSet(_) => WorkloadKind::StatefulSet,
            WorkloadObject::DaemonSet(_) => WorkloadKind::DaemonSet,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            WorkloadObject::Deployment(object) => &object.metadata,
            WorkloadObject::StatefulSet(object) => &object.metadata,
            WorkloadObject::DaemonSet(object) => &object.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }

    pub fn replicas(&self) -> Option<i32> {
        match self {
            WorkloadObject::Deployment(object) => object.spec.as_ref()?.replicas,
            WorkloadObject::StatefulSet(object) => object.spec.as_ref()?.replicas,
            WorkloadObject::DaemonSet(_) => None,
        }
    }

    pub fn set_replicas(&mut self, replicas: i32) -> Result<(), ManifestError> {
        match self {
            WorkloadObject::Deployment(object) => {
                object.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
            }
            WorkloadObject::StatefulSet(object) => {
                object.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
            }
            WorkloadObject::DaemonSet(_) => {
                return Err(ManifestError::ReplicasNotSupported(WorkloadKind::DaemonSet));
            }
        }

        Ok(())
    }

    /// Replica counts and conditions reported by the object.
    ///
    /// For DaemonSets the desired count is the number of nodes the set
    /// should run on.
    pub fn status(&self) -> WorkloadStatus {
        match self {
            WorkloadObject::Deployment(object) => {
                let status = object.status.clone().unwrap_or_default();
                WorkloadStatus {
                    desired_replicas: self.replicas().unwrap_or(1),
                    current_replicas: status.replicas.unwrap_or_default(),
                    ready_replicas: status.ready_replicas.unwrap_or_default(),
                    conditions: status
                        .conditions
                        .unwrap_or_default()
                        .into_iter()
                        .map(|condition| WorkloadCondition {
                            type_: condition.type_,
                            status: condition.status,
                            last_update_time: condition.last_update_time.map(|time| time.0),
                            last_transition_time: condition.last_transition_time.map(|time| time.0),
                            reason: condition.reason.unwrap_or_default(),
                            message: condition.message.unwrap_or_default(),
                        })
                        .collect(),
                }
            }
            WorkloadObject::StatefulSet(object) => {
                let status = object.status.clone().unwrap_or_default();
                WorkloadStatus {
                    desired_replicas: self.replicas().unwrap_or(1),
                    current_replicas: status.replicas,
                    ready_replicas: status.ready_replicas.unwrap_or_default(),
                    conditions: status
                        .conditions
                        .unwrap_or_default()
                        .into_iter()
                        .map(|condition| {
                            transition_only(
                                condition.type_,
                                condition.status,
                                condition.last_transition_time,
                                condition.reason,
                                condition.message,
                            )
                        })
                        .collect(),
                }
            }
            WorkloadObject::DaemonSet(object) => {
                let status = object.status.clone().unwrap_or_default();
                WorkloadStatus {
                    desired_replicas: status.desired_number_scheduled,
                    current_replicas: status.current_number_scheduled,
                    ready_replicas: status.number_ready,
                    conditions: status
                        .conditions
                        .unwrap_or_default()
                        .into_iter()
                        .map(|condition| {
                            transition_only(
                                condition.type_,
                                condition.status,
                                condition.last_transition_time,
                                condition.reason,
                                condition.message,
                            )
                        })
                        .collect(),
                }
            }
        }
    }
}

fn transition_only(
    type_: String,
    status: String,
    last_transition_time: Option<Time>,
    reason: Option<String>,
    message: Option<String>,
) -> WorkloadCondition {
    WorkloadCondition {
        type_,
        status,
        last_update_time: None,
        last_transition_time: last_transition_time.map(|time| time.0),
        reason: reason.unwrap_or_default(),
        message: message.unwrap_or_default(),
    }
}

/// Labels selecting the workload's pods.
///
/// The workload's own labels are used when present. An empty selector is
/// rejected by the API server, so `app: <name>` is used otherwise.
pub fn selector_labels(workload: &NewWorkload) -> StringMap {
    if workload.labels.is_empty() {
        StringMap::from([(
            DEFAULT_SELECTOR_LABEL.to_string(),
            workload.key.name.clone(),
        )])
    } else {
        workload.labels.clone()
    }
}

/// Builds the object sent to the cluster for `workload`.
///
/// The pod template carries the workload's containers and the selector
/// labels. StatefulSets get a governing service named after the workload.
pub fn build_workload_object(workload: &NewWorkload) -> Result<WorkloadObject, ManifestError> {
    let selector = selector_labels(workload);

    let containers = workload
        .containers
        .0
        .iter()
        .map(container_manifest)
        .collect::<Result<Vec<_>, _>>()?;

    let mut spec = Map::new();
    if workload.key.kind.supports_replicas() {
        spec.insert("replicas".to_string(), json!(workload.replicas));
    }
    if workload.key.kind == WorkloadKind::StatefulSet {
        spec.insert("serviceName".to_string(), json!(workload.key.name));
    }
    spec.insert("selector".to_string(), json!({ "matchLabels": selector }));
    spec.insert(
        "template".to_string(),
        json!({
            "metadata": { "labels": selector },
            "spec": { "containers": containers },
        }),
    );

    let manifest = json!({
        "apiVersion": "apps/v1",
        "kind": workload.key.kind.as_str(),
        "metadata": {
            "name": workload.key.name,
            "namespace": workload.key.namespace,
            "labels": workload.labels,
            "annotations": workload.annotations,
        },
        "spec": spec,
    });

    let object = match workload.key.kind {
        WorkloadKind::Deployment => WorkloadObject::Deployment(serde_json::from_value(manifest)?),
        WorkloadKind::StatefulSet => WorkloadObject::StatefulSet(serde_json::from_value(manifest)?),
        WorkloadKind::DaemonSet => WorkloadObject::DaemonSet(serde_json::from_value(manifest)?),
    };

    Ok(object)
}

fn container_manifest(container: &Container) -> Result<Value, ManifestError> {
    let mut manifest = Map::new();
    manifest.insert("name".to_string(), json!(container.name));
    manifest.insert("image".to_string(), json!(container.image));

    let mut resources = Map::new();
    for (field, list) in [("requests", &container.requests), ("limits", &container.limits)] {
        if list.is_empty() {
            continue;
        }

        let mut quantities = Map::new();
        for (resource, quantity) in [("cpu", &list.cpu), ("memory", &list.memory)] {
            if quantity.is_empty() {
                continue;
            }
            parse_quantity(quantity).map_err(|source| ManifestError::InvalidQuantity {
                container: container.name.clone(),
                field,
                source,
            })?;
            quantities.insert(resource.to_string(), json!(quantity));
        }
        resources.insert(field.to_string(), Value::Object(quantities));
    }
    if !resources.is_empty() {
        manifest.insert("resources".to_string(), Value::Object(resources));
    }

    if !container.env.is_empty() {
        let env: Vec<Value> = container
            .env
            .iter()
            .map(|var| json!({ "name": var.name, "value": var.value }))
            .collect();
        manifest.insert("env".to_string(), json!(env));
    }

    if !container.ports.is_empty() {
        let ports: Vec<Value> = container
            .ports
            .iter()
            .map(|port| {
                let mut value = Map::new();
                value.insert("containerPort".to_string(), json!(port.container_port));
                if !port.name.is_empty() {
                    value.insert("name".to_string(), json!(port.name));
                }
                if !port.protocol.is_empty() {
                    value.insert("protocol".to_string(), json!(port.protocol));
                }
                Value::Object(value)
            })
            .collect();
        manifest.insert("ports".to_string(), json!(ports));
    }

    Ok(Value::Object(manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::workload::{ContainerPort, Containers, EnvVar, ResourceList};
    use crate::db::workloads::WorkloadKey;

    fn workload(kind: WorkloadKind, labels: StringMap) -> NewWorkload {
        NewWorkload {
            key: WorkloadKey {
                cluster_id: 1,
                kind,
                namespace: "default".to_string(),
                name: "web".to_string(),
            },
            replicas: 3,
            containers: Containers(vec![Container {
                name: "nginx".to_string(),
                image: "nginx:1.27".to_string(),
                requests: ResourceList {
                    cpu: "100m".to_string(),
                    memory: "128Mi".to_string(),
                },
                limits: ResourceList {
                    cpu: String::new(),
                    memory: "256Mi".to_string(),
                },
                env: vec![EnvVar {
                    name: "NGINX_PORT".to_string(),
                    value: "80".to_string(),
                }],
                ports: vec![ContainerPort {
                    name: "http".to_string(),
                    container_port: 80,
                    protocol: "TCP".to_string(),
                }],
            }]),
            labels,
            annotations: StringMap::new(),
            status: WorkloadStatus::default(),
        }
    }

    #[test]
    fn deployment_uses_labels_as_selector() {
        let labels = StringMap::from([("tier".to_string(), "frontend".to_string())]);
        let object = build_workload_object(&workload(WorkloadKind::Deployment, labels)).unwrap();

        let WorkloadObject::Deployment(deployment) = &object else {
            panic!("expected a deployment, got {:?}", object.kind());
        };
        let spec = deployment.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(3));
        let match_labels = spec.selector.match_labels.as_ref().unwrap();
        assert_eq!(match_labels.get("tier").map(String::as_str), Some("frontend"));

        let pod_spec = spec.template.spec.as_ref().unwrap();
        let container = &pod_spec.containers[0];
        assert_eq!(container.image.as_deref(), Some("nginx:1.27"));
        let resources = container.resources.as_ref().unwrap();
        assert_eq!(resources.requests.as_ref().unwrap()["cpu"].0, "100m");
        assert!(!resources.limits.as_ref().unwrap().contains_key("cpu"));
        assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 80);
        assert_eq!(object.name(), "web");
        assert_eq!(object.namespace(), "default");
    }

    #[test]
    fn statefulset_gets_a_service_name_and_default_selector() {
        let object =
            build_workload_object(&workload(WorkloadKind::StatefulSet, StringMap::new())).unwrap();

        let WorkloadObject::StatefulSet(stateful_set) = &object else {
            panic!("expected a statefulset, got {:?}", object.kind());
        };
        let manifest = serde_json::to_value(stateful_set).unwrap();
        assert_eq!(manifest["spec"]["serviceName"], json!("web"));
        let spec = stateful_set.spec.as_ref().unwrap();
        let match_labels = spec.selector.match_labels.as_ref().unwrap();
        assert_eq!(match_labels.get("app").map(String::as_str), Some("web"));
    }

    #[test]
    fn daemonset_has_no_replicas() {
        let mut object =
            build_workload_object(&workload(WorkloadKind::DaemonSet, StringMap::new())).unwrap();

        assert_eq!(object.kind(), WorkloadKind::DaemonSet);
        assert_eq!(object.replicas(), None);
        assert!(matches!(
            object.set_replicas(2),
            Err(ManifestError::ReplicasNotSupported(WorkloadKind::DaemonSet))
        ));
    }

    #[test]
    fn invalid_quantities_are_rejected() {
        let mut workload = workload(WorkloadKind::Deployment, StringMap::new());
        workload.containers.0[0].requests.cpu = "lots".to_string();

        let err = build_workload_object(&workload).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::InvalidQuantity { field: "requests", .. }
        ));
    }

    #[test]
    fn deployment_status_is_read_from_the_object() {
        let mut object =
            build_workload_object(&workload(WorkloadKind::Deployment, StringMap::new())).unwrap();
        if let WorkloadObject::Deployment(deployment) = &mut object {
            deployment.status = Some(serde_json::from_value(json!({
                "replicas": 3,
                "readyReplicas": 2,
                "conditions": [{
                    "type": "Available",
                    "status": "True",
                    "lastUpdateTime": "2024-05-01T10:00:00Z",
                    "reason": "MinimumReplicasAvailable",
                }],
            }))
            .unwrap());
        }

        let status = object.status();
        assert_eq!(status.desired_replicas, 3);
        assert_eq!(status.current_replicas, 3);
        assert_eq!(status.ready_replicas, 2);
        assert_eq!(status.conditions[0].type_, "Available");
        assert!(status.conditions[0].last_update_time.is_some());
    }
}
