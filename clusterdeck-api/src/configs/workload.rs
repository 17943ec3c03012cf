use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::configs::store::Store;

/// Labels and annotations of a workload.
pub type StringMap = BTreeMap<String, String>;

impl Store for StringMap {}

#[derive(Debug, Error)]
#[error("unsupported workload kind `{0}`, expected one of Deployment, StatefulSet or DaemonSet")]
pub struct InvalidWorkloadKind(pub String);

/// The workload kinds the API manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
        }
    }

    /// DaemonSets run one pod per node and have no replica count.
    pub fn supports_replicas(&self) -> bool {
        !matches!(self, WorkloadKind::DaemonSet)
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadKind {
    type Err = InvalidWorkloadKind;

    /// Accepts the kind name in any case, singular or plural, so both
    /// `Deployment` and the `deployments` path segment parse.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let singular = normalized.strip_suffix('s').unwrap_or(&normalized);

        match singular {
            "deployment" => Ok(WorkloadKind::Deployment),
            "statefulset" => Ok(WorkloadKind::StatefulSet),
            "daemonset" => Ok(WorkloadKind::DaemonSet),
            _ => Err(InvalidWorkloadKind(value.to_string())),
        }
    }
}

impl TryFrom<String> for WorkloadKind {
    type Error = InvalidWorkloadKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A container of a workload's pod template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub requests: ResourceList,
    #[serde(default)]
    pub limits: ResourceList,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub ports: Vec<ContainerPort>,
}

/// CPU and memory quantities, e.g. `100m` and `128Mi`. Empty means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    #[serde(default)]
    pub cpu: String,
    #[serde(default)]
    pub memory: String,
}

impl ResourceList {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_empty() && self.memory.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPort {
    #[serde(default)]
    pub name: String,
    pub container_port: i32,
    #[serde(default)]
    pub protocol: String,
}

/// The containers column.
///
/// Always written as an array. Older rows hold a single container object,
/// so reads accept both shapes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredContainers")]
pub struct Containers(pub Vec<Container>);

impl Store for Containers {}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredContainers {
    Many(Vec<Container>),
    One(Container),
}

impl From<StoredContainers> for Containers {
    fn from(value: StoredContainers) -> Self {
        match value {
            StoredContainers::Many(containers) => Containers(containers),
            StoredContainers::One(container) => Containers(vec![container]),
        }
    }
}

/// Last observed state of the remote object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadStatus {
    #[serde(default)]
    pub desired_replicas: i32,
    #[serde(default)]
    pub current_replicas: i32,
    #[serde(default)]
    pub ready_replicas: i32,
    #[serde(default)]
    pub conditions: Vec<WorkloadCondition>,
}

impl Store for WorkloadStatus {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default)]
    pub last_update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}
