use serde::{Deserialize, Serialize};

use crate::configs::store::Store;

/// Address ranges of a cluster's pod and service networks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNetwork {
    #[serde(default)]
    pub pod_cidr: String,
    #[serde(default)]
    pub svc_cidr: String,
}

impl Store for ClusterNetwork {}

/// Zone and subnet lists.
impl Store for Vec<String> {}
