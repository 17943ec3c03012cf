use base64::{Engine, prelude::BASE64_STANDARD};
use clusterdeck_api::configs::cluster::ClusterNetwork;
use clusterdeck_api::configs::workload::{Container, Containers, ContainerPort, EnvVar, ResourceList};
use clusterdeck_api::routes::clusters::{CreateClusterRequest, CreateClusterResponse};
use clusterdeck_api::routes::workloads::CreateWorkloadRequest;
use clusterdeck_config::SerializableSecretString;
use std::collections::BTreeMap;

use crate::support::test_app::TestApp;

/// Returns a base64 encoded kubeconfig whose current context is `context`.
pub fn kube_config(context: &str) -> String {
    let yaml = format!(
        r#"apiVersion: v1
kind: Config
current-context: {context}
clusters:
  - name: {context}
    cluster:
      server: https://{context}.example.com:6443
contexts:
  - name: {context}
    context:
      cluster: {context}
      user: {context}-admin
users:
  - name: {context}-admin
    user:
      token: not-a-real-token
"#
    );

    BASE64_STANDARD.encode(yaml)
}

/// Returns a cluster registration request reaching the fake cluster of
/// `context`.
pub fn new_cluster(name: &str, context: &str) -> CreateClusterRequest {
    CreateClusterRequest {
        name: name.to_string(),
        cn_name: format!("{name} (display)"),
        cluster_type: "kubernetes".to_string(),
        api_server: format!("https://{context}.example.com:6443"),
        kube_config: SerializableSecretString::from(kube_config(context)),
        enabled: true,
        version: "v1.30.2".to_string(),
        region: "eu-west-1".to_string(),
        zones: vec!["eu-west-1a".to_string(), "eu-west-1b".to_string()],
        subnets: vec!["10.0.0.0/24".to_string()],
        network: ClusterNetwork {
            pod_cidr: "10.244.0.0/16".to_string(),
            svc_cidr: "10.96.0.0/12".to_string(),
        },
    }
}

/// Registers a cluster and returns its id.
pub async fn create_cluster(app: &TestApp, name: &str, context: &str) -> i64 {
    let response = app.create_cluster(&new_cluster(name, context)).await;
    assert!(response.status().is_success());
    let response: CreateClusterResponse = response
        .json()
        .await
        .expect("failed to deserialize response");

    response.id
}

pub fn web_container() -> Container {
    Container {
        name: "web".to_string(),
        image: "nginx:1.27".to_string(),
        requests: ResourceList {
            cpu: "100m".to_string(),
            memory: "128Mi".to_string(),
        },
        limits: ResourceList {
            cpu: "500m".to_string(),
            memory: "256Mi".to_string(),
        },
        env: vec![EnvVar {
            name: "MODE".to_string(),
            value: "production".to_string(),
        }],
        ports: vec![ContainerPort {
            name: "http".to_string(),
            container_port: 80,
            protocol: "TCP".to_string(),
        }],
    }
}

pub fn new_workload(name: &str, replicas: i32) -> CreateWorkloadRequest {
    CreateWorkloadRequest {
        name: name.to_string(),
        replicas,
        containers: Containers(vec![web_container()]),
        labels: BTreeMap::from([("app".to_string(), name.to_string())]),
        annotations: BTreeMap::from([("team".to_string(), "platform".to_string())]),
    }
}
