use base64::{Engine, prelude::BASE64_STANDARD};
use clusterdeck_api::config::{ApiConfig, ApplicationSettings, KubeClientConfig};
use clusterdeck_api::k8s::registry::ConnectionRegistry;
use clusterdeck_api::routes::clusters::{CreateClusterRequest, UpdateClusterRequest};
use clusterdeck_api::routes::nodes::{UpdateNodeLabelsRequest, UpdateNodeTaintsRequest};
use clusterdeck_api::routes::workloads::{
    CreateWorkloadRequest, ScaleWorkloadRequest, UpdateWorkloadRequest,
};
use clusterdeck_api::startup::run;
use clusterdeck_api::store::memory::MemoryStore;
use clusterdeck_config::Environment;
use clusterdeck_config::shared::{PgConnectionConfig, TlsConfig};
use reqwest::{IntoUrl, RequestBuilder};
use std::io;
use std::net::TcpListener;
use std::sync::Arc;

use crate::support::k8s_client::MockConnector;

pub struct TestApp {
    pub address: String,
    pub api_client: reqwest::Client,
    pub api_key: String,
    pub store: Arc<MemoryStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub connector: Arc<MockConnector>,
    server_handle: tokio::task::JoinHandle<io::Result<()>>,
}

impl TestApp {
    fn get_authenticated<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.api_client.get(url).bearer_auth(self.api_key.clone())
    }

    fn post_authenticated<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.api_client.post(url).bearer_auth(self.api_key.clone())
    }

    fn put_authenticated<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.api_client.put(url).bearer_auth(self.api_key.clone())
    }

    fn patch_authenticated<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.api_client.patch(url).bearer_auth(self.api_key.clone())
    }

    fn delete_authenticated<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.api_client
            .delete(url)
            .bearer_auth(self.api_key.clone())
    }

    pub async fn create_cluster(&self, cluster: &CreateClusterRequest) -> reqwest::Response {
        self.post_authenticated(format!("{}/v1/clusters", &self.address))
            .json(cluster)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn read_cluster(&self, cluster_id: i64) -> reqwest::Response {
        self.get_authenticated(format!("{}/v1/clusters/{cluster_id}", &self.address))
            .send()
            .await
            .expect("failed to execute request")
    }

    pub async fn read_all_clusters(&self, query: &str) -> reqwest::Response {
        self.get_authenticated(format!("{}/v1/clusters{query}", &self.address))
            .send()
            .await
            .expect("failed to execute request")
    }

    pub async fn update_cluster(
        &self,
        cluster_id: i64,
        cluster: &UpdateClusterRequest,
    ) -> reqwest::Response {
        self.put_authenticated(format!("{}/v1/clusters/{cluster_id}", &self.address))
            .json(cluster)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn delete_cluster(&self, cluster_id: i64) -> reqwest::Response {
        self.delete_authenticated(format!("{}/v1/clusters/{cluster_id}", &self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Sends an authenticated GET to a path below `/v1/clusters/{cluster_id}`.
    pub async fn read_cluster_resource(&self, cluster_id: i64, path: &str) -> reqwest::Response {
        self.get_authenticated(format!(
            "{}/v1/clusters/{cluster_id}/{path}",
            &self.address
        ))
        .send()
        .await
        .expect("failed to execute request")
    }

    pub async fn update_node_labels(
        &self,
        cluster_id: i64,
        node_name: &str,
        labels: &UpdateNodeLabelsRequest,
    ) -> reqwest::Response {
        self.patch_authenticated(format!(
            "{}/v1/clusters/{cluster_id}/nodes/{node_name}/labels",
            &self.address
        ))
        .json(labels)
        .send()
        .await
        .expect("Failed to execute request.")
    }

    pub async fn delete_node_label(
        &self,
        cluster_id: i64,
        node_name: &str,
        label_key: &str,
    ) -> reqwest::Response {
        self.delete_authenticated(format!(
            "{}/v1/clusters/{cluster_id}/nodes/{node_name}/labels/{label_key}",
            &self.address
        ))
        .send()
        .await
        .expect("Failed to execute request.")
    }

    pub async fn update_node_taints(
        &self,
        cluster_id: i64,
        node_name: &str,
        taints: &UpdateNodeTaintsRequest,
    ) -> reqwest::Response {
        self.patch_authenticated(format!(
            "{}/v1/clusters/{cluster_id}/nodes/{node_name}/taints",
            &self.address
        ))
        .json(taints)
        .send()
        .await
        .expect("Failed to execute request.")
    }

    pub async fn delete_node_taint(
        &self,
        cluster_id: i64,
        node_name: &str,
        taint_key: &str,
    ) -> reqwest::Response {
        self.delete_authenticated(format!(
            "{}/v1/clusters/{cluster_id}/nodes/{node_name}/taints/{taint_key}",
            &self.address
        ))
        .send()
        .await
        .expect("Failed to execute request.")
    }

    pub async fn create_workload(
        &self,
        cluster_id: i64,
        kind: &str,
        namespace: &str,
        workload: &CreateWorkloadRequest,
    ) -> reqwest::Response {
        self.post_authenticated(format!(
            "{}/v1/clusters/{cluster_id}/workloads/{kind}/{namespace}",
            &self.address
        ))
        .json(workload)
        .send()
        .await
        .expect("Failed to execute request.")
    }

    pub async fn read_workload(
        &self,
        cluster_id: i64,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> reqwest::Response {
        self.get_authenticated(format!(
            "{}/v1/clusters/{cluster_id}/workloads/{kind}/{namespace}/{name}",
            &self.address
        ))
        .send()
        .await
        .expect("failed to execute request")
    }

    pub async fn read_all_workloads(&self, cluster_id: i64, query: &str) -> reqwest::Response {
        self.get_authenticated(format!(
            "{}/v1/clusters/{cluster_id}/workloads{query}",
            &self.address
        ))
        .send()
        .await
        .expect("failed to execute request")
    }

    pub async fn update_workload(
        &self,
        cluster_id: i64,
        kind: &str,
        namespace: &str,
        name: &str,
        workload: &UpdateWorkloadRequest,
    ) -> reqwest::Response {
        self.put_authenticated(format!(
            "{}/v1/clusters/{cluster_id}/workloads/{kind}/{namespace}/{name}",
            &self.address
        ))
        .json(workload)
        .send()
        .await
        .expect("Failed to execute request.")
    }

    pub async fn delete_workload(
        &self,
        cluster_id: i64,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> reqwest::Response {
        self.delete_authenticated(format!(
            "{}/v1/clusters/{cluster_id}/workloads/{kind}/{namespace}/{name}",
            &self.address
        ))
        .send()
        .await
        .expect("Failed to execute request.")
    }

    pub async fn scale_workload(
        &self,
        cluster_id: i64,
        kind: &str,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> reqwest::Response {
        self.put_authenticated(format!(
            "{}/v1/clusters/{cluster_id}/workloads/{kind}/{namespace}/{name}/scale",
            &self.address
        ))
        .json(&ScaleWorkloadRequest { replicas })
        .send()
        .await
        .expect("Failed to execute request.")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// Builds a configuration that needs no file and no database.
fn test_config() -> ApiConfig {
    ApiConfig {
        database: PgConnectionConfig {
            host: "localhost".to_string(),
            port: 5430,
            name: "clusterdeck".to_string(),
            username: "postgres".to_string(),
            password: None,
            tls: TlsConfig {
                trusted_root_certs: String::new(),
                enabled: false,
            },
        },
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        api_keys: vec![
            BASE64_STANDARD.encode([7u8; 32]),
            BASE64_STANDARD.encode([9u8; 32]),
        ],
        kube: KubeClientConfig::default(),
    }
}

pub async fn spawn_test_app() -> TestApp {
    // We set the environment to dev.
    Environment::Dev.set();

    let base_address = "127.0.0.1";
    let listener =
        TcpListener::bind(format!("{base_address}:0")).expect("failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let config = test_config();
    // The second key is used to show that any configured key is accepted.
    let api_key = config.api_keys[1].clone();

    let store = Arc::new(MemoryStore::new());
    let connector = Arc::new(MockConnector::default());
    let registry = Arc::new(ConnectionRegistry::new(connector.clone()));

    let server = run(config, listener, store.clone(), registry.clone())
        .await
        .expect("failed to bind address");

    let server_handle = tokio::spawn(server);

    TestApp {
        address: format!("http://{base_address}:{port}"),
        api_client: reqwest::Client::new(),
        api_key,
        store,
        registry,
        connector,
        server_handle,
    }
}
