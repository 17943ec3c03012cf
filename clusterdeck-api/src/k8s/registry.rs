use base64::{Engine, prelude::BASE64_STANDARD};
use kube::config::{Kubeconfig, KubeconfigError};
use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::string::FromUtf8Error;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::k8s::{ClusterConnector, ConnectError, ConnectionHandle};

const INITIALIZATIONS_METRIC: &str = "clusterdeck_registry_initializations_total";
const EVICTIONS_METRIC: &str = "clusterdeck_registry_evictions_total";
const CONNECTIONS_METRIC: &str = "clusterdeck_registry_connections";

#[derive(Debug, Error)]
pub enum CredentialDecodeError {
    /// The stored blob is not base64.
    #[error("the credential is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes are not text.
    #[error("the decoded credential is not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// Errors raised while connecting to a cluster or looking up its connection.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The stored credential blob could not be decoded.
    #[error("The cluster credential cannot be decoded: {0}")]
    CredentialDecode(#[from] CredentialDecodeError),

    /// The decoded credential is not a kubeconfig, or it has no usable
    /// context.
    #[error("The cluster credential is not a valid kubeconfig: {0}")]
    Configuration(#[source] KubeconfigError),

    /// The kubeconfig was valid but the client could not be created.
    #[error("The client for the cluster cannot be built: {0}")]
    ClientConstruction(#[source] kube::Error),

    /// [`ConnectionRegistry::resolve`] was called before a successful
    /// initialize, or after an evict.
    #[error("No connection is initialized for cluster {0}")]
    NotInitialized(i64),
}

impl From<ConnectError> for RegistryError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::Configuration(err) => RegistryError::Configuration(err),
            ConnectError::ClientConstruction(err) => RegistryError::ClientConstruction(err),
        }
    }
}

/// Decodes a stored credential blob into a kubeconfig.
///
/// The blob is a base64 encoded kubeconfig YAML document. Nothing is
/// written to disk.
pub fn decode_credential(credential: &str) -> Result<Kubeconfig, RegistryError> {
    let bytes = BASE64_STANDARD
        .decode(credential.trim())
        .map_err(CredentialDecodeError::from)?;
    let yaml = String::from_utf8(bytes).map_err(CredentialDecodeError::from)?;

    Kubeconfig::from_yaml(&yaml).map_err(RegistryError::Configuration)
}

/// Live cluster connections keyed by cluster id.
///
/// Connections are created by [`ConnectionRegistry::initialize`] and handed
/// out by [`ConnectionRegistry::resolve`]; resolving never connects on its
/// own. A handle is installed with a single write-locked insert, so readers
/// either see the previous handle or the new one. Initializations of the
/// same id are serialized, the last one to finish wins.
pub struct ConnectionRegistry {
    connector: Arc<dyn ClusterConnector>,
    handles: RwLock<HashMap<i64, ConnectionHandle>>,
    init_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn ClusterConnector>) -> Self {
        Self {
            connector,
            handles: RwLock::new(HashMap::new()),
            init_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a client from `credential` and installs it for `cluster_id`,
    /// replacing any previous handle.
    ///
    /// On failure the previously installed handle, if any, is kept.
    pub async fn initialize(&self, cluster_id: i64, credential: &str) -> Result<(), RegistryError> {
        let init_lock = self.init_lock(cluster_id);
        let _guard = init_lock.lock().await;

        let handle = match self.connect(credential).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(cluster_id, error = %err, "failed to initialize cluster connection");
                counter!(INITIALIZATIONS_METRIC, "outcome" => "failure").increment(1);
                return Err(err);
            }
        };

        let (replaced, connections) = {
            let mut handles = self.handles.write();
            let replaced = handles.insert(cluster_id, handle).is_some();
            (replaced, handles.len())
        };

        counter!(INITIALIZATIONS_METRIC, "outcome" => "success").increment(1);
        gauge!(CONNECTIONS_METRIC).set(connections as f64);
        info!(cluster_id, replaced, "cluster connection initialized");

        Ok(())
    }

    /// Returns the handle installed for `cluster_id`.
    pub fn resolve(&self, cluster_id: i64) -> Result<ConnectionHandle, RegistryError> {
        self.handles
            .read()
            .get(&cluster_id)
            .cloned()
            .ok_or(RegistryError::NotInitialized(cluster_id))
    }

    /// Drops the handle of `cluster_id`. Does nothing for unknown ids.
    pub fn evict(&self, cluster_id: i64) {
        let (evicted, connections) = {
            let mut handles = self.handles.write();
            let evicted = handles.remove(&cluster_id).is_some();
            (evicted, handles.len())
        };

        {
            let mut init_locks = self.init_locks.lock();
            let idle = init_locks
                .get(&cluster_id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1);
            if idle {
                init_locks.remove(&cluster_id);
            }
        }

        if evicted {
            counter!(EVICTIONS_METRIC).increment(1);
            gauge!(CONNECTIONS_METRIC).set(connections as f64);
            info!(cluster_id, "cluster connection evicted");
        }
    }

    /// Number of installed handles.
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn init_lock(&self, cluster_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        self.init_locks
            .lock()
            .entry(cluster_id)
            .or_default()
            .clone()
    }

    async fn connect(&self, credential: &str) -> Result<ConnectionHandle, RegistryError> {
        let kubeconfig = decode_credential(credential)?;
        let handle = self.connector.connect(kubeconfig).await?;

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::workload::WorkloadKind;
    use crate::k8s::manifest::WorkloadObject;
    use crate::k8s::{ClusterClient, K8sError};
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{Event, Node, Pod, Service};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: test
  cluster:
    server: https://127.0.0.1:6443
users:
- name: admin
  user:
    token: secret
contexts:
- name: test
  context:
    cluster: test
    user: admin
current-context: test
"#;

    /// Remembers which connect call produced it.
    struct FakeClient {
        generation: usize,
    }

    #[async_trait]
    impl ClusterClient for FakeClient {
        async fn list_nodes(&self) -> Result<Vec<Node>, K8sError> {
            let mut node = Node::default();
            node.metadata.name = Some(format!("generation-{}", self.generation));
            Ok(vec![node])
        }

        async fn get_node(&self, _name: &str) -> Result<Node, K8sError> {
            Ok(Node::default())
        }

        async fn replace_node(&self, node: &Node) -> Result<Node, K8sError> {
            Ok(node.clone())
        }

        async fn list_pods(&self, _namespace: Option<&str>) -> Result<Vec<Pod>, K8sError> {
            Ok(vec![])
        }

        async fn list_services(&self, _namespace: Option<&str>) -> Result<Vec<Service>, K8sError> {
            Ok(vec![])
        }

        async fn list_events(&self) -> Result<Vec<Event>, K8sError> {
            Ok(vec![])
        }

        async fn create_workload(&self, object: &WorkloadObject) -> Result<WorkloadObject, K8sError> {
            Ok(object.clone())
        }

        async fn replace_workload(&self, object: &WorkloadObject) -> Result<WorkloadObject, K8sError> {
            Ok(object.clone())
        }

        async fn get_workload(
            &self,
            _kind: WorkloadKind,
            _namespace: &str,
            _name: &str,
        ) -> Result<WorkloadObject, K8sError> {
            Ok(WorkloadObject::Deployment(Default::default()))
        }

        async fn delete_workload(
            &self,
            _kind: WorkloadKind,
            _namespace: &str,
            _name: &str,
        ) -> Result<(), K8sError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl ClusterConnector for CountingConnector {
        async fn connect(&self, _kubeconfig: Kubeconfig) -> Result<ConnectionHandle, ConnectError> {
            let generation = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Arc::new(FakeClient { generation }))
        }
    }

    fn registry() -> (Arc<CountingConnector>, ConnectionRegistry) {
        let connector = Arc::new(CountingConnector::default());
        let registry = ConnectionRegistry::new(connector.clone());
        (connector, registry)
    }

    fn valid_credential() -> String {
        BASE64_STANDARD.encode(KUBECONFIG)
    }

    async fn generation(handle: &ConnectionHandle) -> String {
        let nodes = handle.list_nodes().await.unwrap();
        nodes[0].metadata.name.clone().unwrap()
    }

    #[tokio::test]
    async fn resolve_before_initialize_fails() {
        let (_, registry) = registry();

        assert!(matches!(
            registry.resolve(1),
            Err(RegistryError::NotInitialized(1))
        ));
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_handle() {
        let (_, registry) = registry();
        let registry = Arc::new(registry);
        registry.initialize(1, &valid_credential()).await.unwrap();
        let installed = registry.resolve(1).unwrap();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move { registry.resolve(1) }));
        }

        for task in tasks {
            let handle = task.await.unwrap().unwrap();
            assert!(Arc::ptr_eq(&handle, &installed));
        }
    }

    #[tokio::test]
    async fn reinitialization_replaces_the_handle() {
        let (connector, registry) = registry();
        registry.initialize(1, &valid_credential()).await.unwrap();
        let first = registry.resolve(1).unwrap();

        registry.initialize(1, &valid_credential()).await.unwrap();
        let second = registry.resolve(1).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(generation(&second).await, "generation-2");
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn malformed_credential_keeps_the_previous_handle() {
        let (_, registry) = registry();
        registry.initialize(1, &valid_credential()).await.unwrap();
        let installed = registry.resolve(1).unwrap();

        let err = registry.initialize(1, "%%% not base64 %%%").await.unwrap_err();
        assert!(matches!(err, RegistryError::CredentialDecode(_)));

        let invalid_yaml = BASE64_STANDARD.encode("clusters: not-a-list");
        let err = registry.initialize(1, &invalid_yaml).await.unwrap_err();
        assert!(matches!(err, RegistryError::Configuration(_)));

        let non_utf8 = BASE64_STANDARD.encode([0xff, 0xfe, 0xfd]);
        let err = registry.initialize(1, &non_utf8).await.unwrap_err();
        assert!(matches!(err, RegistryError::CredentialDecode(_)));

        assert!(Arc::ptr_eq(&registry.resolve(1).unwrap(), &installed));
    }

    #[tokio::test]
    async fn evict_removes_only_the_given_cluster() {
        let (_, registry) = registry();
        registry.initialize(1, &valid_credential()).await.unwrap();
        registry.initialize(2, &valid_credential()).await.unwrap();

        registry.evict(1);
        registry.evict(1);
        registry.evict(42);

        assert!(matches!(
            registry.resolve(1),
            Err(RegistryError::NotInitialized(1))
        ));
        assert!(registry.resolve(2).is_ok());
    }

    #[tokio::test]
    async fn concurrent_initializations_leave_one_complete_handle() {
        let (connector, registry) = registry();
        let registry = Arc::new(registry);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let credential = valid_credential();
            tasks.push(tokio::spawn(async move {
                registry.initialize(7, &credential).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(connector.connects.load(Ordering::SeqCst), 8);
        assert_eq!(registry.len(), 1);
        let handle = registry.resolve(7).unwrap();
        let generation = generation(&handle).await;
        assert!((1..=8).any(|n| generation == format!("generation-{n}")));
    }
}
