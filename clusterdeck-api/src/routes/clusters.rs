use actix_web::{
    HttpResponse, Responder, ResponseError, delete, get,
    http::StatusCode,
    post, put,
    web::{Data, Json, Path, Query},
};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Pod, Service};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_actix_web::RootSpan;

use crate::configs::cluster::ClusterNetwork;
use crate::db::clusters::{Cluster, NewCluster};
use crate::k8s::registry::RegistryError;
use crate::routes::error_response;
use crate::services::clusters::{
    ClusterEvent, ClusterMetrics, ClusterQuery, ClusterService, ClusterServiceError,
    ClusterStatus, ClusterUpdate,
};
use crate::store::StoreError;
use clusterdeck_config::SerializableSecretString;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error(transparent)]
    Service(#[from] ClusterServiceError),
}

impl ClusterError {
    pub fn to_message(&self) -> String {
        match self {
            ClusterError::Service(err) => service_error_message(err),
        }
    }
}

impl ResponseError for ClusterError {
    fn status_code(&self) -> StatusCode {
        match self {
            ClusterError::Service(err) => service_error_status(err),
        }
    }

    fn error_response(&self) -> HttpResponse {
        error_response(self.status_code(), self.to_message())
    }
}

pub(crate) fn service_error_status(err: &ClusterServiceError) -> StatusCode {
    match err {
        ClusterServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ClusterServiceError::ClusterNotFound(_) => StatusCode::NOT_FOUND,
        ClusterServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ClusterServiceError::Registry(err) => registry_error_status(err),
        ClusterServiceError::Upstream(err) if err.is_not_found() => StatusCode::NOT_FOUND,
        ClusterServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
    }
}

pub(crate) fn service_error_message(err: &ClusterServiceError) -> String {
    match err {
        // Do not expose internal database details in error messages
        ClusterServiceError::Store(err) => store_error_message(err),
        e => e.to_string(),
    }
}

/// Credentials are supplied by the caller, so failing to read one is a
/// client error.
pub(crate) fn registry_error_status(err: &RegistryError) -> StatusCode {
    match err {
        RegistryError::CredentialDecode(_) | RegistryError::Configuration(_) => {
            StatusCode::BAD_REQUEST
        }
        RegistryError::ClientConstruction(_) | RegistryError::NotInitialized(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn store_error_message(err: &StoreError) -> String {
    match err {
        StoreError::DuplicateWorkload(_) => err.to_string(),
        _ => "internal server error".to_string(),
    }
}

fn default_cluster_type() -> String {
    "kubernetes".to_string()
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateClusterRequest {
    pub name: String,
    #[serde(default)]
    pub cn_name: String,
    #[serde(default = "default_cluster_type")]
    pub cluster_type: String,
    pub api_server: String,
    /// Base64 encoded kubeconfig.
    pub kube_config: SerializableSecretString,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub network: ClusterNetwork,
}

impl From<CreateClusterRequest> for NewCluster {
    fn from(request: CreateClusterRequest) -> Self {
        NewCluster {
            name: request.name,
            cn_name: request.cn_name,
            cluster_type: request.cluster_type,
            api_server: request.api_server,
            kube_config: request.kube_config,
            enabled: request.enabled,
            version: request.version,
            region: request.region,
            zones: request.zones,
            subnets: request.subnets,
            network: request.network,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateClusterResponse {
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateClusterRequest {
    pub name: String,
    #[serde(default)]
    pub cn_name: String,
    #[serde(default = "default_cluster_type")]
    pub cluster_type: String,
    pub api_server: String,
    /// Keeps the stored credential when omitted.
    #[serde(default)]
    pub kube_config: Option<SerializableSecretString>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub zones: Vec<String>,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub network: ClusterNetwork,
}

impl From<UpdateClusterRequest> for ClusterUpdate {
    fn from(request: UpdateClusterRequest) -> Self {
        ClusterUpdate {
            name: request.name,
            cn_name: request.cn_name,
            cluster_type: request.cluster_type,
            api_server: request.api_server,
            kube_config: request.kube_config,
            enabled: request.enabled,
            version: request.version,
            region: request.region,
            zones: request.zones,
            subnets: request.subnets,
            network: request.network,
        }
    }
}

/// A cluster record without its credential.
///
/// Single-cluster responses carry the live connection status. Listings leave
/// it out so a page never waits on one connection attempt per row.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadClusterResponse {
    pub id: i64,
    pub name: String,
    pub cn_name: String,
    pub cluster_type: String,
    pub api_server: String,
    pub enabled: bool,
    pub version: String,
    pub region: String,
    pub zones: Vec<String>,
    pub subnets: Vec<String>,
    pub network: ClusterNetwork,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ClusterStatus>,
}

impl ReadClusterResponse {
    fn with_status(cluster: Cluster, status: ClusterStatus) -> Self {
        ReadClusterResponse {
            status: Some(status),
            ..ReadClusterResponse::from(cluster)
        }
    }
}

impl From<Cluster> for ReadClusterResponse {
    fn from(cluster: Cluster) -> Self {
        ReadClusterResponse {
            id: cluster.id,
            name: cluster.name,
            cn_name: cluster.cn_name,
            cluster_type: cluster.cluster_type,
            api_server: cluster.api_server,
            enabled: cluster.enabled,
            version: cluster.version,
            region: cluster.region,
            zones: cluster.zones,
            subnets: cluster.subnets,
            network: cluster.network,
            created_at: cluster.created_at,
            updated_at: cluster.updated_at,
            status: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PageMeta {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadClustersResponse {
    pub data: Vec<ReadClusterResponse>,
    pub meta: PageMeta,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadClusterStatusResponse {
    pub status: ClusterStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadClusterEventsResponse {
    pub events: Vec<ClusterEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadPodsResponse {
    pub pods: Vec<Pod>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadServicesResponse {
    pub services: Vec<Service>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

#[post("/clusters")]
pub async fn create_cluster(
    service: Data<ClusterService>,
    cluster: Json<CreateClusterRequest>,
) -> Result<impl Responder, ClusterError> {
    let cluster = NewCluster::from(cluster.into_inner());
    let id = service.create_cluster(&cluster).await?;

    Ok(Json(CreateClusterResponse { id }))
}

#[get("/clusters")]
pub async fn read_all_clusters(
    service: Data<ClusterService>,
    query: Query<ClusterQuery>,
) -> Result<impl Responder, ClusterError> {
    let listing = service.list_clusters(query.into_inner()).await?;
    let response = ReadClustersResponse {
        data: listing
            .clusters
            .into_iter()
            .map(ReadClusterResponse::from)
            .collect(),
        meta: PageMeta {
            total: listing.total,
            page: listing.page,
            page_size: listing.page_size,
        },
    };

    Ok(Json(response))
}

#[get("/clusters/{cluster_id}")]
pub async fn read_cluster(
    service: Data<ClusterService>,
    cluster_id: Path<i64>,
    root_span: RootSpan,
) -> Result<impl Responder, ClusterError> {
    let cluster_id = cluster_id.into_inner();
    root_span.record("cluster_id", cluster_id);

    let cluster = service.read_cluster(cluster_id).await?;
    let status = service.get_status(cluster_id).await?;

    Ok(Json(ReadClusterResponse::with_status(cluster, status)))
}

#[put("/clusters/{cluster_id}")]
pub async fn update_cluster(
    service: Data<ClusterService>,
    cluster_id: Path<i64>,
    cluster: Json<UpdateClusterRequest>,
    root_span: RootSpan,
) -> Result<impl Responder, ClusterError> {
    let cluster_id = cluster_id.into_inner();
    root_span.record("cluster_id", cluster_id);

    let cluster = service
        .update_cluster(cluster_id, cluster.into_inner().into())
        .await?;
    let status = service.get_status(cluster_id).await?;

    Ok(Json(ReadClusterResponse::with_status(cluster, status)))
}

#[delete("/clusters/{cluster_id}")]
pub async fn delete_cluster(
    service: Data<ClusterService>,
    cluster_id: Path<i64>,
    root_span: RootSpan,
) -> Result<impl Responder, ClusterError> {
    let cluster_id = cluster_id.into_inner();
    root_span.record("cluster_id", cluster_id);

    service.delete_cluster(cluster_id).await?;

    Ok(HttpResponse::Ok().finish())
}

#[get("/clusters/{cluster_id}/status")]
pub async fn read_cluster_status(
    service: Data<ClusterService>,
    cluster_id: Path<i64>,
    root_span: RootSpan,
) -> Result<impl Responder, ClusterError> {
    let cluster_id = cluster_id.into_inner();
    root_span.record("cluster_id", cluster_id);

    let status = service.get_status(cluster_id).await?;

    Ok(Json(ReadClusterStatusResponse { status }))
}

#[get("/clusters/{cluster_id}/metrics")]
pub async fn read_cluster_metrics(
    service: Data<ClusterService>,
    cluster_id: Path<i64>,
    root_span: RootSpan,
) -> Result<impl Responder, ClusterError> {
    let cluster_id = cluster_id.into_inner();
    root_span.record("cluster_id", cluster_id);

    let metrics: ClusterMetrics = service.get_metrics(cluster_id).await?;

    Ok(Json(metrics))
}

#[get("/clusters/{cluster_id}/events")]
pub async fn read_cluster_events(
    service: Data<ClusterService>,
    cluster_id: Path<i64>,
    root_span: RootSpan,
) -> Result<impl Responder, ClusterError> {
    let cluster_id = cluster_id.into_inner();
    root_span.record("cluster_id", cluster_id);

    let events = service.get_events(cluster_id).await?;

    Ok(Json(ReadClusterEventsResponse { events }))
}

#[get("/clusters/{cluster_id}/pods")]
pub async fn read_cluster_pods(
    service: Data<ClusterService>,
    cluster_id: Path<i64>,
    query: Query<NamespaceQuery>,
    root_span: RootSpan,
) -> Result<impl Responder, ClusterError> {
    let cluster_id = cluster_id.into_inner();
    root_span.record("cluster_id", cluster_id);

    let pods = service
        .list_pods(cluster_id, query.namespace.as_deref())
        .await?;

    Ok(Json(ReadPodsResponse { pods }))
}

#[get("/clusters/{cluster_id}/services")]
pub async fn read_cluster_services(
    service: Data<ClusterService>,
    cluster_id: Path<i64>,
    query: Query<NamespaceQuery>,
    root_span: RootSpan,
) -> Result<impl Responder, ClusterError> {
    let cluster_id = cluster_id.into_inner();
    root_span.record("cluster_id", cluster_id);

    let services = service
        .list_services(cluster_id, query.namespace.as_deref())
        .await?;

    Ok(Json(ReadServicesResponse { services }))
}
