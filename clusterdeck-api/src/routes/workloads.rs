use actix_web::{
    HttpResponse, Responder, ResponseError, delete, get,
    http::StatusCode,
    post, put,
    web::{Data, Json, Path, Query},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_actix_web::RootSpan;

use crate::configs::workload::{
    Container, Containers, InvalidWorkloadKind, StringMap, WorkloadCondition, WorkloadKind,
    WorkloadStatus,
};
use crate::db::workloads::{NewWorkload, Workload, WorkloadFilter, WorkloadKey};
use crate::routes::clusters::{registry_error_status, store_error_message};
use crate::routes::error_response;
use crate::services::workloads::{WorkloadService, WorkloadServiceError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error(transparent)]
    InvalidKind(#[from] InvalidWorkloadKind),

    #[error(transparent)]
    Service(#[from] WorkloadServiceError),
}

impl WorkloadError {
    pub fn to_message(&self) -> String {
        match self {
            // Do not expose internal database details in error messages
            WorkloadError::Service(WorkloadServiceError::Store(err)) => store_error_message(err),
            e => e.to_string(),
        }
    }
}

impl ResponseError for WorkloadError {
    fn status_code(&self) -> StatusCode {
        match self {
            WorkloadError::InvalidKind(_) => StatusCode::BAD_REQUEST,
            WorkloadError::Service(err) => match err {
                WorkloadServiceError::Validation(_)
                | WorkloadServiceError::UnsupportedOperation(_)
                | WorkloadServiceError::Manifest(_) => StatusCode::BAD_REQUEST,
                WorkloadServiceError::ClusterNotFound(_)
                | WorkloadServiceError::WorkloadNotFound(_) => StatusCode::NOT_FOUND,
                WorkloadServiceError::DuplicateWorkload(_)
                | WorkloadServiceError::Store(StoreError::DuplicateWorkload(_)) => {
                    StatusCode::CONFLICT
                }
                WorkloadServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                WorkloadServiceError::Registry(err) => registry_error_status(err),
                WorkloadServiceError::Upstream(err) if err.is_not_found() => StatusCode::NOT_FOUND,
                WorkloadServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        error_response(self.status_code(), self.to_message())
    }
}

fn default_replicas() -> i32 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateWorkloadRequest {
    pub name: String,
    /// Ignored for DaemonSets.
    #[serde(default = "default_replicas")]
    pub replicas: i32,
    pub containers: Containers,
    #[serde(default)]
    pub labels: StringMap,
    #[serde(default)]
    pub annotations: StringMap,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateWorkloadRequest {
    #[serde(default = "default_replicas")]
    pub replicas: i32,
    pub containers: Containers,
    #[serde(default)]
    pub labels: StringMap,
    #[serde(default)]
    pub annotations: StringMap,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScaleWorkloadRequest {
    pub replicas: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct WorkloadQuery {
    pub kind: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadWorkloadResponse {
    pub id: i64,
    pub cluster_id: i64,
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
    pub replicas: i32,
    pub containers: Containers,
    pub labels: StringMap,
    pub annotations: StringMap,
    pub status: WorkloadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Workload> for ReadWorkloadResponse {
    fn from(workload: Workload) -> Self {
        ReadWorkloadResponse {
            id: workload.id,
            cluster_id: workload.key.cluster_id,
            kind: workload.key.kind,
            namespace: workload.key.namespace,
            name: workload.key.name,
            replicas: workload.replicas,
            containers: workload.containers,
            labels: workload.labels,
            annotations: workload.annotations,
            status: workload.status,
            created_at: workload.created_at,
            updated_at: workload.updated_at,
        }
    }
}

/// A stored workload laid out like the Kubernetes object, as the dashboard
/// lists them.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkloadDocument {
    pub kind: WorkloadKind,
    pub metadata: WorkloadMetadata,
    pub spec: WorkloadSpec,
    pub status: WorkloadDocumentStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkloadMetadata {
    pub name: String,
    pub namespace: String,
    pub labels: StringMap,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub replicas: i32,
    pub template: PodTemplate,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PodTemplate {
    pub spec: PodTemplateSpec,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PodTemplateSpec {
    pub containers: Vec<Container>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadDocumentStatus {
    pub replicas: i32,
    pub available_replicas: i32,
    pub ready_replicas: i32,
    pub updated_replicas: i32,
    pub conditions: Vec<WorkloadCondition>,
}

impl From<Workload> for WorkloadDocument {
    fn from(workload: Workload) -> Self {
        let status = workload.status;
        WorkloadDocument {
            kind: workload.key.kind,
            metadata: WorkloadMetadata {
                name: workload.key.name,
                namespace: workload.key.namespace,
                labels: workload.labels,
            },
            spec: WorkloadSpec {
                replicas: workload.replicas,
                template: PodTemplate {
                    spec: PodTemplateSpec {
                        containers: workload.containers.0,
                    },
                },
            },
            status: WorkloadDocumentStatus {
                replicas: status.current_replicas,
                available_replicas: status.ready_replicas,
                ready_replicas: status.ready_replicas,
                updated_replicas: status.current_replicas,
                conditions: status.conditions,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadWorkloadsResponse {
    pub workloads: Vec<WorkloadDocument>,
}

fn workload_key(
    cluster_id: i64,
    kind: &str,
    namespace: String,
    name: String,
) -> Result<WorkloadKey, WorkloadError> {
    Ok(WorkloadKey {
        cluster_id,
        kind: kind.parse()?,
        namespace,
        name,
    })
}

#[get("/clusters/{cluster_id}/workloads")]
pub async fn read_all_workloads(
    service: Data<WorkloadService>,
    cluster_id: Path<i64>,
    query: Query<WorkloadQuery>,
    root_span: RootSpan,
) -> Result<impl Responder, WorkloadError> {
    let cluster_id = cluster_id.into_inner();
    root_span.record("cluster_id", cluster_id);

    let query = query.into_inner();
    let filter = WorkloadFilter {
        kind: query
            .kind
            .as_deref()
            .map(str::parse::<WorkloadKind>)
            .transpose()?,
        namespace: query.namespace,
    };
    let workloads = service
        .list_workloads(cluster_id, &filter)
        .await?
        .into_iter()
        .map(WorkloadDocument::from)
        .collect();

    Ok(Json(ReadWorkloadsResponse { workloads }))
}

#[get("/clusters/{cluster_id}/workloads/{kind}/{namespace}/{name}")]
pub async fn read_workload(
    service: Data<WorkloadService>,
    path: Path<(i64, String, String, String)>,
    root_span: RootSpan,
) -> Result<impl Responder, WorkloadError> {
    let (cluster_id, kind, namespace, name) = path.into_inner();
    root_span.record("cluster_id", cluster_id);

    let key = workload_key(cluster_id, &kind, namespace, name)?;
    let workload = service.read_workload(&key).await?;

    Ok(Json(ReadWorkloadResponse::from(workload)))
}

#[post("/clusters/{cluster_id}/workloads/{kind}/{namespace}")]
pub async fn create_workload(
    service: Data<WorkloadService>,
    path: Path<(i64, String, String)>,
    workload: Json<CreateWorkloadRequest>,
    root_span: RootSpan,
) -> Result<impl Responder, WorkloadError> {
    let (cluster_id, kind, namespace) = path.into_inner();
    root_span.record("cluster_id", cluster_id);

    let workload = workload.into_inner();
    let workload = NewWorkload {
        key: workload_key(cluster_id, &kind, namespace, workload.name)?,
        replicas: workload.replicas,
        containers: workload.containers,
        labels: workload.labels,
        annotations: workload.annotations,
        status: WorkloadStatus::default(),
    };
    let workload = service.create_workload(workload).await?;

    Ok(HttpResponse::Created().json(ReadWorkloadResponse::from(workload)))
}

#[put("/clusters/{cluster_id}/workloads/{kind}/{namespace}/{name}")]
pub async fn update_workload(
    service: Data<WorkloadService>,
    path: Path<(i64, String, String, String)>,
    workload: Json<UpdateWorkloadRequest>,
    root_span: RootSpan,
) -> Result<impl Responder, WorkloadError> {
    let (cluster_id, kind, namespace, name) = path.into_inner();
    root_span.record("cluster_id", cluster_id);

    let workload = workload.into_inner();
    let workload = NewWorkload {
        key: workload_key(cluster_id, &kind, namespace, name)?,
        replicas: workload.replicas,
        containers: workload.containers,
        labels: workload.labels,
        annotations: workload.annotations,
        status: WorkloadStatus::default(),
    };
    let workload = service.update_workload(workload).await?;

    Ok(Json(ReadWorkloadResponse::from(workload)))
}

#[delete("/clusters/{cluster_id}/workloads/{kind}/{namespace}/{name}")]
pub async fn delete_workload(
    service: Data<WorkloadService>,
    path: Path<(i64, String, String, String)>,
    root_span: RootSpan,
) -> Result<impl Responder, WorkloadError> {
    let (cluster_id, kind, namespace, name) = path.into_inner();
    root_span.record("cluster_id", cluster_id);

    let key = workload_key(cluster_id, &kind, namespace, name)?;
    service.delete_workload(&key).await?;

    Ok(HttpResponse::Ok().finish())
}

#[put("/clusters/{cluster_id}/workloads/{kind}/{namespace}/{name}/scale")]
pub async fn scale_workload(
    service: Data<WorkloadService>,
    path: Path<(i64, String, String, String)>,
    request: Json<ScaleWorkloadRequest>,
    root_span: RootSpan,
) -> Result<impl Responder, WorkloadError> {
    let (cluster_id, kind, namespace, name) = path.into_inner();
    root_span.record("cluster_id", cluster_id);

    let key = workload_key(cluster_id, &kind, namespace, name)?;
    service.scale_workload(&key, request.replicas).await?;

    Ok(HttpResponse::Ok().finish())
}
