use actix_web::{
    HttpResponse, Responder, ResponseError, delete, get,
    http::StatusCode,
    patch,
    web::{Data, Json, Path},
};
use k8s_openapi::api::core::v1::{Node, Taint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing_actix_web::RootSpan;

use crate::routes::clusters::{service_error_message, service_error_status};
use crate::routes::error_response;
use crate::services::clusters::{ClusterService, ClusterServiceError};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("The node {node} was not found in cluster {cluster_id}")]
    NodeNotFound { cluster_id: i64, node: String },

    #[error(transparent)]
    Service(#[from] ClusterServiceError),
}

impl NodeError {
    fn for_node(err: ClusterServiceError, cluster_id: i64, node: &str) -> Self {
        match err {
            ClusterServiceError::Upstream(err) if err.is_not_found() => NodeError::NodeNotFound {
                cluster_id,
                node: node.to_string(),
            },
            err => NodeError::Service(err),
        }
    }

    pub fn to_message(&self) -> String {
        match self {
            NodeError::Service(err) => service_error_message(err),
            e => e.to_string(),
        }
    }
}

impl ResponseError for NodeError {
    fn status_code(&self) -> StatusCode {
        match self {
            NodeError::NodeNotFound { .. } => StatusCode::NOT_FOUND,
            NodeError::Service(err) => service_error_status(err),
        }
    }

    fn error_response(&self) -> HttpResponse {
        error_response(self.status_code(), self.to_message())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadNodesResponse {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateNodeLabelsRequest {
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateNodeTaintsRequest {
    pub taints: Vec<Taint>,
}

#[get("/clusters/{cluster_id}/nodes")]
pub async fn read_cluster_nodes(
    service: Data<ClusterService>,
    cluster_id: Path<i64>,
    root_span: RootSpan,
) -> Result<impl Responder, NodeError> {
    let cluster_id = cluster_id.into_inner();
    root_span.record("cluster_id", cluster_id);

    let nodes = service.list_nodes(cluster_id).await?;

    Ok(Json(ReadNodesResponse { nodes }))
}

#[patch("/clusters/{cluster_id}/nodes/{node_name}/labels")]
pub async fn update_node_labels(
    service: Data<ClusterService>,
    path: Path<(i64, String)>,
    request: Json<UpdateNodeLabelsRequest>,
    root_span: RootSpan,
) -> Result<impl Responder, NodeError> {
    let (cluster_id, node_name) = path.into_inner();
    root_span.record("cluster_id", cluster_id);

    let node = service
        .replace_node_labels(cluster_id, &node_name, request.into_inner().labels)
        .await
        .map_err(|err| NodeError::for_node(err, cluster_id, &node_name))?;

    Ok(Json(node))
}

#[delete("/clusters/{cluster_id}/nodes/{node_name}/labels/{label_key}")]
pub async fn delete_node_label(
    service: Data<ClusterService>,
    path: Path<(i64, String, String)>,
    root_span: RootSpan,
) -> Result<impl Responder, NodeError> {
    let (cluster_id, node_name, label_key) = path.into_inner();
    root_span.record("cluster_id", cluster_id);

    let node = service
        .delete_node_label(cluster_id, &node_name, &label_key)
        .await
        .map_err(|err| NodeError::for_node(err, cluster_id, &node_name))?;

    Ok(Json(node))
}

#[patch("/clusters/{cluster_id}/nodes/{node_name}/taints")]
pub async fn update_node_taints(
    service: Data<ClusterService>,
    path: Path<(i64, String)>,
    request: Json<UpdateNodeTaintsRequest>,
    root_span: RootSpan,
) -> Result<impl Responder, NodeError> {
    let (cluster_id, node_name) = path.into_inner();
    root_span.record("cluster_id", cluster_id);

    let node = service
        .replace_node_taints(cluster_id, &node_name, request.into_inner().taints)
        .await
        .map_err(|err| NodeError::for_node(err, cluster_id, &node_name))?;

    Ok(Json(node))
}

#[delete("/clusters/{cluster_id}/nodes/{node_name}/taints/{taint_key}")]
pub async fn delete_node_taint(
    service: Data<ClusterService>,
    path: Path<(i64, String, String)>,
    root_span: RootSpan,
) -> Result<impl Responder, NodeError> {
    let (cluster_id, node_name, taint_key) = path.into_inner();
    root_span.record("cluster_id", cluster_id);

    let node = service
        .delete_node_taint(cluster_id, &node_name, &taint_key)
        .await
        .map_err(|err| NodeError::for_node(err, cluster_id, &node_name))?;

    Ok(Json(node))
}
